//! Integration tests for workflow loading, one-shot runs and sessions
//!
//! Everything runs against the mock model and mock integrations.

use callflow_rs::adk::integration::MockIntegrations;
use callflow_rs::adk::model::mock::MockModel;
use callflow_rs::callflow::context::ExecutionContext;
use callflow_rs::callflow::graph::{Edge, Graph, GraphExecutor, Node};
use callflow_rs::callflow::nodes::{NodeRegistry, Services};
use callflow_rs::callflow::session::{ServerEvent, SessionConfig, SessionEngine, SessionMode};
use callflow_rs::callflow::store::{load_graph, parse_graph, DirectoryStore, InMemoryStore, WorkflowStore};
use callflow_rs::callflow::trace::LogLevel;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Fixtures
// ============================================================================

/// Sales call: greet, listen, branch on sentiment into a lead or a goodbye
static SALES_CALL: Lazy<Graph> = Lazy::new(|| {
    let yaml = r#"
nodes:
  - id: call
    type: inbound-call
    label: Inbound Call
  - id: greet
    type: speak
    label: Greeting
    config:
      text: "Hi {{callerId}}, interested in our offer?"
  - id: hear
    type: listen
    label: Hear answer
  - id: mood
    type: sentiment
    label: Mood
  - id: lead
    type: sap-create-lead
    label: Create lead
    config:
      fieldMappings:
        phone: callerId
  - id: bye
    type: speak
    label: Goodbye
    config:
      text: "Sorry to hear that."
edges:
  - { id: e1, sourceId: call, targetId: greet }
  - { id: e2, sourceId: greet, targetId: hear }
  - { id: e3, sourceId: hear, targetId: mood }
  - { id: e4, sourceId: mood, targetId: lead, sourceOutput: positive }
  - { id: e5, sourceId: mood, targetId: bye, sourceOutput: negative }
"#;
    parse_graph(yaml, false).expect("fixture parses")
});

fn registry_with(model: MockModel) -> Arc<NodeRegistry> {
    let services = Services::new(Arc::new(model), Arc::new(MockIntegrations::new()));
    Arc::new(NodeRegistry::builtin(&services))
}

fn executor() -> GraphExecutor {
    GraphExecutor::new(registry_with(MockModel::new()))
}

fn sessions(model: MockModel, graph: Graph, mode_delay_ms: u64) -> SessionEngine {
    let store = Arc::new(InMemoryStore::with_graphs([("sales".to_string(), graph)]));
    SessionEngine::new(
        registry_with(model),
        store,
        SessionConfig {
            auto_advance_delay: Duration::from_millis(mode_delay_ms),
            ..SessionConfig::default()
        },
    )
}

async fn next_event(rx: &mut UnboundedReceiver<ServerEvent>) -> Option<ServerEvent> {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for event")
}

/// Collect events up to and including the first one named `name`
async fn wait_for(rx: &mut UnboundedReceiver<ServerEvent>, name: &str) -> Vec<ServerEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await.expect("event stream closed");
        let done = event.name() == name;
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn names(events: &[ServerEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

// ============================================================================
// One-shot Execution Tests
// ============================================================================

#[tokio::test]
async fn test_sales_call_runs_positive_branch() {
    let result = executor().execute(&SALES_CALL, ExecutionContext::new()).await;

    assert!(result.success, "run failed: {:?}", result.error);
    let ctx = &result.context;
    assert_eq!(ctx.get("sentiment"), Some(&json!("positive")));
    assert!(ctx
        .get("leadId")
        .and_then(|v| v.as_str())
        .is_some_and(|id| id.starts_with("LEAD-")));
    assert_eq!(ctx.get("lastSpokenText"), Some(&json!("Hi +15550100, interested in our offer?")));
    assert!(ctx.get("activeOutputs").is_none());

    let executed: Vec<_> = result
        .logs
        .iter()
        .filter(|e| e.message.starts_with("Executing node: "))
        .map(|e| e.message.trim_start_matches("Executing node: "))
        .collect();
    assert_eq!(executed, vec!["Inbound Call", "Greeting", "Hear answer", "Mood", "Create lead"]);
    assert_eq!(
        result.logs.last().map(|e| e.message.as_str()),
        Some("Flow execution completed successfully! Executed 5 node(s).")
    );
}

#[tokio::test]
async fn test_negative_answer_takes_other_branch() {
    let mut graph = SALES_CALL.clone();
    for node in graph.nodes.iter_mut().filter(|n| n.id == "hear") {
        node.config
            .insert("simulatedInput".into(), json!("No, that sounds terrible"));
    }

    let result = executor().execute(&graph, ExecutionContext::new()).await;

    assert!(result.success);
    assert_eq!(result.context.get("sentiment"), Some(&json!("negative")));
    assert_eq!(result.context.get("lastSpokenText"), Some(&json!("Sorry to hear that.")));
    assert!(result.context.get("leadId").is_none());
}

#[tokio::test]
async fn test_cycle_runs_each_node_once() {
    let graph = Graph::new(
        vec![
            Node::new("start", "webhook", "Start"),
            Node::new("a", "condition", "A").with_config("expression", json!("loops > 0")),
            Node::new("b", "speak", "B"),
        ],
        vec![
            Edge::new("e1", "start", "a"),
            Edge::new("e2", "a", "b"),
            Edge::new("e3", "b", "a"),
        ],
    );

    let result = executor().execute(&graph, ExecutionContext::new()).await;

    assert!(result.success);
    let runs = result
        .logs
        .iter()
        .filter(|e| e.message.starts_with("Executing node: "))
        .count();
    assert_eq!(runs, 3);
}

#[tokio::test]
async fn test_graph_without_trigger_is_rejected() {
    let graph = Graph::new(
        vec![Node::new("a", "speak", "A"), Node::new("b", "speak", "B")],
        vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "a")],
    );
    let initial = ExecutionContext::new().with("name", json!("Ada"));

    let result = executor().execute(&graph, initial.clone()).await;

    assert!(!result.success);
    assert_eq!(result.context, initial);
    assert!(result.logs.iter().any(|e| e.level == LogLevel::Warning));
}

// ============================================================================
// Store Tests
// ============================================================================

#[tokio::test]
async fn test_directory_store_feeds_executor() {
    let dir = std::env::temp_dir().join(format!("callflow-it-{}", uuid::Uuid::new_v4()));
    let store = DirectoryStore::new(&dir);

    store.save_graph("sales", SALES_CALL.clone()).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec!["sales"]);

    let graph = store.get_graph("sales").await.unwrap();
    assert_eq!(graph, *SALES_CALL);

    let result = executor()
        .execute(&graph, ExecutionContext::new().with("callerId", json!("+4930123")))
        .await;
    assert!(result.success);
    assert_eq!(
        result.context.get("lead").and_then(|l| l.get("lead")),
        Some(&json!({"phone": "+4930123"}))
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_bundled_workflows_run() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("workflows");

    let sales = load_graph(dir.join("sales-call.yaml")).unwrap();
    let result = executor().execute(&sales, ExecutionContext::new()).await;
    assert!(result.success, "sales-call failed: {:?}", result.error);
    let spoken = result.context.get("lastSpokenText").and_then(|v| v.as_str()).unwrap();
    assert!(spoken.starts_with("Great, your reference is LEAD-"));

    let router = load_graph(dir.join("webhook-router.yaml")).unwrap();
    let result = executor().execute(&router, ExecutionContext::new()).await;
    assert!(result.success, "webhook-router failed: {:?}", result.error);
    assert_eq!(result.context.get("conditionResult"), Some(&json!(true)));
    assert_eq!(
        result.context.get("lastSpokenText"),
        Some(&json!("Welcome back Acme Industries, you have 2 open orders."))
    );
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_manual_session_walks_the_call() {
    let engine = sessions(MockModel::new(), SALES_CALL.clone(), 10);
    let (handle, mut rx) = engine.open();

    handle.start("sales", SessionMode::Manual);
    let events = wait_for(&mut rx, "node:execution_complete").await;
    assert_eq!(names(&events), vec!["session:started", "node:execution_complete"]);

    handle.advance("call");
    let events = wait_for(&mut rx, "node:execution_complete").await;
    assert_eq!(events.first().map(|e| e.name()), Some("workflow:node_activated"));
    assert!(names(&events).contains(&"ai:chunk"));

    handle.advance("greet");
    wait_for(&mut rx, "system:waiting_for_input").await;

    handle.user_message("Yes, that sounds great");
    let events = wait_for(&mut rx, "node:execution_complete").await;
    assert!(matches!(
        events.last(),
        Some(ServerEvent::NodeExecutionComplete { node_id }) if node_id == "hear"
    ));

    let snapshot = handle.snapshot().await.unwrap();
    let session = snapshot.session.unwrap();
    assert_eq!(session.context.get("userResponse"), Some(&json!("Yes, that sounds great")));
    assert_eq!(session.context.get_path("intent.action"), Some(&json!("proceed")));

    handle.advance("hear");
    wait_for(&mut rx, "node:execution_complete").await;
    handle.advance("mood");
    let events = wait_for(&mut rx, "node:execution_complete").await;
    assert!(matches!(
        events.first(),
        Some(ServerEvent::NodeActivated { node }) if node.id == "lead"
    ));

    handle.advance("lead");
    let events = wait_for(&mut rx, "workflow:finished").await;
    assert_eq!(events.last(), Some(&ServerEvent::Finished { completed_count: 5 }));
}

#[tokio::test]
async fn test_auto_session_needs_no_advances() {
    let graph = Graph::new(
        vec![
            Node::new("hook", "webhook", "Hook"),
            Node::new("check", "condition", "Has payload").with_config("expression", json!("webhookPayload")),
            Node::new("yes", "speak", "Payload received"),
            Node::new("no", "speak", "Nothing received"),
        ],
        vec![
            Edge::new("e1", "hook", "check"),
            Edge::branch("e2", "check", "yes", "true"),
            Edge::branch("e3", "check", "no", "false"),
        ],
    );
    let engine = sessions(MockModel::with_replies(vec!["ok".into()]), graph, 5);
    let (handle, mut rx) = engine.open();

    handle.start("sales", SessionMode::Auto);
    let events = wait_for(&mut rx, "workflow:finished").await;

    let activated: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::NodeActivated { node } => Some(node.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(activated, vec!["check", "yes"]);
    assert_eq!(events.last(), Some(&ServerEvent::Finished { completed_count: 3 }));
}

#[tokio::test]
async fn test_repeated_advance_moves_once() {
    let engine = sessions(MockModel::new(), SALES_CALL.clone(), 10);
    let (handle, mut rx) = engine.open();
    handle.start("sales", SessionMode::Manual);
    wait_for(&mut rx, "node:execution_complete").await;

    handle.advance("call");
    handle.advance("call");
    handle.advance("call");
    let events = wait_for(&mut rx, "node:execution_complete").await;
    let activations = events.iter().filter(|e| e.name() == "workflow:node_activated").count();
    assert_eq!(activations, 1);

    let snapshot = handle.snapshot().await.unwrap();
    let session = snapshot.session.unwrap();
    assert_eq!(session.active_node_id.as_deref(), Some("greet"));
    assert_eq!(session.completed_node_ids, vec!["call", "greet"]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_broken_stream_reports_and_still_advances() {
    let model = MockModel::with_replies(vec!["one two three four".into()]).failing_after(1);
    let engine = sessions(model, SALES_CALL.clone(), 10);
    let (handle, mut rx) = engine.open();
    handle.start("sales", SessionMode::Manual);
    wait_for(&mut rx, "node:execution_complete").await;

    handle.advance("call");
    let events = wait_for(&mut rx, "node:execution_complete").await;
    assert_eq!(
        names(&events),
        vec![
            "workflow:node_activated",
            "ai:processing_start",
            "ai:chunk",
            "ai:processing_end",
            "error:api",
            "node:execution_complete",
        ]
    );

    let session = handle.snapshot().await.unwrap().session.unwrap();
    assert!(session.conversation_history.is_empty());

    handle.advance("greet");
    wait_for(&mut rx, "system:waiting_for_input").await;
}

#[tokio::test]
async fn test_end_during_stream_stops_output() {
    let model = MockModel::with_replies(vec!["a slow reply that takes quite a while".into()])
        .with_chunk_delay(Duration::from_millis(100));
    let engine = sessions(model, SALES_CALL.clone(), 10);
    let (handle, mut rx) = engine.open();
    handle.start("sales", SessionMode::Manual);
    wait_for(&mut rx, "node:execution_complete").await;

    handle.advance("call");
    wait_for(&mut rx, "ai:chunk").await;
    handle.end();

    let mut after = Vec::new();
    while let Some(event) = next_event(&mut rx).await {
        after.push(event);
    }
    let after = names(&after);
    assert!(!after.contains(&"ai:processing_end"));
    assert!(!after.contains(&"node:execution_complete"));
    assert!(handle.snapshot().await.is_none());
}
