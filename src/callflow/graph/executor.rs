//! One-shot graph executor
//!
//! Runs a graph start to finish from its triggers, depth first, each node at
//! most once. Branching nodes narrow which outgoing edges are followed by
//! setting `activeOutputs` on the context they return.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::types::{Graph, Node};
use crate::adk::error::{CallflowError, WorkflowError};
use crate::callflow::context::ExecutionContext;
use crate::callflow::nodes::NodeRegistry;
use crate::callflow::trace::{ExecutionLog, LogEntry, LogRecord, LogSink, NodeLogSink};

/// Outcome of a one-shot run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub logs: Vec<LogEntry>,
    pub context: ExecutionContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Graph executor bound to a handler registry
pub struct GraphExecutor {
    registry: Arc<NodeRegistry>,
}

/// Per-run bookkeeping
struct Run<'g> {
    graph: &'g Graph,
    log: ExecutionLog,
    executed: HashSet<String>,
    /// Context produced by the most recently executed node
    current: ExecutionContext,
}

impl GraphExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Entry points of `graph` under this executor's registry
    pub fn triggers<'g>(&self, graph: &'g Graph) -> Vec<&'g Node> {
        graph.triggers(|t| self.registry.is_trigger_type(t))
    }

    /// Run `graph` from every trigger, threading the context between them
    pub async fn execute(&self, graph: &Graph, initial: ExecutionContext) -> ExecutionResult {
        let mut run = Run {
            graph,
            log: ExecutionLog::new(),
            executed: HashSet::new(),
            current: initial.clone(),
        };

        run.log.emit(LogRecord::info("Starting flow execution..."));

        let triggers = self.triggers(graph);
        if triggers.is_empty() {
            run.log
                .emit(LogRecord::warning(WorkflowError::NoEntryPoint.to_string()));
            return ExecutionResult {
                success: false,
                logs: run.log.take(),
                context: initial,
                error: None,
            };
        }

        run.log.emit(LogRecord::info(format!(
            "Found {} trigger node(s)",
            triggers.len()
        )));

        for trigger in triggers {
            let ctx = run.current.clone();
            if let Err(e) = self.execute_from(&mut run, trigger, ctx).await {
                run.log
                    .emit(LogRecord::error(format!("Flow execution failed: {}", e)));
                return ExecutionResult {
                    success: false,
                    logs: run.log.take(),
                    context: initial,
                    error: Some(e.to_string()),
                };
            }
        }

        run.log.emit(LogRecord::success(format!(
            "Flow execution completed successfully! Executed {} node(s).",
            run.executed.len()
        )));

        ExecutionResult {
            success: true,
            logs: run.log.take(),
            context: run.current,
            error: None,
        }
    }

    /// Depth-first walk from `start`. Children are pushed in reverse so they
    /// pop in edge listing order, which matches a recursive descent.
    async fn execute_from(
        &self,
        run: &mut Run<'_>,
        start: &Node,
        ctx: ExecutionContext,
    ) -> Result<(), CallflowError> {
        let graph = run.graph;
        let mut stack: Vec<(&Node, ExecutionContext)> = vec![(start, ctx)];

        while let Some((node, ctx)) = stack.pop() {
            if run.executed.contains(&node.id) {
                continue;
            }

            let produced = self.execute_node(run, node, ctx).await?;
            let active = produced.active_outputs();
            let next = produced.without_active_outputs();
            run.current = next.clone();

            let mut children = Vec::new();
            for edge in graph.outgoing(&node.id) {
                if !edge.is_selected(active.as_ref()) {
                    continue;
                }
                match graph.node(&edge.target_id) {
                    Some(target) => children.push(target),
                    None => run.log.emit(
                        LogRecord::warning(format!(
                            "Edge '{}' points to missing node '{}', skipping",
                            edge.id, edge.target_id
                        ))
                        .for_node(node),
                    ),
                }
            }
            for child in children.into_iter().rev() {
                stack.push((child, next.clone()));
            }
        }
        Ok(())
    }

    async fn execute_node(
        &self,
        run: &mut Run<'_>,
        node: &Node,
        ctx: ExecutionContext,
    ) -> Result<ExecutionContext, CallflowError> {
        run.log.emit(
            LogRecord::info(format!("Executing node: {}", node.display_name())).for_node(node),
        );

        let handler = self.registry.handler_for(node, &run.log);
        let sink = NodeLogSink::new(&run.log, node);
        match handler.execute(node, ctx, &sink).await {
            Ok(next) => {
                run.executed.insert(node.id.clone());
                run.log.emit(
                    LogRecord::success(format!("Completed: {}", node.display_name())).for_node(node),
                );
                Ok(next)
            }
            Err(e) => {
                run.log.emit(
                    LogRecord::error(format!("Error in {}: {}", node.display_name(), e))
                        .for_node(node),
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callflow::graph::Edge;
    use crate::callflow::nodes::{NodeCategory, NodeHandler, Services};
    use crate::callflow::trace::LogLevel;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Appends its node id to `visited` and to the context's `path`
    struct Recorder {
        category: NodeCategory,
        visited: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NodeHandler for Recorder {
        fn category(&self) -> NodeCategory {
            self.category
        }

        async fn execute(
            &self,
            node: &Node,
            ctx: ExecutionContext,
            _log: &dyn LogSink,
        ) -> Result<ExecutionContext, CallflowError> {
            self.visited.lock().unwrap().push(node.id.clone());
            let mut path = ctx.get("path").cloned().unwrap_or_else(|| json!([]));
            if let Some(items) = path.as_array_mut() {
                items.push(json!(node.id));
            }
            Ok(ctx.with("path", path))
        }
    }

    struct Failing;

    #[async_trait]
    impl NodeHandler for Failing {
        fn category(&self) -> NodeCategory {
            NodeCategory::Integration
        }

        async fn execute(
            &self,
            node: &Node,
            _ctx: ExecutionContext,
            _log: &dyn LogSink,
        ) -> Result<ExecutionContext, CallflowError> {
            Err(CallflowError::handler(&node.id, "upstream returned 500"))
        }
    }

    fn recording_executor() -> (GraphExecutor, Arc<Mutex<Vec<String>>>) {
        let visited = Arc::new(Mutex::new(Vec::new()));
        let mut registry = NodeRegistry::builtin(&Services::mock());
        registry.register(
            "start",
            Arc::new(Recorder {
                category: NodeCategory::Trigger,
                visited: visited.clone(),
            }),
        );
        registry.register(
            "step",
            Arc::new(Recorder {
                category: NodeCategory::Agent,
                visited: visited.clone(),
            }),
        );
        registry.register("explode", Arc::new(Failing));
        (GraphExecutor::new(Arc::new(registry)), visited)
    }

    fn executed_count(result: &ExecutionResult) -> usize {
        result
            .logs
            .iter()
            .filter(|e| e.message.starts_with("Executing node:"))
            .count()
    }

    #[tokio::test]
    async fn test_linear_flow() {
        let registry = NodeRegistry::builtin(&Services::mock());
        let executor = GraphExecutor::new(Arc::new(registry));
        let graph = Graph::new(
            vec![
                Node::new("call", "inbound-call", "Inbound Call"),
                Node::new("greet", "speak-text", "Greet").with_config("text", json!("Hello {{callerId}}")),
                Node::new("hear", "listen-understand", "Listen"),
                Node::new("check", "condition", "Proceed?")
                    .with_config("expression", json!("intent.action == 'proceed'")),
            ],
            vec![
                Edge::new("e1", "call", "greet"),
                Edge::new("e2", "greet", "hear"),
                Edge::new("e3", "hear", "check"),
            ],
        );

        let result = executor.execute(&graph, ExecutionContext::new()).await;

        assert!(result.success);
        assert_eq!(executed_count(&result), 4);
        assert_eq!(result.context.get("conditionResult"), Some(&json!(true)));
        assert!(result.context.get("lastSpokenText").is_some());
        assert!(result.context.active_outputs().is_none());
        let last = result.logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Success);
        assert!(last.message.contains("Executed 4 node(s)"));
    }

    #[tokio::test]
    async fn test_two_node_cycle_runs_each_once() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![Node::new("a", "start", "A"), Node::new("b", "step", "B")],
            vec![Edge::new("ab", "a", "b"), Edge::new("ba", "b", "a")],
        );

        let result = executor.execute(&graph, ExecutionContext::new()).await;

        assert!(result.success);
        assert_eq!(*visited.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(result.context.get("path"), Some(&json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_depth_first_order() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![
                Node::new("root", "start", "Root"),
                Node::new("left", "step", "Left"),
                Node::new("left-child", "step", "Left child"),
                Node::new("right", "step", "Right"),
            ],
            vec![
                Edge::new("e1", "root", "left"),
                Edge::new("e2", "root", "right"),
                Edge::new("e3", "left", "left-child"),
            ],
        );

        executor.execute(&graph, ExecutionContext::new()).await;

        assert_eq!(
            *visited.lock().unwrap(),
            vec!["root", "left", "left-child", "right"]
        );
    }

    #[tokio::test]
    async fn test_branch_follows_active_outputs_only() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![
                Node::new("a", "start", "Start"),
                Node::new("c", "condition", "Check").with_config("expression", json!("score > 5")),
                Node::new("yes", "step", "Yes"),
                Node::new("no", "step", "No"),
                Node::new("always", "step", "Always"),
            ],
            vec![
                Edge::new("e1", "a", "c"),
                Edge::branch("e2", "c", "yes", "true"),
                Edge::branch("e3", "c", "no", "false"),
                Edge::new("e4", "c", "always"),
            ],
        );

        let ctx = ExecutionContext::new().with("score", json!(9));
        let result = executor.execute(&graph, ctx).await;

        assert!(result.success);
        assert_eq!(*visited.lock().unwrap(), vec!["a", "yes", "always"]);
    }

    #[tokio::test]
    async fn test_no_entry_point() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![Node::new("a", "step", "A"), Node::new("b", "step", "B")],
            vec![Edge::new("ab", "a", "b"), Edge::new("ba", "b", "a")],
        );
        let initial = ExecutionContext::new().with("x", json!(1));

        let result = executor.execute(&graph, initial.clone()).await;

        assert!(!result.success);
        assert!(visited.lock().unwrap().is_empty());
        assert_eq!(result.context, initial);
        assert!(result
            .logs
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.contains("No entry point")));
    }

    #[tokio::test]
    async fn test_handler_failure_aborts_run() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![
                Node::new("a", "start", "A"),
                Node::new("boom", "explode", "Boom"),
                Node::new("after", "step", "After"),
            ],
            vec![Edge::new("e1", "a", "boom"), Edge::new("e2", "boom", "after")],
        );
        let initial = ExecutionContext::new().with("x", json!(1));

        let result = executor.execute(&graph, initial.clone()).await;

        assert!(!result.success);
        assert_eq!(*visited.lock().unwrap(), vec!["a"]);
        assert_eq!(result.context, initial);
        assert!(result.error.unwrap().contains("upstream returned 500"));
        let errors: Vec<_> = result.logs.iter().filter(|e| e.level == LogLevel::Error).collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].node_id.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_every_node_runs_at_most_once_in_dense_graph() {
        let (executor, visited) = recording_executor();
        let ids = ["n0", "n1", "n2", "n3", "n4"];
        let mut nodes = vec![Node::new("n0", "start", "n0")];
        nodes.extend(ids[1..].iter().map(|id| Node::new(*id, "step", *id)));
        let mut edges = Vec::new();
        for from in ids {
            for to in ids {
                edges.push(Edge::new(format!("{}-{}", from, to), from, to));
            }
        }

        let result = executor.execute(&Graph::new(nodes, edges), ExecutionContext::new()).await;

        assert!(result.success);
        let mut seen = visited.lock().unwrap().clone();
        assert_eq!(seen.len(), ids.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), ids.len());
    }

    #[tokio::test]
    async fn test_multiple_triggers_thread_context() {
        let (executor, visited) = recording_executor();
        let graph = Graph::new(
            vec![
                Node::new("t1", "start", "T1"),
                Node::new("s1", "step", "S1"),
                Node::new("t2", "start", "T2"),
            ],
            vec![Edge::new("e1", "t1", "s1")],
        );

        let result = executor.execute(&graph, ExecutionContext::new()).await;

        assert_eq!(*visited.lock().unwrap(), vec!["t1", "s1", "t2"]);
        assert_eq!(result.context.get("path"), Some(&json!(["t1", "s1", "t2"])));
    }

    #[tokio::test]
    async fn test_unknown_type_passes_through() {
        let (executor, _) = recording_executor();
        let graph = Graph::new(
            vec![Node::new("a", "start", "A"), Node::new("x", "telepathy", "Mystery")],
            vec![Edge::new("e1", "a", "x")],
        );

        let result = executor.execute(&graph, ExecutionContext::new()).await;

        assert!(result.success);
        assert_eq!(executed_count(&result), 2);
        assert!(result
            .logs
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.node_id.as_deref() == Some("x")));
    }

    #[tokio::test]
    async fn test_dangling_edge_is_skipped() {
        let (executor, _) = recording_executor();
        let graph = Graph::new(
            vec![Node::new("a", "start", "A")],
            vec![Edge::new("e1", "a", "ghost")],
        );

        let result = executor.execute(&graph, ExecutionContext::new()).await;

        assert!(result.success);
        assert!(result.logs.iter().any(|e| e.message.contains("missing node 'ghost'")));
    }
}
