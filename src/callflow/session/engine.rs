// SPDX-License-Identifier: MIT

//! Session actor
//!
//! `SessionEngine::open` spawns one task per session. The task drains an
//! inbox serially, so a second event is never looked at before the previous
//! state transition is done. Auto-advance timers post into the same inbox
//! and go through the same active-node guard as client advances.
//!
//! Ending a session cancels a token that in-flight streams watch, so `end()`
//! never waits on the model.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::protocol::{ClientEvent, ServerEvent, SessionMode};
use super::{HistoryEntry, Role, Session, SessionSnapshot, SessionState};
use crate::adk::error::{CallflowError, WorkflowError};
use crate::adk::model::Content;
use crate::callflow::config::EngineConfig;
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::{Graph, Node};
use crate::callflow::nodes::{with_user_input, NodeBehavior, NodeHandler, NodeRegistry, ReplyRequest};
use crate::callflow::store::WorkflowStore;
use crate::callflow::trace::{ExecutionLog, LogRecord, LogSink, NodeLogSink};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait before an auto-mode session advances past a completed node
    pub auto_advance_delay: Duration,
    /// History entries given to a node answering the user
    pub history_window: usize,
    /// Log and history entries a session keeps; older ones are dropped
    pub retained_entries: usize,
}

const DEFAULT_RETAINED_ENTRIES: usize = 200;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_advance_delay: Duration::from_millis(1500),
            history_window: 5,
            retained_entries: DEFAULT_RETAINED_ENTRIES,
        }
    }
}

impl From<&EngineConfig> for SessionConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            auto_advance_delay: config.auto_advance_delay(),
            history_window: config.history_window,
            retained_entries: DEFAULT_RETAINED_ENTRIES,
        }
    }
}

/// Opens sessions over a shared registry and store
#[derive(Clone)]
pub struct SessionEngine {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn WorkflowStore>,
    config: SessionConfig,
}

enum Command {
    Client(ClientEvent),
    Snapshot(oneshot::Sender<SessionSnapshot>),
}

impl SessionEngine {
    pub fn new(registry: Arc<NodeRegistry>, store: Arc<dyn WorkflowStore>, config: SessionConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Spawn an idle session. Outbound events arrive on the returned receiver,
    /// which closes once the session is over.
    pub fn open(&self) -> (SessionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session_id = uuid::Uuid::new_v4().to_string();

        let actor = SessionActor {
            session_id: session_id.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            events: events_tx,
            inbox: inbox_tx.clone(),
            cancel: cancel.clone(),
            state: SessionState::Idle,
            session: None,
            graph: None,
            log: ExecutionLog::bounded(self.config.retained_entries),
        };

        let span = tracing::info_span!("session", id = %session_id);
        let task = tokio::spawn(actor.run(inbox_rx).instrument(span));

        let handle = SessionHandle {
            session_id,
            inbox: inbox_tx,
            cancel,
            task: Some(task),
        };
        (handle, events_rx)
    }
}

/// Client side of a session. Dropping it ends the session.
pub struct SessionHandle {
    session_id: String,
    inbox: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue a client event. `session:end` takes effect immediately.
    pub fn send(&self, event: ClientEvent) {
        if event == ClientEvent::End {
            self.end();
            return;
        }
        // A closed inbox means the session already ended
        let _ = self.inbox.send(Command::Client(event));
    }

    pub fn start(&self, workflow_id: &str, mode: SessionMode) {
        self.send(ClientEvent::Start {
            workflow_id: workflow_id.to_string(),
            mode,
        });
    }

    pub fn user_message(&self, text: &str) {
        self.send(ClientEvent::UserMessage { text: text.to_string() });
    }

    pub fn advance(&self, from_node_id: &str) {
        self.send(ClientEvent::Advance {
            from_node_id: from_node_id.to_string(),
        });
    }

    /// Finish the session, abandoning any stream in flight
    pub fn end(&self) {
        self.cancel.cancel();
    }

    pub fn is_ended(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current state, once every earlier event has been handled. `None`
    /// after the session ended.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.inbox.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// End the session and wait for its task to exit
    pub async fn close(mut self) {
        self.end();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionActor {
    session_id: String,
    registry: Arc<NodeRegistry>,
    store: Arc<dyn WorkflowStore>,
    config: SessionConfig,
    events: mpsc::UnboundedSender<ServerEvent>,
    /// For auto-advance timers
    inbox: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    state: SessionState,
    session: Option<Session>,
    graph: Option<Arc<Graph>>,
    log: ExecutionLog,
}

/// How a streamed reply ended
enum Reply {
    Complete,
    Failed(CallflowError),
    Cancelled,
}

impl SessionActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("session opened");
        loop {
            let command = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                command = inbox.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Client(event) => self.handle(event).await,
                Command::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        // Pending snapshot requests see a closed session
        drop(inbox);
        self.finish_by_end();
    }

    async fn handle(&mut self, event: ClientEvent) {
        tracing::debug!(event = event.name(), state = %self.state, "handling event");
        match event {
            ClientEvent::Start { workflow_id, mode } => self.start(&workflow_id, mode).await,
            ClientEvent::UserMessage { text } => self.on_user_message(&text).await,
            ClientEvent::Advance { from_node_id } => self.advance(&from_node_id).await,
            ClientEvent::End => self.cancel.cancel(),
        }
    }

    fn emit(&self, event: ServerEvent) {
        tracing::trace!(event = event.name(), "emit");
        // The client may already be gone
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session: self.session.clone(),
            log: self.log.entries(),
        }
    }

    /// Log and drop an event the current state does not accept
    fn reject(&self, event: &str) {
        let err = WorkflowError::InvalidTransition {
            event: event.to_string(),
            state: self.state.to_string(),
        };
        tracing::warn!("{}", err);
        self.log.emit(LogRecord::warning(err.to_string()));
    }

    fn active_node(&self) -> Option<Node> {
        let id = self.session.as_ref()?.active_node_id.as_deref()?;
        self.graph.as_ref()?.node(id).cloned()
    }

    async fn start(&mut self, workflow_id: &str, mode: SessionMode) {
        if self.state != SessionState::Idle {
            self.reject("session:start");
            return;
        }
        self.state = SessionState::Starting;

        let loaded = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            loaded = self.store.get_graph(workflow_id) => loaded,
        };
        let graph = match loaded {
            Ok(graph) => Arc::new(graph),
            Err(e) => return self.start_failed(e),
        };
        let first = graph
            .triggers(|t| self.registry.is_trigger_type(t))
            .first()
            .map(|n| (*n).clone());
        let Some(first) = first else {
            return self.start_failed(WorkflowError::NoEntryPoint.into());
        };

        let mut session = Session::new(&self.session_id, workflow_id, mode);
        session.active_node_id = Some(first.id.clone());
        self.session = Some(session);
        let total_nodes = graph.nodes.len();
        self.graph = Some(graph);
        self.state = SessionState::NodeActive;

        self.log.emit(LogRecord::info(format!(
            "Session started for workflow {} ({:?} mode)",
            workflow_id, mode
        )));
        tracing::info!(workflow = workflow_id, "session started");
        self.emit(ServerEvent::SessionStarted {
            workflow_id: workflow_id.to_string(),
            session_id: self.session_id.clone(),
            active_node: first,
            total_nodes,
        });

        self.execute_active().await;
    }

    /// Report a failed start and go back to idle so the client may retry
    fn start_failed(&mut self, error: CallflowError) {
        self.log.emit(LogRecord::error(format!("Session start failed: {}", error)));
        self.emit(ServerEvent::ApiError {
            message: error.to_string(),
        });
        self.state = SessionState::Idle;
    }

    async fn execute_active(&mut self) {
        let Some(node) = self.active_node() else {
            return;
        };
        let handler = self.registry.handler_for(&node, &self.log);
        self.log
            .emit(LogRecord::info(format!("Executing node: {}", node.display_name())).for_node(&node));

        match handler.behavior() {
            NodeBehavior::AwaitInput => {
                self.state = SessionState::WaitingForInput;
                self.emit(ServerEvent::WaitingForInput {
                    node_id: node.id.clone(),
                    label: node.display_name().to_string(),
                });
            }
            NodeBehavior::FireAndForget => {
                if !self.run_handler(&node, handler.as_ref()).await {
                    return;
                }
                self.complete(&node);
            }
            NodeBehavior::Output => {
                if !self.run_handler(&node, handler.as_ref()).await {
                    return;
                }
                let request = ReplyRequest {
                    message: None,
                    history: self.history_window(),
                    context: self.context(),
                };
                match self.stream_reply(&node, handler.as_ref(), request).await {
                    Reply::Cancelled => return,
                    Reply::Complete => {}
                    Reply::Failed(e) => self.report_failure(&node, &e),
                }
                self.complete(&node);
            }
        }
    }

    /// Run the handler and keep its context. Failures are reported and the
    /// node still counts as done. Returns false if the session ended meanwhile.
    async fn run_handler(&mut self, node: &Node, handler: &dyn NodeHandler) -> bool {
        let ctx = self.context();
        let result = {
            let sink = NodeLogSink::new(&self.log, node);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                result = handler.execute(node, ctx, &sink) => result,
            }
        };
        match result {
            Ok(ctx) => {
                if let Some(session) = self.session.as_mut() {
                    session.context = ctx;
                }
            }
            Err(e) => self.report_failure(node, &e),
        }
        true
    }

    fn report_failure(&self, node: &Node, error: &CallflowError) {
        self.log
            .emit(LogRecord::error(format!("Error in {}: {}", node.display_name(), error)).for_node(node));
        self.emit(ServerEvent::ApiError {
            message: format!("AI error: {}", error),
        });
    }

    /// Node is done: tell the client and wait for an advance
    fn complete(&mut self, node: &Node) {
        self.log
            .emit(LogRecord::success(format!("Completed: {}", node.display_name())).for_node(node));
        self.emit(ServerEvent::NodeExecutionComplete {
            node_id: node.id.clone(),
        });
        self.state = SessionState::Advancing;
        self.schedule_auto_advance(&node.id);
    }

    fn schedule_auto_advance(&self, node_id: &str) {
        let auto = self
            .session
            .as_ref()
            .is_some_and(|s| s.mode == SessionMode::Auto);
        if !auto {
            return;
        }

        let inbox = self.inbox.clone();
        let cancel = self.cancel.clone();
        let delay = self.config.auto_advance_delay;
        let from_node_id = node_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = inbox.send(Command::Client(ClientEvent::Advance { from_node_id }));
                }
            }
        });
    }

    fn context(&self) -> ExecutionContext {
        self.session
            .as_ref()
            .map(|s| s.context.clone())
            .unwrap_or_default()
    }

    fn history_window(&self) -> Vec<Content> {
        self.session
            .as_ref()
            .map(|s| s.history_window(self.config.history_window))
            .unwrap_or_default()
    }

    /// Stream a reply to the client chunk by chunk. On success the full text
    /// lands in the history as an `ai` entry.
    async fn stream_reply(&mut self, node: &Node, handler: &dyn NodeHandler, request: ReplyRequest) -> Reply {
        self.emit(ServerEvent::ProcessingStart);

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Reply::Cancelled,
            opened = handler.respond(node, request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.emit(ServerEvent::ProcessingEnd);
                return Reply::Failed(e);
            }
        };

        let mut full = String::new();
        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Reply::Cancelled,
                item = stream.next() => item,
            };
            match item {
                Some(Ok(text)) => {
                    full.push_str(&text);
                    self.emit(ServerEvent::Chunk { text });
                }
                Some(Err(e)) => {
                    self.emit(ServerEvent::ProcessingEnd);
                    return Reply::Failed(e);
                }
                None => break,
            }
        }

        let limit = self.config.retained_entries;
        if let Some(session) = self.session.as_mut() {
            session.push_history(HistoryEntry::new(Role::Ai, full.clone()), limit);
        }
        self.log.emit(
            LogRecord::info(format!("AI: {}", full))
                .for_node(node)
                .with_data(serde_json::json!({ "response": full })),
        );
        self.emit(ServerEvent::ProcessingEnd);
        Reply::Complete
    }

    async fn on_user_message(&mut self, text: &str) {
        if self.state != SessionState::WaitingForInput {
            self.reject("user:message");
            return;
        }
        let Some(node) = self.active_node() else {
            return;
        };

        let limit = self.config.retained_entries;
        if let Some(session) = self.session.as_mut() {
            session.push_history(HistoryEntry::new(Role::User, text), limit);
            let ctx = std::mem::take(&mut session.context);
            session.context = with_user_input(ctx, text);
        }
        self.log
            .emit(LogRecord::info(format!("User: {}", text)).for_node(&node));

        let handler = self.registry.handler_for(&node, &self.log);
        let request = ReplyRequest {
            message: Some(text.to_string()),
            history: self.history_window(),
            context: self.context(),
        };
        match self.stream_reply(&node, handler.as_ref(), request).await {
            Reply::Cancelled => {}
            Reply::Complete => self.complete(&node),
            Reply::Failed(e) => {
                self.report_failure(&node, &e);
                self.state = SessionState::Advancing;
                self.schedule_auto_advance(&node.id);
            }
        }
    }

    async fn advance(&mut self, from_node_id: &str) {
        let is_active = self
            .session
            .as_ref()
            .is_some_and(|s| s.active_node_id.as_deref() == Some(from_node_id));
        if self.state != SessionState::Advancing || !is_active {
            self.reject(&format!("workflow:advance from '{}'", from_node_id));
            return;
        }
        let (Some(session), Some(graph)) = (self.session.as_mut(), self.graph.clone()) else {
            return;
        };

        session.mark_completed(from_node_id);
        let ctx = std::mem::take(&mut session.context);
        let active = ctx.active_outputs();
        session.context = ctx.without_active_outputs();

        let next = graph
            .outgoing(from_node_id)
            .filter(|e| e.is_selected(active.as_ref()))
            .find_map(|e| graph.node(&e.target_id))
            .cloned();

        match next {
            Some(node) => {
                session.active_node_id = Some(node.id.clone());
                self.state = SessionState::NodeActive;
                self.log
                    .emit(LogRecord::info(format!("Advanced to: {}", node.display_name())).for_node(&node));
                self.emit(ServerEvent::NodeActivated { node });
                self.execute_active().await;
            }
            None => {
                session.active_node_id = None;
                let completed_count = session.completed_node_ids.len();
                self.state = SessionState::Finished;
                self.log.emit(LogRecord::success(format!(
                    "Workflow finished, {} node(s) completed",
                    completed_count
                )));
                self.emit(ServerEvent::Finished { completed_count });
            }
        }
    }

    fn finish_by_end(&mut self) {
        self.state = SessionState::Finished;
        self.log.emit(LogRecord::info("Session ended"));
        tracing::info!("session ended");
    }
}
