// SPDX-License-Identifier: MIT

//! Node handlers and the registry that maps node types to them
//!
//! The registry is built once at startup from a [`Services`] bundle, so the
//! choice between mock and live collaborators is made by whoever constructs
//! it. After construction it is shared read-only by every run and session.

mod integration;
mod listen;
mod logic;
mod speak;
mod trigger;

pub use integration::IntegrationHandler;
pub use listen::{with_user_input, ListenHandler};
pub use logic::{analyze_sentiment, ConditionHandler, Sentiment, SentimentHandler};
pub use speak::SpeakHandler;
pub use trigger::{InboundCallTrigger, WebhookTrigger};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::adk::error::{CallflowError, WorkflowError};
use crate::adk::integration::{IntegrationClient, MockIntegrations};
use crate::adk::model::mock::MockModel;
use crate::adk::model::{Content, Model, TextStream};
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

/// Palette group a node type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Trigger,
    Agent,
    Logic,
    Integration,
}

/// How the session engine drives a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Runs to completion immediately
    FireAndForget,
    /// Streams text to the client
    Output,
    /// Suspends until the user sends a message
    AwaitInput,
}

/// What a streaming handler needs to produce a reply
#[derive(Debug, Clone, Default)]
pub struct ReplyRequest {
    /// The user's message, when replying to one
    pub message: Option<String>,
    /// Recent conversation, oldest first
    pub history: Vec<Content>,
    pub context: ExecutionContext,
}

/// A node type's implementation.
///
/// Handlers keep no per-run state; everything they touch outside the context
/// goes through collaborators injected at construction.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    fn category(&self) -> NodeCategory;

    fn behavior(&self) -> NodeBehavior {
        NodeBehavior::FireAndForget
    }

    /// Run the node and return the next context
    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError>;

    /// Stream a spoken reply. Only `Output` and `AwaitInput` handlers answer.
    async fn respond(&self, node: &Node, _request: ReplyRequest) -> Result<TextStream, CallflowError> {
        Err(CallflowError::handler(
            &node.id,
            format!("node type '{}' does not stream", node.node_type),
        ))
    }
}

/// Stand-in for unknown node types: logs and changes nothing
pub struct PassThrough;

#[async_trait]
impl NodeHandler for PassThrough {
    fn category(&self) -> NodeCategory {
        NodeCategory::Logic
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        log.emit(LogRecord::warning(format!(
            "No handler for node type '{}', passing context through",
            node.node_type
        )));
        Ok(ctx)
    }
}

/// Collaborators handed to the built-in handlers
#[derive(Clone)]
pub struct Services {
    pub model: Arc<dyn Model>,
    pub integrations: Arc<dyn IntegrationClient>,
}

impl Services {
    pub fn new(model: Arc<dyn Model>, integrations: Arc<dyn IntegrationClient>) -> Self {
        Self { model, integrations }
    }

    /// Simulated collaborators, no network
    pub fn mock() -> Self {
        Self::new(Arc::new(MockModel::new()), Arc::new(MockIntegrations::new()))
    }
}

/// Maps node type strings to handlers
#[derive(Clone, Default)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node type bound to `services`
    pub fn builtin(services: &Services) -> Self {
        let mut registry = Self::new();

        let webhook: Arc<dyn NodeHandler> = Arc::new(WebhookTrigger);
        registry.register("trigger", webhook.clone());
        registry.register("webhook", webhook);
        registry.register("inbound-call", Arc::new(InboundCallTrigger));

        let speak: Arc<dyn NodeHandler> = Arc::new(SpeakHandler::new(services.model.clone()));
        registry.register("speak", speak.clone());
        registry.register("speak-text", speak);

        let listen: Arc<dyn NodeHandler> = Arc::new(ListenHandler::new(services.model.clone()));
        for key in ["listen", "listen-understand", "ai"] {
            registry.register(key, listen.clone());
        }

        let condition: Arc<dyn NodeHandler> = Arc::new(ConditionHandler);
        for key in ["condition", "if-else", "logic"] {
            registry.register(key, condition.clone());
        }
        registry.register("sentiment", Arc::new(SentimentHandler));

        let client = &services.integrations;
        registry.register("integration", Arc::new(IntegrationHandler::configured(client.clone())));
        registry.register(
            "sap-create-lead",
            Arc::new(IntegrationHandler::new(client.clone(), "sap", "create-lead", "lead")),
        );
        registry.register(
            "sap-get-customer",
            Arc::new(IntegrationHandler::new(client.clone(), "sap", "get-customer", "customer")),
        );
        registry.register(
            "google-read-sheet",
            Arc::new(IntegrationHandler::new(client.clone(), "google", "read-sheet", "sheetData")),
        );
        registry.register(
            "google-create-event",
            Arc::new(IntegrationHandler::new(client.clone(), "google", "create-event", "event")),
        );
        registry.register(
            "qlay-screen-candidate",
            Arc::new(IntegrationHandler::new(client.clone(), "qlay", "screen-candidate", "screening")),
        );

        registry
    }

    /// Bind `node_type` to `handler`, replacing any earlier binding
    pub fn register(&mut self, node_type: &str, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type.to_string(), handler);
    }

    pub fn resolve(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>, WorkflowError> {
        self.handlers
            .get(node_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))
    }

    /// Handler for `node`, or the pass-through when its type is unknown.
    /// The fallback is recorded as a warning on `log`.
    pub fn handler_for(&self, node: &Node, log: &dyn LogSink) -> Arc<dyn NodeHandler> {
        match self.resolve(&node.node_type) {
            Ok(handler) => handler,
            Err(e) => {
                log.emit(LogRecord::warning(e.to_string()).for_node(node));
                Arc::new(PassThrough)
            }
        }
    }

    /// Whether `node_type` is registered as a trigger
    pub fn is_trigger_type(&self, node_type: &str) -> bool {
        self.handlers
            .get(node_type)
            .is_some_and(|h| h.category() == NodeCategory::Trigger)
    }

    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}
