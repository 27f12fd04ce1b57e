// SPDX-License-Identifier: MIT

//! `listen` / `listen-understand` / `ai`: wait for the caller and answer

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{NodeBehavior, NodeCategory, NodeHandler, ReplyRequest};
use crate::adk::error::CallflowError;
use crate::adk::model::{GenerateRequest, Model, TextStream};
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

/// What a one-shot run "hears" when no input is configured
pub const DEFAULT_SIMULATED_INPUT: &str = "Yes, I would like to proceed";

pub struct ListenHandler {
    model: Arc<dyn Model>,
}

impl ListenHandler {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

/// Rough intent from keywords, enough for branching on yes/no answers
fn infer_intent(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has = |w: &str| lower.split(|c: char| !c.is_alphanumeric()).any(|t| t == w);
    if has("yes") || has("proceed") || has("sure") {
        "proceed"
    } else if has("no") || has("stop") || has("cancel") {
        "decline"
    } else {
        "unknown"
    }
}

/// Record what the caller said so later nodes can branch on it
pub fn with_user_input(ctx: ExecutionContext, text: &str) -> ExecutionContext {
    ctx.with("userResponse", json!(text))
        .with("transcribedText", json!(text))
        .with("intent", json!({ "action": infer_intent(text), "confidence": 0.95 }))
}

#[async_trait]
impl NodeHandler for ListenHandler {
    fn category(&self) -> NodeCategory {
        NodeCategory::Agent
    }

    fn behavior(&self) -> NodeBehavior {
        NodeBehavior::AwaitInput
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        let timeout = node.config.get("timeout").and_then(|v| v.as_u64()).unwrap_or(10);
        log.emit(LogRecord::info(format!("Listening for {} seconds...", timeout)));

        let heard = node
            .config_str("simulatedInput")
            .unwrap_or(DEFAULT_SIMULATED_INPUT)
            .to_string();
        let ctx = with_user_input(ctx, &heard);
        log.emit(
            LogRecord::info(format!("Heard: \"{}\"", heard))
                .with_data(ctx.get("intent").cloned().unwrap_or_default()),
        );
        Ok(ctx)
    }

    async fn respond(&self, node: &Node, request: ReplyRequest) -> Result<TextStream, CallflowError> {
        let conversation = request
            .history
            .iter()
            .map(|c| format!("{}: {}", c.role.to_uppercase(), c.text))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are processing this workflow step: \"{}\"\n\nRecent conversation:\n{}\n\nRespond naturally to the user's message.",
            node.display_name(),
            conversation
        );
        let message = request.message.unwrap_or_default();
        self.model
            .generate_stream(GenerateRequest::new(system, message))
            .await
    }
}
