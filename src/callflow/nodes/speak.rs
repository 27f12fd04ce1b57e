// SPDX-License-Identifier: MIT

//! `speak` / `speak-text`: the agent says something

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{NodeBehavior, NodeCategory, NodeHandler, ReplyRequest};
use crate::adk::error::CallflowError;
use crate::adk::model::{GenerateRequest, Model, TextStream};
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

const SPEAK_SYSTEM_PROMPT: &str = "You are speaking to a user. Be friendly and conversational.";

pub struct SpeakHandler {
    model: Arc<dyn Model>,
}

impl SpeakHandler {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }

    /// Configured text with `{{var}}` filled in. Falls back to the label,
    /// then to a plain greeting.
    pub fn spoken_text(node: &Node, ctx: &ExecutionContext) -> String {
        let template = node
            .config_str("text")
            .filter(|t| !t.trim().is_empty())
            .or(Some(node.label.as_str()).filter(|l| !l.trim().is_empty()))
            .unwrap_or("Hello");
        ctx.interpolate(template)
    }
}

#[async_trait]
impl NodeHandler for SpeakHandler {
    fn category(&self) -> NodeCategory {
        NodeCategory::Agent
    }

    fn behavior(&self) -> NodeBehavior {
        NodeBehavior::Output
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        let text = Self::spoken_text(node, &ctx);
        let voice = node.config_str("voiceId").unwrap_or("default");

        log.emit(
            LogRecord::info(format!("SpeakText: \"{}\"", text))
                .with_data(json!({ "voiceId": voice, "characterCount": text.chars().count() })),
        );

        Ok(ctx.with("lastSpokenText", json!(text)))
    }

    async fn respond(&self, node: &Node, request: ReplyRequest) -> Result<TextStream, CallflowError> {
        let text = Self::spoken_text(node, &request.context);
        let prompt = format!("Say this to the user in a natural way: \"{}\"", text);
        self.model
            .generate_stream(GenerateRequest::new(SPEAK_SYSTEM_PROMPT, prompt))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::mock::MockModel;
    use crate::callflow::trace::ExecutionLog;
    use futures::StreamExt;

    #[test]
    fn test_spoken_text_fallbacks() {
        let ctx = ExecutionContext::new().with("name", json!("Ada"));

        let node = Node::new("s", "speak", "Greet").with_config("text", json!("Hi {{name}}"));
        assert_eq!(SpeakHandler::spoken_text(&node, &ctx), "Hi Ada");

        let node = Node::new("s", "speak", "Welcome aboard");
        assert_eq!(SpeakHandler::spoken_text(&node, &ctx), "Welcome aboard");

        let node = Node::new("s", "speak", "");
        assert_eq!(SpeakHandler::spoken_text(&node, &ctx), "Hello");
    }

    #[tokio::test]
    async fn test_execute_records_last_spoken_text() {
        let handler = SpeakHandler::new(Arc::new(MockModel::new()));
        let log = ExecutionLog::new();
        let node = Node::new("s", "speak-text", "Greet").with_config("text", json!("Thanks for calling"));

        let out = handler.execute(&node, ExecutionContext::new(), &log).await.unwrap();
        assert_eq!(out.get("lastSpokenText"), Some(&json!("Thanks for calling")));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_respond_streams_model_reply() {
        let model = MockModel::with_replies(vec!["Hello there, friend".into()]);
        let handler = SpeakHandler::new(Arc::new(model));
        let node = Node::new("s", "speak", "Greet");

        let stream = handler.respond(&node, ReplyRequest::default()).await.unwrap();
        let text: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(text.concat(), "Hello there, friend");
    }
}
