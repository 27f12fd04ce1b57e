// SPDX-License-Identifier: MIT

//! Entry-point nodes

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{NodeCategory, NodeHandler};
use crate::adk::error::CallflowError;
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

/// `webhook` / `trigger`: exposes the incoming payload to later nodes.
///
/// A `webhookPayload` already present in the initial context wins over the
/// configured sample payload.
pub struct WebhookTrigger;

#[async_trait]
impl NodeHandler for WebhookTrigger {
    fn category(&self) -> NodeCategory {
        NodeCategory::Trigger
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        log.emit(LogRecord::info("Webhook triggered"));

        let payload = ctx
            .get("webhookPayload")
            .cloned()
            .or_else(|| node.config.get("payload").cloned())
            .unwrap_or_else(|| json!({ "message": "Simulated webhook data" }));

        Ok(ctx
            .with("webhookPayload", payload)
            .with("headers", json!({ "content-type": "application/json" })))
    }
}

/// `inbound-call`: a phone call reached the flow
pub struct InboundCallTrigger;

fn string_or(ctx: &ExecutionContext, node: &Node, ctx_key: &str, config_key: &str, default: &str) -> String {
    ctx.get(ctx_key)
        .and_then(Value::as_str)
        .or_else(|| node.config_str(config_key))
        .unwrap_or(default)
        .to_string()
}

#[async_trait]
impl NodeHandler for InboundCallTrigger {
    fn category(&self) -> NodeCategory {
        NodeCategory::Trigger
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        log.emit(LogRecord::info("Inbound call received"));

        let from = string_or(&ctx, node, "callerId", "from", "+15550100");
        let to = node.config_str("to").unwrap_or("+15550199").to_string();
        let call_data = json!({
            "callSid": format!("CA{}", uuid::Uuid::new_v4().simple()),
            "from": from,
            "to": to,
            "direction": "inbound",
            "status": "connected",
        });

        log.emit(
            LogRecord::info(format!("Call from {} to {}", from, to)).with_data(call_data.clone()),
        );

        Ok(ctx.with("callerId", json!(from)).with("callData", call_data))
    }
}
