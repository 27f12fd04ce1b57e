//! Session event protocol
//!
//! Every frame is a JSON object `{"event": <name>, "data": {...}}`. Events
//! without a payload omit `data`.

use serde::{Deserialize, Serialize};

use crate::callflow::graph::Node;

/// Session playback mode, fixed at start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// The engine advances by itself after a delay
    Auto,
    /// Only client `workflow:advance` events move the session
    #[default]
    Manual,
}

/// A frame sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "session:start", rename_all = "camelCase")]
    Start {
        workflow_id: String,
        #[serde(default)]
        mode: SessionMode,
    },
    #[serde(rename = "user:message")]
    UserMessage { text: String },
    #[serde(rename = "workflow:advance", rename_all = "camelCase")]
    Advance { from_node_id: String },
    #[serde(rename = "session:end")]
    End,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Start { .. } => "session:start",
            ClientEvent::UserMessage { .. } => "user:message",
            ClientEvent::Advance { .. } => "workflow:advance",
            ClientEvent::End => "session:end",
        }
    }
}

/// A frame pushed to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "session:started", rename_all = "camelCase")]
    SessionStarted {
        workflow_id: String,
        session_id: String,
        active_node: Node,
        total_nodes: usize,
    },
    #[serde(rename = "ai:processing_start")]
    ProcessingStart,
    #[serde(rename = "ai:chunk")]
    Chunk { text: String },
    #[serde(rename = "ai:processing_end")]
    ProcessingEnd,
    #[serde(rename = "node:execution_complete", rename_all = "camelCase")]
    NodeExecutionComplete { node_id: String },
    #[serde(rename = "workflow:node_activated")]
    NodeActivated { node: Node },
    #[serde(rename = "system:waiting_for_input", rename_all = "camelCase")]
    WaitingForInput { node_id: String, label: String },
    #[serde(rename = "workflow:finished", rename_all = "camelCase")]
    Finished { completed_count: usize },
    #[serde(rename = "error:api")]
    ApiError { message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::SessionStarted { .. } => "session:started",
            ServerEvent::ProcessingStart => "ai:processing_start",
            ServerEvent::Chunk { .. } => "ai:chunk",
            ServerEvent::ProcessingEnd => "ai:processing_end",
            ServerEvent::NodeExecutionComplete { .. } => "node:execution_complete",
            ServerEvent::NodeActivated { .. } => "workflow:node_activated",
            ServerEvent::WaitingForInput { .. } => "system:waiting_for_input",
            ServerEvent::Finished { .. } => "workflow:finished",
            ServerEvent::ApiError { .. } => "error:api",
        }
    }
}
