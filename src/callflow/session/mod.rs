// SPDX-License-Identifier: MIT

//! Interactive sessions
//!
//! A session plays a workflow one node at a time for a single client,
//! streaming model output and pausing where the user has to answer. Each
//! session is a task that owns its state and handles events in arrival order.

mod engine;
pub mod protocol;

pub use engine::{SessionConfig, SessionEngine, SessionHandle};
pub use protocol::{ClientEvent, ServerEvent, SessionMode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::adk::model::Content;
use crate::callflow::context::ExecutionContext;
use crate::callflow::trace::LogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Starting,
    NodeActive,
    WaitingForInput,
    Advancing,
    Finished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::NodeActive => "node-active",
            SessionState::WaitingForInput => "waiting-for-input",
            SessionState::Advancing => "advancing",
            SessionState::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "ai",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Conversation state of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub workflow_id: String,
    pub mode: SessionMode,
    pub active_node_id: Option<String>,
    /// Completion order, no duplicates
    pub completed_node_ids: Vec<String>,
    pub conversation_history: Vec<HistoryEntry>,
    pub context: ExecutionContext,
}

impl Session {
    pub fn new(session_id: &str, workflow_id: &str, mode: SessionMode) -> Self {
        Self {
            session_id: session_id.to_string(),
            workflow_id: workflow_id.to_string(),
            mode,
            active_node_id: None,
            completed_node_ids: Vec::new(),
            conversation_history: Vec::new(),
            context: ExecutionContext::new(),
        }
    }

    pub fn mark_completed(&mut self, node_id: &str) {
        if !self.completed_node_ids.iter().any(|id| id == node_id) {
            self.completed_node_ids.push(node_id.to_string());
        }
    }

    /// Append to the history, keeping at most `limit` entries
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.conversation_history.push(entry);
        let excess = self.conversation_history.len().saturating_sub(limit);
        if excess > 0 {
            self.conversation_history.drain(..excess);
        }
    }

    /// The last `n` history entries, oldest first, as model input
    pub fn history_window(&self, n: usize) -> Vec<Content> {
        let start = self.conversation_history.len().saturating_sub(n);
        self.conversation_history[start..]
            .iter()
            .map(|entry| Content {
                role: entry.role.as_str().to_string(),
                text: entry.content.clone(),
            })
            .collect()
    }
}

/// Point-in-time view of a session, for inspection and tests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<Session>,
    pub log: Vec<LogEntry>,
}
