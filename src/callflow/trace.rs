// SPDX-License-Identifier: MIT

//! Execution log shared by the one-shot executor and sessions
//!
//! Entries are append-only and ordered by creation. A bounded log drops its
//! oldest entries past the limit; ids keep counting up. Every entry is also
//! forwarded to the `log` facade so a running server shows the same trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::callflow::graph::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An entry before the sink assigns id and timestamp
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: LogLevel,
    pub node_id: Option<String>,
    pub node_label: Option<String>,
    pub message: String,
    pub data: Option<Value>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            node_id: None,
            node_label: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn for_node(mut self, node: &Node) -> Self {
        self.node_id = Some(node.id.clone());
        self.node_label = Some(node.display_name().to_string());
        self
    }
}

/// Destination for log records. Emitting never fails.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: LogRecord);
}

/// In-memory, append-only execution log
#[derive(Debug, Default)]
pub struct ExecutionLog {
    entries: Mutex<VecDeque<LogEntry>>,
    counter: AtomicU64,
    limit: Option<usize>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log keeping at most `limit` of the latest entries
    pub fn bounded(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Entries so far, in creation order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the entries out, leaving the log empty
    pub fn take(&self) -> Vec<LogEntry> {
        std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
        .into()
    }
}

fn mirror(entry: &LogEntry) {
    let scope = entry.node_label.as_deref().unwrap_or("flow");
    match entry.level {
        LogLevel::Info | LogLevel::Success => log::info!("[{}] {}", scope, entry.message),
        LogLevel::Warning => log::warn!("[{}] {}", scope, entry.message),
        LogLevel::Error => log::error!("[{}] {}", scope, entry.message),
    }
}

impl LogSink for ExecutionLog {
    fn emit(&self, record: LogRecord) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // id and push under the same lock keep ids in append order
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let entry = LogEntry {
            id: format!("log-{}", n),
            timestamp: Utc::now(),
            level: record.level,
            node_id: record.node_id,
            node_label: record.node_label,
            message: record.message,
            data: record.data,
        };
        mirror(&entry);
        entries.push_back(entry);
        if let Some(limit) = self.limit {
            while entries.len() > limit {
                entries.pop_front();
            }
        }
    }
}

/// Stamps node id and label on records emitted by a handler
pub struct NodeLogSink<'a> {
    inner: &'a dyn LogSink,
    node: &'a Node,
}

impl<'a> NodeLogSink<'a> {
    pub fn new(inner: &'a dyn LogSink, node: &'a Node) -> Self {
        Self { inner, node }
    }
}

impl LogSink for NodeLogSink<'_> {
    fn emit(&self, record: LogRecord) {
        self.inner.emit(record.for_node(self.node));
    }
}
