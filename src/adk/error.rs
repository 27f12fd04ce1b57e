// SPDX-License-Identifier: MIT

//! Typed error handling for callflow-rs
//!
//! `CallflowError` is the crate-wide error. Workflow execution problems are
//! grouped under [`WorkflowError`], which mirrors the recovery taxonomy of the
//! engine: some variants abort a one-shot run, others are logged and ignored.

use thiserror::Error;

/// Top-level error type for callflow-rs
#[derive(Debug, Error)]
pub enum CallflowError {
    /// API errors from external services (Gemini, CRM, calendar, etc.)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow-specific errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No handler registered for a node type. Recovered with a pass-through.
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A node handler failed. Aborts a one-shot run.
    #[error("Node '{node_id}' failed: {message}")]
    HandlerFailure { node_id: String, message: String },

    /// A session event arrived in a state that does not accept it.
    #[error("Invalid transition: {event} while {state}")]
    InvalidTransition { event: String, state: String },

    /// The graph has no trigger node.
    #[error("No entry point: graph has no trigger node")]
    NoEntryPoint,

    /// The store has no graph under this id
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Graph violates a structural invariant
    #[error("Invalid graph: {0}")]
    GraphInvalid(String),

    /// Work abandoned because the session ended
    #[error("Cancelled")]
    Cancelled,
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// The stream broke before completion
    #[error("Stream interrupted: {0}")]
    Stream(String),
}

impl CallflowError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a handler failure for a node
    pub fn handler(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Workflow(WorkflowError::HandlerFailure {
            node_id: node_id.into(),
            message: message.into(),
        })
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// True when this error only means the session went away
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Workflow(WorkflowError::Cancelled))
    }
}

impl From<&str> for CallflowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for CallflowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
