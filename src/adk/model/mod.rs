// SPDX-License-Identifier: MIT

//! Model module - streaming LLM collaborator used by speaking nodes
//!
//! Implementations live in their own submodules:
//! - [gemini] - Google's Gemini API (server-sent events)
//! - [mock] - deterministic scripted replies for development and tests

pub mod gemini;
pub mod mock;

use crate::adk::error::CallflowError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A stream of text fragments. The stream ends when the reply is complete.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, CallflowError>> + Send>>;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub text: String,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
        }
    }
}

/// A single generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// System instruction, sent separately from the conversation
    pub system_prompt: Option<String>,
    /// Conversation so far; the last entry is the message to answer
    pub contents: Vec<Content>,
    pub config: GenerationConfig,
}

impl GenerateRequest {
    pub fn new(system_prompt: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            contents: vec![Content::user(message)],
            config: GenerationConfig::default(),
        }
    }

    /// Text of the last message in the request
    pub fn last_message(&self) -> &str {
        self.contents.last().map(|c| c.text.as_str()).unwrap_or("")
    }
}

/// Core trait for streaming model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Start generating a reply. Errors before the first fragment are
    /// returned directly; errors mid-reply arrive as stream items.
    async fn generate_stream(&self, request: GenerateRequest) -> Result<TextStream, CallflowError>;
}
