// SPDX-License-Identifier: MIT

//! Mock model - scripted, word-by-word replies

use super::{GenerateRequest, Model, TextStream};
use crate::adk::error::{CallflowError, ModelError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Deterministic model used when the backend is `mock`.
///
/// With scripted replies it cycles through them; without, it echoes the last
/// message back. Replies are split on word boundaries and sent one fragment
/// at a time.
pub struct MockModel {
    replies: Vec<String>,
    cursor: AtomicUsize,
    chunk_delay: Duration,
    fail_after: Option<usize>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            replies: Vec::new(),
            cursor: AtomicUsize::new(0),
            chunk_delay: Duration::ZERO,
            fail_after: None,
        }
    }

    /// Cycle through fixed replies
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies,
            ..Self::new()
        }
    }

    /// Sleep between fragments
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Break every stream after `chunks` fragments
    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    fn next_reply(&self, request: &GenerateRequest) -> String {
        if self.replies.is_empty() {
            return format!("You said: {}", request.last_message());
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.replies.len();
        self.replies[idx].clone()
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_stream(&self, request: GenerateRequest) -> Result<TextStream, CallflowError> {
        let reply = self.next_reply(&request);
        let fragments: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        let delay = self.chunk_delay;
        let fail_after = self.fail_after;

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let err = ModelError::Stream("mock stream failure".to_string());
                    let _ = tx.send(Err(err.into())).await;
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(fragment)).await.is_err() {
                    // receiver dropped, reply abandoned
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
