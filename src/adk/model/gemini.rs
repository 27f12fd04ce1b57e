// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API, streamed over server-sent events

use super::{GenerateRequest, Model, TextStream};
use crate::adk::error::{CallflowError, ModelError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

impl GeminiModel {
    /// Create a new GeminiModel with an explicit key
    pub fn new(model_name: String, api_key: String) -> Result<Self, CallflowError> {
        if api_key.is_empty() {
            return Err(ModelError::ApiKeyMissing("gemini".to_string()).into());
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at another API root, e.g. a proxy
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(request: &GenerateRequest) -> Value {
        let contents: Vec<Value> = request
            .contents
            .iter()
            .map(|c| {
                // Gemini only knows "user" and "model"
                let role = if c.role == "user" { "user" } else { "model" };
                json!({ "role": role, "parts": [{ "text": c.text }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if let Some(system) = &request.system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut generation = serde_json::Map::new();
        if let Some(t) = request.config.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(m) = request.config.max_output_tokens {
            generation.insert("maxOutputTokens".into(), json!(m));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        body
    }
}

/// Pull the text out of one `data:` payload
fn extract_text(payload: &Value) -> Result<String, CallflowError> {
    if let Some(err) = payload.get("error") {
        return Err(CallflowError::api("gemini", err.to_string()));
    }
    let candidate = payload["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| ModelError::InvalidResponse("no candidates in chunk".to_string()))?;

    if candidate.get("finishReason").and_then(|v| v.as_str()) == Some("SAFETY") {
        return Err(ModelError::InvalidResponse(
            "Gemini blocked response due to safety filters".to_string(),
        )
        .into());
    }

    let text = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(text)
}

/// Split complete SSE lines off the front of `buffer`, returning data
/// payloads. Bytes after the last newline stay buffered, so a character split
/// across network chunks is only decoded once it is whole.
fn drain_sse_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        payloads.extend(sse_data(&line));
    }
    payloads
}

/// Payload of one `data:` line, if it is one
fn sse_data(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim().strip_prefix("data:")?.trim();
    (!data.is_empty()).then(|| data.to_string())
}

/// Network errors carry the request URL; drop it so nothing about the
/// endpoint reaches clients
fn scrub(e: reqwest::Error) -> CallflowError {
    CallflowError::Http(e.without_url())
}

/// Parse one payload and send its text on. False once the stream should stop.
async fn forward(tx: &mpsc::Sender<Result<String, CallflowError>>, data: &str) -> bool {
    let item = serde_json::from_str::<Value>(data)
        .map_err(CallflowError::from)
        .and_then(|v| extract_text(&v));
    let failed = item.is_err();
    if matches!(&item, Ok(text) if text.is_empty()) {
        return true;
    }
    tx.send(item).await.is_ok() && !failed
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_stream(&self, request: GenerateRequest) -> Result<TextStream, CallflowError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model_name
        );
        let body = Self::request_body(&request);
        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(scrub)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.map_err(scrub)?;
            return Err(CallflowError::api("gemini", format!("{}: {}", status, text)));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut bytes = resp.bytes_stream();
        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let err = ModelError::Stream(e.without_url().to_string());
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                for data in drain_sse_lines(&mut buffer) {
                    if !forward(&tx, &data).await {
                        return;
                    }
                }
            }
            // Last event may lack a trailing newline
            if let Some(data) = sse_data(&buffer) {
                forward(&tx, &data).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
