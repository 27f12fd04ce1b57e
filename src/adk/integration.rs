// SPDX-License-Identifier: MIT

//! Integration collaborators: CRM, spreadsheet, calendar and screening APIs
//!
//! Nodes never talk to a vendor directly. They hand a JSON payload to an
//! [`IntegrationClient`], which is either the deterministic [`MockIntegrations`]
//! or the [`HttpIntegrations`] gateway client.

use crate::adk::error::CallflowError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Uniform entry point for third-party integrations
#[async_trait]
pub trait IntegrationClient: Send + Sync {
    /// Call `operation` on `service` with a JSON payload
    async fn call(&self, service: &str, operation: &str, payload: Value) -> Result<Value, CallflowError>;
}

/// Canned responses, stable across calls with the same payload
pub struct MockIntegrations;

impl MockIntegrations {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockIntegrations {
    fn default() -> Self {
        Self::new()
    }
}

/// Short stable suffix derived from the payload text
fn payload_tag(payload: &Value) -> String {
    let sum: u32 = payload
        .to_string()
        .bytes()
        .fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    format!("{:06}", sum % 1_000_000)
}

#[async_trait]
impl IntegrationClient for MockIntegrations {
    async fn call(&self, service: &str, operation: &str, payload: Value) -> Result<Value, CallflowError> {
        log::debug!("Mock integration {}/{} payload={}", service, operation, payload);
        let tag = payload_tag(&payload);

        let response = match (service, operation) {
            ("sap", "create-lead") => json!({
                "leadId": format!("LEAD-{}", tag),
                "status": "created",
                "lead": payload,
            }),
            ("sap", "get-customer") => {
                let id = payload
                    .get("customerId")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("CUST-{}", tag));
                json!({
                    "customerId": id,
                    "companyName": "Acme Industries",
                    "tier": "gold",
                    "openOrders": 2,
                })
            }
            ("google", "read-sheet") => json!({
                "data": [
                    ["Name", "Email", "Status"],
                    ["Jane Doe", "jane@example.com", "active"],
                    ["John Roe", "john@example.com", "pending"],
                ],
                "rows": 3,
            }),
            ("google", "create-event") => json!({
                "eventId": format!("evt-{}", tag),
                "status": "confirmed",
                "event": payload,
            }),
            ("qlay", "screen-candidate") => json!({
                "screeningId": format!("scr-{}", tag),
                "score": 82,
                "recommendation": "advance",
            }),
            _ => json!({
                "service": service,
                "operation": operation,
                "echo": payload,
            }),
        };
        Ok(response)
    }
}

/// Posts payloads to an integrations gateway at `<base_url>/api/<service>/<operation>`
pub struct HttpIntegrations {
    client: Client,
    base_url: String,
}

impl HttpIntegrations {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, service: &str, operation: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, service, operation)
    }
}

#[async_trait]
impl IntegrationClient for HttpIntegrations {
    async fn call(&self, service: &str, operation: &str, payload: Value) -> Result<Value, CallflowError> {
        let url = self.endpoint(service, operation);
        log::info!("Calling integration {}", url);

        let resp = self.client.post(&url).json(&payload).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CallflowError::api(service, format!("{} ({})", text, status)));
        }
        Ok(resp.json().await?)
    }
}
