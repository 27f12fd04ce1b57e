// SPDX-License-Identifier: MIT

//! Integration nodes: map context fields into a payload and call a service

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{NodeCategory, NodeHandler};
use crate::adk::error::CallflowError;
use crate::adk::integration::IntegrationClient;
use crate::callflow::context::ExecutionContext;
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

/// Where the service and operation come from
enum Target {
    Fixed {
        service: String,
        operation: String,
        output_key: String,
    },
    /// Read `service`, `operation` and `outputKey` from node config
    Configured,
}

pub struct IntegrationHandler {
    client: Arc<dyn IntegrationClient>,
    target: Target,
}

const DEFAULT_OUTPUT_KEY: &str = "integrationResult";

impl IntegrationHandler {
    /// Handler bound to one service operation
    pub fn new(
        client: Arc<dyn IntegrationClient>,
        service: &str,
        operation: &str,
        output_key: &str,
    ) -> Self {
        Self {
            client,
            target: Target::Fixed {
                service: service.to_string(),
                operation: operation.to_string(),
                output_key: output_key.to_string(),
            },
        }
    }

    /// Generic `integration` node configured entirely by the graph
    pub fn configured(client: Arc<dyn IntegrationClient>) -> Self {
        Self {
            client,
            target: Target::Configured,
        }
    }

    fn resolve_target<'a>(&'a self, node: &'a Node) -> Result<(&'a str, &'a str, &'a str), CallflowError> {
        match &self.target {
            Target::Fixed {
                service,
                operation,
                output_key,
            } => Ok((
                service.as_str(),
                operation.as_str(),
                node.config_str("outputKey").unwrap_or(output_key.as_str()),
            )),
            Target::Configured => {
                let service = node
                    .config_str("service")
                    .ok_or_else(|| CallflowError::handler(&node.id, "integration node needs a 'service'"))?;
                let operation = node
                    .config_str("operation")
                    .ok_or_else(|| CallflowError::handler(&node.id, "integration node needs an 'operation'"))?;
                Ok((
                    service,
                    operation,
                    node.config_str("outputKey").unwrap_or(DEFAULT_OUTPUT_KEY),
                ))
            }
        }
    }
}

#[async_trait]
impl NodeHandler for IntegrationHandler {
    fn category(&self) -> NodeCategory {
        NodeCategory::Integration
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        let (service, operation, output_key) = self.resolve_target(node)?;

        let mappings = node
            .config
            .get("fieldMappings")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);
        let payload = ctx.apply_mappings(&mappings);

        log.emit(
            LogRecord::info(format!("Calling {} {}", service, operation)).with_data(payload.clone()),
        );

        let response = self
            .client
            .call(service, operation, payload)
            .await
            .map_err(|e| CallflowError::handler(&node.id, e.to_string()))?;

        log.emit(LogRecord::success(format!("{} {} completed", service, operation)));

        let mut ctx = ctx.with(output_key, response.clone());
        // Surface record ids at top level so later nodes can reference them
        if let Some(obj) = response.as_object() {
            for (key, value) in obj.iter().filter(|(k, _)| k.ends_with("Id")) {
                ctx.insert(key, value.clone());
            }
        }
        Ok(ctx)
    }
}
