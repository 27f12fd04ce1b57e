// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Values come from an optional YAML file, then environment variables
//! override them. The backend decides which collaborators the node
//! registry is built with.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::adk::error::CallflowError;
use crate::adk::integration::{HttpIntegrations, IntegrationClient, MockIntegrations};
use crate::adk::model::gemini::GeminiModel;
use crate::adk::model::Model;
use crate::callflow::nodes::Services;

/// Which collaborators back the node handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Mock,
    Live,
}

impl FromStr for Backend {
    type Err = CallflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Backend::Mock),
            "live" => Ok(Backend::Live),
            other => Err(CallflowError::config(format!(
                "unknown backend '{}', expected 'mock' or 'live'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Delay before an auto-mode session advances past a finished node
    pub auto_advance_ms: u64,
    /// History entries handed to a node replying to the user
    pub history_window: usize,
    /// Where the directory store keeps workflow files
    pub workflows_dir: PathBuf,
    /// Integrations gateway for the live backend
    pub integrations_url: Option<String>,
    pub gemini_model: String,
    /// Only ever read from the environment
    #[serde(skip)]
    pub api_key: Option<String>,
    pub bind: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mock,
            auto_advance_ms: 1500,
            history_window: 5,
            workflows_dir: PathBuf::from("workflows"),
            integrations_url: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            api_key: None,
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then `path` if given, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, CallflowError> {
        let config = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_yaml(content: &str) -> Result<Self, CallflowError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from `lookup`, which maps variable names to values
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, CallflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CALLFLOW_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("CALLFLOW_AUTO_ADVANCE_MS") {
            self.auto_advance_ms = parse_number("CALLFLOW_AUTO_ADVANCE_MS", &v)?;
        }
        if let Some(v) = lookup("CALLFLOW_HISTORY_WINDOW") {
            self.history_window = parse_number("CALLFLOW_HISTORY_WINDOW", &v)?;
        }
        if let Some(v) = lookup("CALLFLOW_WORKFLOWS_DIR") {
            self.workflows_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CALLFLOW_INTEGRATIONS_URL") {
            self.integrations_url = Some(v);
        }
        if let Some(v) = lookup("CALLFLOW_BIND") {
            self.bind = v;
        }
        if let Some(v) = lookup("GEMINI_MODEL") {
            self.gemini_model = v;
        }
        if let Some(v) = lookup("GOOGLE_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(v);
        }
        Ok(self)
    }

    pub fn auto_advance_delay(&self) -> Duration {
        Duration::from_millis(self.auto_advance_ms)
    }

    /// Collaborators for the configured backend
    pub fn services(&self) -> Result<Services, CallflowError> {
        match self.backend {
            Backend::Mock => {
                log::info!("Using mock collaborators");
                Ok(Services::mock())
            }
            Backend::Live => {
                let key = self.api_key.clone().unwrap_or_default();
                let model: Arc<dyn Model> = Arc::new(GeminiModel::new(self.gemini_model.clone(), key)?);
                let integrations: Arc<dyn IntegrationClient> = match &self.integrations_url {
                    Some(url) => Arc::new(HttpIntegrations::new(url.clone())),
                    None => {
                        log::warn!("CALLFLOW_INTEGRATIONS_URL not set, integrations stay mocked");
                        Arc::new(MockIntegrations::new())
                    }
                };
                log::info!("Using Gemini model: {}", self.gemini_model);
                Ok(Services::new(model, integrations))
            }
        }
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, CallflowError> {
    value
        .trim()
        .parse()
        .map_err(|_| CallflowError::config(format!("{} must be a number, got '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.backend, Backend::Mock);
        assert_eq!(config.auto_advance_delay(), Duration::from_millis(1500));
        assert_eq!(config.history_window, 5);
    }

    #[test]
    fn test_yaml_then_env() {
        let config = EngineConfig::from_yaml("autoAdvanceMs: 200\nhistoryWindow: 3\n")
            .unwrap()
            .with_env(env(&[("CALLFLOW_HISTORY_WINDOW", "8"), ("GEMINI_MODEL", "gemini-2.0-flash")]))
            .unwrap();

        assert_eq!(config.auto_advance_ms, 200);
        assert_eq!(config.history_window, 8);
        assert_eq!(config.gemini_model, "gemini-2.0-flash");
        assert_eq!(config.bind, "127.0.0.1:3000");
    }

    #[test]
    fn test_bad_env_values() {
        let err = EngineConfig::default()
            .with_env(env(&[("CALLFLOW_AUTO_ADVANCE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("CALLFLOW_AUTO_ADVANCE_MS"));

        assert!(EngineConfig::default()
            .with_env(env(&[("CALLFLOW_BACKEND", "staging")]))
            .is_err());
    }

    #[test]
    fn test_live_backend_needs_api_key() {
        let config = EngineConfig::default()
            .with_env(env(&[("CALLFLOW_BACKEND", "LIVE")]))
            .unwrap();
        assert_eq!(config.backend, Backend::Live);
        assert!(config.services().is_err());

        let config = config.with_env(env(&[("GOOGLE_API_KEY", "test-key")])).unwrap();
        assert!(config.services().is_ok());
    }
}
