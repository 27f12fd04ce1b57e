// SPDX-License-Identifier: MIT

//! Execution context threaded through a run
//!
//! The context is a JSON object of named variables. Handlers take it by value
//! and hand back the next version. The reserved `activeOutputs` key carries
//! branch selection from one node to the edge filter and never reaches the
//! next node.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Reserved key carrying the logical outputs a node activated
pub const ACTIVE_OUTPUTS: &str = "activeOutputs";

/// Variables visible to nodes during a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    fields: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; non-objects give an empty context
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field, returning the updated context
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Get a nested field value using dot notation (e.g., "intent.action")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    /// Mark which logical outputs the current node activated
    pub fn with_active_outputs<I, S>(self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outputs: Vec<Value> = outputs.into_iter().map(|s| Value::String(s.into())).collect();
        self.with(ACTIVE_OUTPUTS, Value::Array(outputs))
    }

    /// Outputs activated by the last node, if it chose any
    pub fn active_outputs(&self) -> Option<HashSet<String>> {
        let outputs = self.fields.get(ACTIVE_OUTPUTS)?;
        let set = match outputs {
            Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            Value::String(s) => std::iter::once(s.clone()).collect(),
            _ => return None,
        };
        Some(set)
    }

    /// Context with the branch tag removed, as handed to the next node
    pub fn without_active_outputs(mut self) -> Self {
        self.fields.remove(ACTIVE_OUTPUTS);
        self
    }

    /// Replace `{{key}}` placeholders with context values. Dotted paths work
    /// too; unknown placeholders are left as written.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let key = rest[start + 2..start + 2 + len].trim();
            out.push_str(&rest[..start]);
            match self.get_path(key) {
                Some(value) => out.push_str(&value_to_text(value)),
                None => out.push_str(&rest[start..start + 4 + len]),
            }
            rest = &rest[start + 4 + len..];
        }
        out.push_str(rest);
        out
    }

    /// Resolve a mapping source: quoted strings are literals, anything else
    /// is a dotted path into the context
    pub fn resolve(&self, source: &str) -> Option<Value> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }
        let quoted = source.len() >= 2
            && ((source.starts_with('"') && source.ends_with('"'))
                || (source.starts_with('\'') && source.ends_with('\'')));
        if quoted {
            return Some(Value::String(source[1..source.len() - 1].to_string()));
        }
        self.get_path(source).cloned()
    }

    /// Build an object from `{field: source}` mappings. Unresolved sources
    /// become `null`.
    pub fn apply_mappings(&self, mappings: &Map<String, Value>) -> Value {
        let mut result = Map::new();
        for (field, source) in mappings {
            if let Some(source) = source.as_str().filter(|s| !s.is_empty()) {
                result.insert(field.clone(), self.resolve(source).unwrap_or(Value::Null));
            }
        }
        Value::Object(result)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert context to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Render a JSON value the way it reads in spoken text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
