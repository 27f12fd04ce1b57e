//! Graph type definitions
//!
//! A workflow graph is a list of typed nodes joined by directed edges. Node
//! listing order matters: it decides which trigger runs first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::adk::error::WorkflowError;

/// A node in the workflow graph
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Node {
    /// Unique identifier within the graph
    pub id: String,
    /// Handler key, e.g. `speak-text` or `condition`
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    /// Free-form handler configuration
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: label.into(),
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: &str, value: Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// String config value, if set
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Label for logs, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Logical output of the source this edge carries. `None` is unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_output: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_id: source.into(),
            target_id: target.into(),
            source_output: None,
        }
    }

    /// Edge taken only when the source activates `output`
    pub fn branch(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            source_output: Some(output.into()),
            ..Self::new(id, source, target)
        }
    }

    /// Whether this edge is followed given the source's active outputs
    pub fn is_selected(&self, active_outputs: Option<&HashSet<String>>) -> bool {
        match (active_outputs, &self.source_output) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(active), Some(output)) => active.contains(output),
        }
    }
}

/// An immutable workflow graph
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Check unique node ids and that every edge endpoint exists
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(WorkflowError::GraphInvalid(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source_id, &edge.target_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::GraphInvalid(format!(
                        "edge '{}' refers to missing node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges leaving `node_id`, in listing order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source_id == node_id)
    }

    pub fn has_incoming(&self, node_id: &str) -> bool {
        self.edges.iter().any(|e| e.target_id == node_id)
    }

    /// Entry points in listing order: nodes without incoming edges, plus any
    /// node whose type `is_trigger_type` accepts
    pub fn triggers<F>(&self, is_trigger_type: F) -> Vec<&Node>
    where
        F: Fn(&str) -> bool,
    {
        self.nodes
            .iter()
            .filter(|n| !self.has_incoming(&n.id) || is_trigger_type(&n.node_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> Graph {
        Graph::new(
            vec![
                Node::new("a", "webhook", "A"),
                Node::new("b", "speak", "B"),
                Node::new("c", "listen", "C"),
            ],
            vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "c")],
        )
    }

    #[test]
    fn test_triggers_without_incoming() {
        let graph = linear();
        let ids: Vec<_> = graph.triggers(|_| false).iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_triggers_tagged_by_type() {
        let graph = Graph::new(
            vec![Node::new("a", "webhook", "A"), Node::new("b", "speak", "B")],
            vec![Edge::new("e1", "a", "b"), Edge::new("e2", "b", "a")],
        );
        assert!(graph.triggers(|_| false).is_empty());
        let tagged = graph.triggers(|t| t == "webhook");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "a");
    }

    #[test]
    fn test_validate_rejects_dangling_edge() {
        let mut graph = linear();
        graph.edges.push(Edge::new("e3", "c", "missing"));
        assert!(matches!(graph.validate(), Err(WorkflowError::GraphInvalid(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut graph = linear();
        graph.nodes.push(Node::new("a", "speak", "again"));
        assert!(graph.validate().is_err());
        assert!(linear().validate().is_ok());
    }

    #[test]
    fn test_edge_selection() {
        let active: HashSet<String> = ["true".to_string()].into_iter().collect();
        assert!(Edge::new("e", "a", "b").is_selected(Some(&active)));
        assert!(Edge::branch("e", "a", "b", "true").is_selected(Some(&active)));
        assert!(!Edge::branch("e", "a", "b", "false").is_selected(Some(&active)));
        assert!(Edge::branch("e", "a", "b", "false").is_selected(None));
    }

    #[test]
    fn test_deserialize_camel_case_edges() {
        let yaml = r#"
nodes:
  - id: start
    type: inbound-call
    label: Inbound Call
  - id: check
    type: condition
    config:
      expression: "intent == 'proceed'"
edges:
  - id: e1
    sourceId: start
    targetId: check
  - id: e2
    sourceId: check
    targetId: start
    sourceOutput: "false"
"#;
        let graph: Graph = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(graph.nodes[0].node_type, "inbound-call");
        assert_eq!(graph.nodes[1].config_str("expression"), Some("intent == 'proceed'"));
        assert_eq!(graph.nodes[1].display_name(), "check");
        assert_eq!(graph.edges[1].source_output.as_deref(), Some("false"));
        assert_eq!(graph.edges[0].source_output, None);
    }
}
