// SPDX-License-Identifier: MIT

//! Workflow storage
//!
//! Graphs are looked up by workflow id. The in-memory store backs tests and
//! embedding; the directory store keeps one YAML or JSON file per workflow.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::adk::error::{CallflowError, WorkflowError};
use crate::callflow::graph::Graph;

/// Source of workflow graphs
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get_graph(&self, id: &str) -> Result<Graph, CallflowError>;

    /// Validate and persist `graph` under `id`
    async fn save_graph(&self, id: &str, graph: Graph) -> Result<(), CallflowError>;

    /// Known workflow ids, sorted
    async fn list(&self) -> Result<Vec<String>, CallflowError>;
}

/// Parse a graph from YAML, or JSON when `json` is set, and validate it
pub fn parse_graph(content: &str, json: bool) -> Result<Graph, CallflowError> {
    let graph: Graph = if json {
        serde_json::from_str(content)?
    } else {
        serde_yaml::from_str(content)?
    };
    graph.validate()?;
    Ok(graph)
}

/// Load a graph file, choosing the format by extension
pub fn load_graph<P: AsRef<Path>>(path: P) -> Result<Graph, CallflowError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    parse_graph(&content, is_json(path))
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[derive(Default)]
pub struct InMemoryStore {
    graphs: RwLock<HashMap<String, Graph>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `graphs`, unvalidated
    pub fn with_graphs<I>(graphs: I) -> Self
    where
        I: IntoIterator<Item = (String, Graph)>,
    {
        Self {
            graphs: RwLock::new(graphs.into_iter().collect()),
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn get_graph(&self, id: &str) -> Result<Graph, CallflowError> {
        self.graphs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.to_string()).into())
    }

    async fn save_graph(&self, id: &str, graph: Graph) -> Result<(), CallflowError> {
        graph.validate()?;
        self.graphs.write().await.insert(id.to_string(), graph);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CallflowError> {
        let mut ids: Vec<String> = self.graphs.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// One file per workflow: `<dir>/<id>.yaml`, `.yml` or `.json`
pub struct DirectoryStore {
    dir: PathBuf,
}

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ids become file names, so anything that could escape the directory is
    /// refused
    fn check_id(id: &str) -> Result<(), CallflowError> {
        let ok = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if ok {
            Ok(())
        } else {
            Err(WorkflowError::WorkflowNotFound(id.to_string()).into())
        }
    }

    async fn find_file(&self, id: &str) -> Option<PathBuf> {
        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", id, ext));
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }
        None
    }
}

#[async_trait]
impl WorkflowStore for DirectoryStore {
    async fn get_graph(&self, id: &str) -> Result<Graph, CallflowError> {
        Self::check_id(id)?;
        let path = self
            .find_file(id)
            .await
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.to_string()))?;
        log::debug!("Loading workflow {} from {}", id, path.display());
        let content = tokio::fs::read_to_string(&path).await?;
        parse_graph(&content, is_json(&path))
    }

    async fn save_graph(&self, id: &str, graph: Graph) -> Result<(), CallflowError> {
        Self::check_id(id)?;
        graph.validate()?;

        // Existing files keep their format; new ones are YAML
        let path = match self.find_file(id).await {
            Some(path) => path,
            None => self.dir.join(format!("{}.yaml", id)),
        };
        let content = if is_json(&path) {
            serde_json::to_string_pretty(&graph)?
        } else {
            serde_yaml::to_string(&graph)?
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, content).await?;
        log::info!("Saved workflow {} to {}", id, path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CallflowError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e));
            if let (true, Some(stem)) = (known, path.file_stem().and_then(|s| s.to_str())) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
