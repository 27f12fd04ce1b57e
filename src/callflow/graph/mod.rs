// SPDX-License-Identifier: MIT

//! Workflow graphs and the one-shot executor

pub mod executor;
pub mod types;

pub use executor::{ExecutionResult, GraphExecutor};
pub use types::{Edge, Graph, Node};
