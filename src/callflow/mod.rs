// SPDX-License-Identifier: MIT

//! Workflow execution for conversational call flows

pub mod condition;
pub mod config;
pub mod context;
pub mod graph;
pub mod nodes;
pub mod server;
pub mod session;
pub mod store;
pub mod trace;
