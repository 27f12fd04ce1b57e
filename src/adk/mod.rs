// SPDX-License-Identifier: MIT

//! Collaborator kit: errors, streaming models and integration clients

pub mod error;
pub mod integration;
pub mod model;
