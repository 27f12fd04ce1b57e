// SPDX-License-Identifier: MIT

//! Condition evaluation for logic nodes
//!
//! Conditions are simple expressions like:
//! - `intent.action == 'proceed'`
//! - `sentimentScore > 0.8`
//! - `customer.tier == 'gold' and openOrders > 0`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::parse;
