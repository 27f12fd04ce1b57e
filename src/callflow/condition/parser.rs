//! Condition expression parser
//!
//! Parses expressions like:
//! - `sentiment == 'positive'`
//! - `{{intent.confidence}} > 0.8`
//! - `not (done == true) or retries < 3`
//!
//! `&&`, `||` and `!` are accepted as aliases of `and`, `or` and `not`.

use super::ast::{CompareOp, Expression, Literal};
use crate::adk::error::CallflowError;

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, CallflowError> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Empty condition".into());
    }

    if input == "true" {
        return Ok(Expression::Constant(true));
    }
    if input == "false" {
        return Ok(Expression::Constant(false));
    }

    if let Some(inner) = strip_outer_parens(input) {
        return parse(inner);
    }

    // "or" binds looser than "and", so split on it first
    for op in [" or ", " || "] {
        if let Some(pos) = find_top_level(input, op) {
            let left = parse(&input[..pos])?;
            let right = parse(&input[pos + op.len()..])?;
            return Ok(Expression::or(left, right));
        }
    }
    for op in [" and ", " && "] {
        if let Some(pos) = find_top_level(input, op) {
            let left = parse(&input[..pos])?;
            let right = parse(&input[pos + op.len()..])?;
            return Ok(Expression::and(left, right));
        }
    }

    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::negate(parse(rest)?));
    }
    if let Some(rest) = input.strip_prefix('!').filter(|r| !r.starts_with('=')) {
        return Ok(Expression::negate(parse(rest)?));
    }

    parse_comparison(input)
}

/// `(expr)` -> `expr`, only when the parens wrap the whole input
fn strip_outer_parens(input: &str) -> Option<&str> {
    if !input.starts_with('(') || !input.ends_with(')') {
        return None;
    }
    let mut depth = 0;
    let mut in_string: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (in_string, c) {
            (Some(q), c) if c == q => in_string = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => in_string = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 && i != input.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }
    Some(&input[1..input.len() - 1])
}

/// Byte offset of the first `op` outside quotes and parentheses
fn find_top_level(input: &str, op: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (in_string, c) {
            (Some(q), c) if c == q => in_string = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => in_string = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, _) if depth == 0 && input[i..].starts_with(op) => return Some(i),
            _ => {}
        }
    }
    None
}

/// `{{ name }}` -> `name`
fn variable_name(raw: &str) -> String {
    let raw = raw.trim();
    raw.strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(raw)
        .trim()
        .to_string()
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn parse_comparison(input: &str) -> Result<Expression, CallflowError> {
    // Longest operators first so ">=" is not read as ">"
    let operators = [
        ("!=", CompareOp::NotEq),
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("===", CompareOp::Eq),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        (" contains ", CompareOp::Contains),
    ];

    for (symbol, op) in operators {
        if let Some(pos) = find_top_level(input, symbol) {
            let left = variable_name(&input[..pos]);
            if !is_identifier(&left) {
                return Err(format!("Invalid variable in condition: {}", left).into());
            }
            let right = parse_literal(&input[pos + symbol.len()..])?;
            return Ok(Expression::Compare { left, op, right });
        }
    }

    let name = variable_name(input);
    if is_identifier(&name) {
        return Ok(Expression::Truthy(name));
    }

    Err(format!("Could not parse condition: {}", input).into())
}

fn parse_literal(input: &str) -> Result<Literal, CallflowError> {
    let input = input.trim().trim_start_matches('=').trim();

    match input {
        "null" | "undefined" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    if input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')))
    {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    if let Ok(n) = input.parse::<f64>() {
        return Ok(Literal::Number(n));
    }

    Err(format!("Could not parse literal: {}", input).into())
}
