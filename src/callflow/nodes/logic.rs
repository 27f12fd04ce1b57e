// SPDX-License-Identifier: MIT

//! Branching nodes: condition expressions and keyword sentiment

use async_trait::async_trait;
use serde_json::json;

use super::{NodeCategory, NodeHandler};
use crate::adk::error::CallflowError;
use crate::callflow::condition;
use crate::callflow::context::{value_to_text, ExecutionContext};
use crate::callflow::graph::Node;
use crate::callflow::trace::{LogRecord, LogSink};

/// `condition` / `if-else` / `logic`: activates the `true` or `false` output
pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    fn category(&self) -> NodeCategory {
        NodeCategory::Logic
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        let expression = node
            .config_str("expression")
            .or_else(|| node.config_str("condition"))
            .unwrap_or("");
        log.emit(LogRecord::info(format!("Evaluating expression: {}", expression)));

        let result = match condition::parse(expression) {
            Ok(expr) => condition::evaluate(&expr, &ctx),
            Err(e) => {
                log.emit(LogRecord::warning(format!("Expression evaluation failed: {}", e)));
                false
            }
        };

        log.emit(LogRecord::success(format!(
            "Condition result: {}",
            if result { "TRUE" } else { "FALSE" }
        )));

        let branch = if result { "true" } else { "false" };
        Ok(ctx
            .with("conditionResult", json!(result))
            .with_active_outputs([branch]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "yes", "good", "great", "excellent", "proceed", "happy", "love", "wonderful", "amazing",
];
const NEGATIVE_WORDS: &[&str] = &["no", "bad", "terrible", "sad", "angry", "hate", "awful", "horrible"];

/// Keyword sentiment: `(label, score, magnitude)`.
///
/// Words match whole, case-insensitively; each distinct keyword counts once.
pub fn analyze_sentiment(text: &str) -> (Sentiment, f64, f64) {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let count = |list: &[&str]| list.iter().filter(|k| words.contains(k)).count();

    let positive = count(POSITIVE_WORDS);
    let negative = count(NEGATIVE_WORDS);
    let magnitude = (positive + negative) as f64 * 0.2;

    let (sentiment, score) = if positive > negative {
        (Sentiment::Positive, (0.5 + 0.15 * positive as f64).min(1.0))
    } else if negative > positive {
        (Sentiment::Negative, (0.5 - 0.15 * negative as f64).max(0.0))
    } else {
        (Sentiment::Neutral, 0.5)
    };
    (sentiment, score, magnitude)
}

/// `sentiment`: activates `positive`, `negative` or `neutral`
pub struct SentimentHandler;

#[async_trait]
impl NodeHandler for SentimentHandler {
    fn category(&self) -> NodeCategory {
        NodeCategory::Logic
    }

    async fn execute(
        &self,
        node: &Node,
        ctx: ExecutionContext,
        log: &dyn LogSink,
    ) -> Result<ExecutionContext, CallflowError> {
        let variable = node.config_str("textVariable").unwrap_or("transcribedText");
        let text = ctx
            .get(variable)
            .or_else(|| ctx.get("userResponse"))
            .map(value_to_text)
            .unwrap_or_default();
        log.emit(LogRecord::info(format!("Analyzing sentiment of: \"{}\"", text)));

        let (sentiment, score, magnitude) = analyze_sentiment(&text);
        log.emit(LogRecord::success(format!(
            "Sentiment (keyword): {} (score: {:.2})",
            sentiment.as_str(),
            score
        )));

        Ok(ctx
            .with("sentiment", json!(sentiment.as_str()))
            .with("sentimentScore", json!(score))
            .with("sentimentMagnitude", json!(magnitude))
            .with_active_outputs([sentiment.as_str()]))
    }
}
