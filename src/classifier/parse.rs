//! Structured classification output: schema for the provider and a strict
//! parser for its reply.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::category::Category;
use crate::core::errors::PipelineError;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("fence pattern is valid")
});

/// Shape the model is asked to produce.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClassificationOutput {
    /// Numeric category label (0-4)
    pub label: i64,
    /// Category name (Politics, Sport, Technology, Entertainment, Business)
    #[serde(default)]
    pub category: Option<String>,
    /// Confidence level between 0.0 and 1.0
    pub confidence: f64,
    /// Brief explanation for the classification (2-3 sentences)
    pub reasoning: String,
}

/// A validated classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
    pub reasoning: String,
}

pub fn output_schema() -> Value {
    schemars::schema_for!(ClassificationOutput).to_value()
}

fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => raw.trim(),
    }
}

/// Decodes and validates a model reply. Never falls back to a default label.
pub fn parse_classification(raw: &str) -> Result<Classification, PipelineError> {
    let body = strip_code_fence(raw);
    let output: ClassificationOutput = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("classification is not valid JSON: {}", e)))?;

    let category = Category::from_label(output.label).ok_or_else(|| {
        PipelineError::Parse(format!("label {} is outside 0..=4", output.label))
    })?;

    if !output.confidence.is_finite() || !(0.0..=1.0).contains(&output.confidence) {
        return Err(PipelineError::Parse(format!(
            "confidence {} is outside [0, 1]",
            output.confidence
        )));
    }

    let reasoning = output.reasoning.trim();
    if reasoning.is_empty() {
        return Err(PipelineError::Parse("reasoning is empty".to_string()));
    }

    if let Some(named) = output.category.as_deref() {
        if !named.trim().eq_ignore_ascii_case(category.name()) {
            tracing::warn!(
                label = output.label,
                model_category = named,
                derived_category = category.name(),
                "model category disagrees with label; using label"
            );
        }
    }

    Ok(Classification {
        category,
        confidence: output.confidence,
        reasoning: reasoning.to_string(),
    })
}
