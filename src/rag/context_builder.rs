//! Classification context builder.
//!
//! Turns retrieved examples into the few-shot system prompt and wraps the
//! article in the user message. Output depends only on its inputs.

use super::store::{truncate_chars, ScoredExample};
use crate::classifier::Category;
use crate::llm::ChatMessage;

/// Configuration for context building.
#[derive(Debug, Clone)]
pub struct ContextBuilderConfig {
    /// Characters of each example shown in the prompt
    pub example_chars: usize,
    /// Characters of the article sent for classification
    pub input_chars: usize,
}

impl Default for ContextBuilderConfig {
    fn default() -> Self {
        Self {
            example_chars: 300,
            input_chars: 2000,
        }
    }
}

pub struct ClassificationContextBuilder {
    config: ContextBuilderConfig,
}

impl ClassificationContextBuilder {
    pub fn new(config: ContextBuilderConfig) -> Self {
        Self { config }
    }

    /// System + user messages for one classification request.
    pub fn build(&self, text: &str, examples: &[ScoredExample]) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt(examples)),
            ChatMessage::user(format!(
                "Classify this article:\n\n{}",
                truncate_chars(text, self.config.input_chars)
            )),
        ]
    }

    pub fn system_prompt(&self, examples: &[ScoredExample]) -> String {
        let categories = Category::ALL
            .iter()
            .map(|c| format!("{} - {}: {}", c.label(), c.name(), c.description()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a news article classifier. You must classify articles into one of these categories:\n\n\
             {categories}\n\n\
             Here are similar examples from our training data to help you classify:\n\n\
             {examples}\n\n\
             Based on these examples, classify the new article below.\n\
             Be consistent with the pattern you see in the examples.\n\
             Respond with JSON containing: label (0-4), category (the category name), \
             confidence (0.0 to 1.0) and reasoning (2-3 sentences).",
            categories = categories,
            examples = self.format_examples(examples),
        )
    }

    fn format_examples(&self, examples: &[ScoredExample]) -> String {
        if examples.is_empty() {
            return "No similar examples found.".to_string();
        }

        examples
            .iter()
            .enumerate()
            .map(|(i, scored)| {
                format!(
                    "Example {} (Label: {} - {}, Similarity: {:.2}):\n{}...",
                    i + 1,
                    scored.example.label.label(),
                    scored.example.label.name(),
                    scored.score,
                    truncate_chars(&scored.example.text, self.config.example_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
