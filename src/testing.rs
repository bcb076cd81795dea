//! Deterministic providers for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::classifier::Category;
use crate::llm::{ChatRequest, LlmProvider, ProviderError};

pub(crate) const STUB_DIMENSION: usize = 8;

const KEYWORDS: [&[&str]; 5] = [
    &[
        "election", "government", "minister", "parliament", "vote", "party", "president",
        "policy",
    ],
    &[
        "match", "team", "football", "cup", "goal", "player", "coach", "championship",
    ],
    &[
        "apple", "iphone", "software", "ai", "computer", "phone", "technology", "internet",
        "chip",
    ],
    &[
        "film", "movie", "music", "actor", "album", "award", "star", "show",
    ],
    &[
        "market", "shares", "profit", "company", "bank", "economy", "sales", "investors",
    ],
];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Five keyword buckets plus three hashed buckets, so unrelated text still
/// produces a non-zero vector.
pub(crate) fn keyword_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; STUB_DIMENSION];
    for word in words(text) {
        match KEYWORDS.iter().position(|bucket| bucket.contains(&word.as_str())) {
            Some(idx) => vector[idx] += 1.0,
            None => {
                let hash = word.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
                vector[5 + hash % 3] += 0.1;
            }
        }
    }
    if vector.iter().all(|v| *v == 0.0) {
        vector[5] = 0.1;
    }
    vector
}

fn keyword_category(text: &str) -> Category {
    let vector = keyword_embedding(text);
    let mut best = 0;
    for idx in 1..5 {
        if vector[idx] > vector[best] {
            best = idx;
        }
    }
    Category::from_label(best as i64).unwrap_or(Category::Politics)
}

/// Majority label among the `(Label: n` demonstrations of a prompt; ties go
/// to the lowest label.
fn majority_label(prompt: &str) -> Option<Category> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for part in prompt.split("(Label: ").skip(1) {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(label) = digits.parse::<i64>() {
            *counts.entry(label).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .and_then(|(label, _)| Category::from_label(label))
}

/// Keyword embeddings and rule-based completions. Records every chat request.
pub(crate) struct KeywordProvider {
    requests: Mutex<Vec<ChatRequest>>,
    fixed_reply: Option<String>,
    chat_delay: Duration,
}

impl KeywordProvider {
    pub(crate) fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fixed_reply: None,
            chat_delay: Duration::ZERO,
        }
    }

    /// Every chat call returns `reply` verbatim.
    pub(crate) fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.fixed_reply = Some(reply.into());
        self
    }

    pub(crate) fn with_chat_delay(mut self, delay: Duration) -> Self {
        self.chat_delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn classify(request: &ChatRequest) -> String {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let category = majority_label(system).unwrap_or_else(|| keyword_category(user));
        json!({
            "label": category.label(),
            "category": category.name(),
            "confidence": 0.9,
            "reasoning": format!("Closest examples are {} articles.", category.name()),
        })
        .to_string()
    }
}

#[async_trait]
impl LlmProvider for KeywordProvider {
    fn name(&self) -> &str {
        "keyword-stub"
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if !self.chat_delay.is_zero() {
            tokio::time::sleep(self.chat_delay).await;
        }

        if let Some(reply) = &self.fixed_reply {
            return Ok(reply.clone());
        }
        if request.response_format.is_some() {
            return Ok(Self::classify(&request));
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("echo: {}", last_user))
    }

    async fn embed(
        &self,
        inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs.iter().map(|text| keyword_embedding(text)).collect())
    }
}

/// Fails the first `failures` calls with `status`, then succeeds.
pub(crate) struct FlakyProvider {
    failures: u32,
    status: u16,
    calls: AtomicU32,
}

impl FlakyProvider {
    pub(crate) fn new(failures: u32, status: u16) -> Self {
        Self {
            failures,
            status,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self) -> Result<(), ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ProviderError::Status {
                status: self.status,
                body: "stub failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LlmProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky-stub"
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(self.calls() >= self.failures)
    }

    async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ProviderError> {
        self.attempt()?;
        Ok("ok".to_string())
    }

    async fn embed(
        &self,
        inputs: &[String],
        _model_id: &str,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.attempt()?;
        Ok(inputs.iter().map(|_| vec![1.0; STUB_DIMENSION]).collect())
    }
}

/// Path of a fresh, not yet created SQLite file in the temp dir.
pub(crate) fn temp_db_path(prefix: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{}-{}.db", prefix, uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_embedding_prefers_matching_bucket() {
        let v = keyword_embedding("Apple announces new iPhone with AI features");
        assert_eq!(v.len(), STUB_DIMENSION);
        assert!(v[2] >= 3.0);
        assert_eq!(keyword_category("Apple iPhone AI"), Category::Technology);
    }

    #[test]
    fn majority_label_counts_demonstrations() {
        let prompt = "Example 1 (Label: 2 - Technology, Similarity: 0.90):\n..\n\
                      Example 2 (Label: 4 - Business, Similarity: 0.80):\n..\n\
                      Example 3 (Label: 2 - Technology, Similarity: 0.70):\n..";
        assert_eq!(majority_label(prompt), Some(Category::Technology));
        assert_eq!(majority_label("No similar examples found."), None);
    }
}
