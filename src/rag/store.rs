//! Labeled-example storage with cosine similarity search.
//!
//! The classifier retrieves its few-shot demonstrations through this trait.
//! The reference implementation is `SqliteVectorIndex` in the `sqlite` module.

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::classifier::Category;
use crate::core::errors::PipelineError;

/// Characters of the article kept in the `text` field of a stored example.
pub const STORED_TEXT_CHARS: usize = 1000;

/// A labeled training article.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledExample {
    /// Hex SHA-256 of `full_text`; stable across indexer runs.
    pub id: String,
    /// Leading part of the article.
    pub text: String,
    pub full_text: String,
    pub label: Category,
}

impl LabeledExample {
    pub fn new(full_text: impl Into<String>, label: Category) -> Self {
        let full_text = full_text.into();
        Self {
            id: point_id(&full_text),
            text: truncate_chars(&full_text, STORED_TEXT_CHARS).to_string(),
            full_text,
            label,
        }
    }
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredExample {
    pub example: LabeledExample,
    /// Cosine similarity (higher = closer).
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub total_vectors: u64,
    pub dimension: usize,
    pub status: String,
}

pub fn point_id(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Longest prefix of `text` with at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create `name` if missing. Returns false when it already existed.
    async fn create_collection(&self, name: &str, dimension: usize)
        -> Result<bool, PipelineError>;

    /// Remove `name` and all of its points. Returns false when it did not exist.
    async fn drop_collection(&self, name: &str) -> Result<bool, PipelineError>;

    /// Insert or replace points by id. Fails with `NotFound` for a missing
    /// collection and `Validation` for a dimension mismatch.
    async fn upsert(
        &self,
        collection: &str,
        points: Vec<(LabeledExample, Vec<f32>)>,
    ) -> Result<usize, PipelineError>;

    /// Up to `limit` examples by descending cosine similarity, optionally
    /// dropping those scoring below `score_threshold`.
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredExample>, PipelineError>;

    /// `None` when the collection has not been created.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_stable_sha256() {
        let a = LabeledExample::new("same text", Category::Sport);
        let b = LabeledExample::new("same text", Category::Business);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
        assert_ne!(a.id, point_id("other text"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn stored_text_is_capped() {
        let long = "x".repeat(STORED_TEXT_CHARS + 50);
        let example = LabeledExample::new(long.clone(), Category::Politics);
        assert_eq!(example.text.chars().count(), STORED_TEXT_CHARS);
        assert_eq!(example.full_text, long);
    }
}
