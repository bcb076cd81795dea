use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::Row;

use super::{now_timestamp, Database};
use crate::core::errors::PipelineError;

/// A successful classification about to be logged.
#[derive(Debug, Clone)]
pub struct NewClassification {
    pub text: String,
    pub predicted_label: u8,
    pub predicted_category: String,
    pub confidence: f64,
    pub reasoning: String,
    pub retrieved_examples: Value,
    pub num_retrieved_examples: usize,
    pub model_used: String,
    pub pipeline_version: String,
    pub retrieval_time_ms: u64,
    pub classification_time_ms: u64,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRecord {
    pub id: i64,
    pub text: String,
    pub predicted_label: i64,
    pub predicted_category: String,
    pub confidence: f64,
    pub reasoning: String,
    pub retrieved_examples: Value,
    pub num_retrieved_examples: i64,
    pub model_used: String,
    pub pipeline_version: String,
    pub retrieval_time_ms: i64,
    pub classification_time_ms: i64,
    pub total_time_ms: i64,
    pub created_at: String,
}

/// Insert-only log of classification results.
#[async_trait]
pub trait ClassificationLog: Send + Sync {
    async fn insert(&self, record: NewClassification) -> Result<i64, PipelineError>;

    /// Newest first.
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ClassificationRecord>, PipelineError>;

    async fn count(&self) -> Result<i64, PipelineError>;
}

fn row_to_record(row: &AnyRow) -> Result<ClassificationRecord, PipelineError> {
    let examples: String = row.try_get("retrieved_examples")?;
    let retrieved_examples: Value = serde_json::from_str(&examples).map_err(|e| {
        PipelineError::Storage(format!("corrupt retrieved_examples snapshot: {}", e))
    })?;

    Ok(ClassificationRecord {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        predicted_label: row.try_get("predicted_label")?,
        predicted_category: row.try_get("predicted_category")?,
        confidence: row.try_get("confidence")?,
        reasoning: row.try_get("reasoning")?,
        retrieved_examples,
        num_retrieved_examples: row.try_get("num_retrieved_examples")?,
        model_used: row.try_get("model_used")?,
        pipeline_version: row.try_get("pipeline_version")?,
        retrieval_time_ms: row.try_get("retrieval_time_ms")?,
        classification_time_ms: row.try_get("classification_time_ms")?,
        total_time_ms: row.try_get("total_time_ms")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ClassificationLog for Database {
    async fn insert(&self, record: NewClassification) -> Result<i64, PipelineError> {
        let examples =
            serde_json::to_string(&record.retrieved_examples).map_err(PipelineError::storage)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO classification_history (
                text, predicted_label, predicted_category, confidence, reasoning,
                retrieved_examples, num_retrieved_examples, model_used, pipeline_version,
                retrieval_time_ms, classification_time_ms, total_time_ms, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING id",
        )
        .bind(record.text)
        .bind(record.predicted_label as i64)
        .bind(record.predicted_category)
        .bind(record.confidence)
        .bind(record.reasoning)
        .bind(examples)
        .bind(record.num_retrieved_examples as i64)
        .bind(record.model_used)
        .bind(record.pipeline_version)
        .bind(record.retrieval_time_ms as i64)
        .bind(record.classification_time_ms as i64)
        .bind(record.total_time_ms as i64)
        .bind(now_timestamp())
        .fetch_one(self.pool())
        .await?;

        Ok(id)
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ClassificationRecord>, PipelineError> {
        let rows = sqlx::query(
            "SELECT id, text, predicted_label, predicted_category, confidence, reasoning,
                    retrieved_examples, num_retrieved_examples, model_used, pipeline_version,
                    retrieval_time_ms, classification_time_ms, total_time_ms, created_at
             FROM classification_history
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self) -> Result<i64, PipelineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM classification_history")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::test_database;

    fn record(text: &str, label: u8) -> NewClassification {
        NewClassification {
            text: text.to_string(),
            predicted_label: label,
            predicted_category: "Technology".to_string(),
            confidence: 0.87,
            reasoning: "Mentions a product launch.".to_string(),
            retrieved_examples: json!([{ "text": "example", "label": 2, "score": 0.9 }]),
            num_retrieved_examples: 1,
            model_used: "gpt-4.1".to_string(),
            pipeline_version: "v1.0".to_string(),
            retrieval_time_ms: 12,
            classification_time_ms: 340,
            total_time_ms: 352,
        }
    }

    #[tokio::test]
    async fn insert_then_list_newest_first() {
        let db = test_database().await;
        let first = db.insert(record("first", 2)).await.unwrap();
        let second = db.insert(record("second", 2)).await.unwrap();
        assert!(second > first);

        let records = db.list(0, 100).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "second");
        assert_eq!(records[1].confidence, 0.87);
        assert_eq!(records[1].retrieved_examples[0]["label"], 2);
        assert_eq!(db.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_paginates() {
        let db = test_database().await;
        for i in 0..5 {
            db.insert(record(&format!("article {}", i), 1)).await.unwrap();
        }

        let page = db.list(1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].text, "article 3");
        assert_eq!(page[1].text, "article 2");
        assert!(db.list(10, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_storage_error() {
        let db = test_database().await;
        let id = db.insert(record("broken", 2)).await.unwrap();
        sqlx::query("UPDATE classification_history SET retrieved_examples = $1 WHERE id = $2")
            .bind("{not json")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.list(0, 10).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(msg) if msg.contains("retrieved_examples")));
    }
}
