//! SQLite-backed vector index.
//!
//! In-process store using SQLite for points and collection metadata and
//! brute-force cosine similarity for search.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{CollectionInfo, LabeledExample, ScoredExample, VectorIndex};
use crate::classifier::Category;
use crate::core::errors::PipelineError;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(PipelineError::storage)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), PipelineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
                id TEXT NOT NULL,
                text TEXT NOT NULL,
                full_text TEXT NOT NULL,
                label INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dimension_of(&self, collection: &str) -> Result<Option<usize>, PipelineError> {
        let dimension: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dimension.map(|d| d as usize))
    }

    async fn require_dimension(&self, collection: &str) -> Result<usize, PipelineError> {
        self.dimension_of(collection).await?.ok_or_else(|| {
            PipelineError::NotFound(format!(
                "collection '{}' does not exist; run init-vectorstore first",
                collection
            ))
        })
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_example(row: &sqlx::sqlite::SqliteRow) -> Result<LabeledExample, PipelineError> {
        let label: i64 = row.get("label");
        let label = Category::from_label(label).ok_or_else(|| {
            PipelineError::Storage(format!("stored point has invalid label {}", label))
        })?;

        Ok(LabeledExample {
            id: row.get("id"),
            text: row.get("text"),
            full_text: row.get("full_text"),
            label,
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<bool, PipelineError> {
        let result =
            sqlx::query("INSERT INTO collections (name, dimension) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .bind(dimension as i64)
                .execute(&self.pool)
                .await?;

        let created = result.rows_affected() > 0;
        if created {
            tracing::info!(collection = name, dimension, "created vector collection");
        }
        Ok(created)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool, PipelineError> {
        let result = sqlx::query("DELETE FROM collections WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let dropped = result.rows_affected() > 0;
        if dropped {
            tracing::info!(collection = name, "dropped vector collection");
        }
        Ok(dropped)
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<(LabeledExample, Vec<f32>)>,
    ) -> Result<usize, PipelineError> {
        let dimension = self.require_dimension(collection).await?;
        if points.is_empty() {
            return Ok(0);
        }
        if let Some((example, embedding)) = points.iter().find(|(_, e)| e.len() != dimension) {
            return Err(PipelineError::Validation(format!(
                "point {} has dimension {}, collection '{}' expects {}",
                example.id,
                embedding.len(),
                collection,
                dimension
            )));
        }

        let mut tx = self.pool.begin().await?;

        for (example, embedding) in &points {
            let blob = Self::serialize_embedding(embedding);

            sqlx::query(
                "INSERT INTO points (collection, id, text, full_text, label, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    full_text = excluded.full_text,
                    label = excluded.label,
                    embedding = excluded.embedding",
            )
            .bind(collection)
            .bind(&example.id)
            .bind(&example.text)
            .bind(&example.full_text)
            .bind(example.label.label() as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(points.len())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredExample>, PipelineError> {
        let dimension = self.require_dimension(collection).await?;
        if query.len() != dimension {
            return Err(PipelineError::Validation(format!(
                "query has dimension {}, collection '{}' expects {}",
                query.len(),
                collection,
                dimension
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, full_text, label, embedding
             FROM points
             WHERE collection = ?1",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let stored = Self::deserialize_embedding(&embedding_bytes);
            let score = Self::cosine_similarity(query, &stored);

            if score_threshold.is_some_and(|threshold| score < threshold) {
                continue;
            }
            scored.push(ScoredExample {
                example: Self::row_to_example(row)?,
                score,
            });
        }

        // ties break on id so identical queries return identical demonstrations
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.example.id.cmp(&b.example.id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, PipelineError> {
        let Some(dimension) = self.dimension_of(name).await? else {
            return Ok(None);
        };

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            total_vectors: total as u64,
            dimension,
            status: "green".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_db_path;

    async fn test_index() -> SqliteVectorIndex {
        SqliteVectorIndex::open(temp_db_path("ragdesk-index-test"))
            .await
            .unwrap()
    }

    fn point(text: &str, label: Category, embedding: Vec<f32>) -> (LabeledExample, Vec<f32>) {
        (LabeledExample::new(text, label), embedding)
    }

    #[tokio::test]
    async fn search_on_missing_collection_is_not_found() {
        let index = test_index().await;
        let err = index.search("news", &[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert!(index.collection_info("news").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let index = test_index().await;
        assert!(index.create_collection("news", 2).await.unwrap());
        assert!(!index.create_collection("news", 2).await.unwrap());

        let info = index.collection_info("news").await.unwrap().unwrap();
        assert_eq!(info.total_vectors, 0);
        assert_eq!(info.dimension, 2);
    }

    #[tokio::test]
    async fn search_returns_k_of_n_in_descending_order() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();

        let points = (0..7)
            .map(|i| {
                let angle = i as f32 * 0.2;
                point(
                    &format!("article {}", i),
                    Category::Sport,
                    vec![angle.cos(), angle.sin()],
                )
            })
            .collect();
        index.upsert("news", points).await.unwrap();

        let results = index.search("news", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].example.full_text, "article 0");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn search_returns_all_when_fewer_than_k() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();
        index
            .upsert(
                "news",
                vec![
                    point("a", Category::Politics, vec![1.0, 0.0]),
                    point("b", Category::Business, vec![0.0, 1.0]),
                    point("c", Category::Sport, vec![1.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.search("news", &[1.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn empty_collection_yields_no_results() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();
        let results = index.search("news", &[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn threshold_filters_low_scores() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();
        index
            .upsert(
                "news",
                vec![
                    point("close", Category::Technology, vec![1.0, 0.1]),
                    point("far", Category::Politics, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = index
            .search("news", &[1.0, 0.0], 5, Some(0.6))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].example.label, Category::Technology);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_text() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();

        for _ in 0..2 {
            index
                .upsert("news", vec![point("same", Category::Sport, vec![1.0, 0.0])])
                .await
                .unwrap();
        }

        let info = index.collection_info("news").await.unwrap().unwrap();
        assert_eq!(info.total_vectors, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = test_index().await;
        index.create_collection("news", 3).await.unwrap();
        let err = index
            .upsert("news", vec![point("x", Category::Sport, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn drop_collection_removes_points() {
        let index = test_index().await;
        index.create_collection("news", 2).await.unwrap();
        index
            .upsert("news", vec![point("x", Category::Sport, vec![1.0, 0.0])])
            .await
            .unwrap();

        assert!(index.drop_collection("news").await.unwrap());
        assert!(!index.drop_collection("news").await.unwrap());

        index.create_collection("news", 2).await.unwrap();
        let info = index.collection_info("news").await.unwrap().unwrap();
        assert_eq!(info.total_vectors, 0);
    }
}
