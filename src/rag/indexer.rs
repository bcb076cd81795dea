//! Builds the labeled-example collection from a training CSV.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use super::store::{LabeledExample, VectorIndex};
use crate::classifier::Category;
use crate::core::errors::PipelineError;
use crate::llm::Embedder;

#[derive(Debug, Deserialize)]
struct TrainingRow {
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Label")]
    label: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Reads `Text`/`Label` rows. Rows that fail to decode, carry an unknown
/// label or have empty text are skipped and counted.
pub fn read_training_csv(path: &Path) -> Result<(Vec<LabeledExample>, usize), PipelineError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        PipelineError::Validation(format!("cannot read {}: {}", path.display(), e))
    })?;

    let mut examples = Vec::new();
    let mut skipped = 0;
    for (idx, row) in reader.deserialize::<TrainingRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(row = idx + 1, "skipping malformed training row: {}", err);
                skipped += 1;
                continue;
            }
        };
        let Some(label) = Category::from_label(row.label) else {
            tracing::warn!(row = idx + 1, label = row.label, "skipping row with unknown label");
            skipped += 1;
            continue;
        };
        if row.text.trim().is_empty() {
            skipped += 1;
            continue;
        }
        examples.push(LabeledExample::new(row.text, label));
    }

    Ok((examples, skipped))
}

pub struct Indexer {
    embedder: Embedder,
    index: Arc<dyn VectorIndex>,
    collection: String,
}

impl Indexer {
    pub fn new(embedder: Embedder, index: Arc<dyn VectorIndex>, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
        }
    }

    /// Ensures the collection exists, dropping it first when `recreate` is set.
    pub async fn prepare(&self, recreate: bool) -> Result<(), PipelineError> {
        if recreate && self.index.drop_collection(&self.collection).await? {
            tracing::info!(collection = %self.collection, "recreating collection");
        }
        self.index
            .create_collection(&self.collection, self.embedder.dimension())
            .await?;
        Ok(())
    }

    /// Embeds and upserts `examples` in batches of `batch_size`.
    pub async fn index_examples(
        &self,
        examples: &[LabeledExample],
        batch_size: usize,
    ) -> Result<IndexReport, PipelineError> {
        let batch_size = batch_size.max(1);
        let mut report = IndexReport::default();

        for batch in examples.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|e| e.full_text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            let points = batch.iter().cloned().zip(vectors).collect();

            report.indexed += self.index.upsert(&self.collection, points).await?;
            report.batches += 1;
            tracing::info!(
                collection = %self.collection,
                indexed = report.indexed,
                total = examples.len(),
                "indexed batch"
            );
        }

        Ok(report)
    }

    pub async fn index_csv(
        &self,
        path: &Path,
        batch_size: usize,
        recreate: bool,
    ) -> Result<IndexReport, PipelineError> {
        let (examples, skipped) = read_training_csv(path)?;
        tracing::info!(
            path = %path.display(),
            rows = examples.len(),
            skipped,
            "loaded training data"
        );

        self.prepare(recreate).await?;
        let mut report = self.index_examples(&examples, batch_size).await?;
        report.skipped = skipped;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::rag::sqlite::SqliteVectorIndex;
    use crate::testing::{temp_db_path, KeywordProvider, STUB_DIMENSION};

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    async fn indexer() -> (Indexer, Arc<SqliteVectorIndex>) {
        let index = Arc::new(
            SqliteVectorIndex::open(temp_db_path("ragdesk-indexer-test"))
                .await
                .unwrap(),
        );
        let embedder = Embedder::new(Arc::new(KeywordProvider::new()), "stub", STUB_DIMENSION);
        (Indexer::new(embedder, index.clone(), "news"), index)
    }

    #[test]
    fn reads_rows_and_skips_bad_labels() {
        let file = write_csv(
            "ArticleId,Text,Label\n\
             1,Government wins the vote,0\n\
             2,Team lifts the cup,1\n\
             3,Unknown,9\n\
             4,Broken,abc\n",
        );
        let (examples, skipped) = read_training_csv(file.path()).unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(skipped, 2);
        assert_eq!(examples[1].label, Category::Sport);
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        let err = read_training_csv(Path::new("/nonexistent/train.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn indexes_csv_in_batches() {
        let file = write_csv(
            "Text,Label\n\
             Government wins the vote,0\n\
             Team lifts the cup,1\n\
             Apple ships a new iPhone,2\n\
             Film wins an award,3\n\
             Bank profit beats market,4\n",
        );
        let (indexer, index) = indexer().await;

        let report = indexer.index_csv(file.path(), 2, false).await.unwrap();

        assert_eq!(report.indexed, 5);
        assert_eq!(report.batches, 3);
        let info = index.collection_info("news").await.unwrap().unwrap();
        assert_eq!(info.total_vectors, 5);
        assert_eq!(info.dimension, STUB_DIMENSION);
    }

    #[tokio::test]
    async fn reindexing_is_idempotent_and_recreate_resets() {
        let file = write_csv("Text,Label\nTeam lifts the cup,1\n");
        let (indexer, index) = indexer().await;

        indexer.index_csv(file.path(), 10, false).await.unwrap();
        indexer.index_csv(file.path(), 10, false).await.unwrap();
        assert_eq!(index.collection_info("news").await.unwrap().unwrap().total_vectors, 1);

        let other = write_csv("Text,Label\nBank profit beats market,4\n");
        indexer.index_csv(other.path(), 10, true).await.unwrap();
        assert_eq!(index.collection_info("news").await.unwrap().unwrap().total_vectors, 1);
    }
}
