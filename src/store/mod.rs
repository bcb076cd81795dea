//! Relational persistence for classification records and conversations.
//!
//! Runs on an sqlx `Any` pool so the same queries serve PostgreSQL in
//! production and SQLite files locally. Only integer, float and text columns
//! are used; timestamps are RFC 3339 UTC strings with microsecond precision,
//! which sort lexicographically.

pub mod classifications;
pub mod conversations;

use chrono::{SecondsFormat, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use crate::core::config::settings::DatabaseSettings;
use crate::core::errors::PipelineError;

pub use classifications::{ClassificationLog, ClassificationRecord, NewClassification};
pub use conversations::{Conversation, ConversationStore, Sender, StoredMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, PipelineError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else {
            Err(PipelineError::Validation(format!(
                "unsupported database url scheme: {}",
                url.split(':').next().unwrap_or_default()
            )))
        }
    }

    fn serial_primary_key(&self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGSERIAL PRIMARY KEY",
            Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    fn integer(&self) -> &'static str {
        match self {
            Dialect::Postgres => "BIGINT",
            Dialect::Sqlite => "INTEGER",
        }
    }

    fn real(&self) -> &'static str {
        match self {
            Dialect::Postgres => "DOUBLE PRECISION",
            Dialect::Sqlite => "REAL",
        }
    }
}

/// Shared handle to the relational database.
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
}

impl Database {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, PipelineError> {
        let url = settings.effective_url();
        Self::connect_url(&url, settings.max_connections).await
    }

    pub async fn connect_url(url: &str, max_connections: u32) -> Result<Self, PipelineError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(url)?;

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;

        let db = Self { pool, dialect };
        db.init_schema().await?;
        tracing::info!(dialect = ?dialect, "database ready");
        Ok(db)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<(), PipelineError> {
        let d = self.dialect;
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS classification_history (
                    id {pk},
                    text TEXT NOT NULL,
                    predicted_label {int} NOT NULL,
                    predicted_category TEXT NOT NULL,
                    confidence {real} NOT NULL,
                    reasoning TEXT NOT NULL,
                    retrieved_examples TEXT NOT NULL,
                    num_retrieved_examples {int} NOT NULL,
                    model_used TEXT NOT NULL,
                    pipeline_version TEXT NOT NULL,
                    retrieval_time_ms {int} NOT NULL,
                    classification_time_ms {int} NOT NULL,
                    total_time_ms {int} NOT NULL,
                    created_at TEXT NOT NULL
                )",
                pk = d.serial_primary_key(),
                int = d.integer(),
                real = d.real(),
            ),
            "CREATE INDEX IF NOT EXISTS idx_classification_created_at
                ON classification_history(created_at)"
                .to_string(),
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
            .to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS messages (
                    id {pk},
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    sender TEXT NOT NULL,
                    text TEXT NOT NULL,
                    sent_at TEXT NOT NULL,
                    model_used TEXT
                )",
                pk = d.serial_primary_key(),
            ),
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, sent_at, id)"
                .to_string(),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Current UTC time as stored in every timestamp column.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
pub(crate) async fn test_database() -> Database {
    let path = crate::testing::temp_db_path("ragdesk-store-test");
    Database::connect_url(&format!("sqlite://{}?mode=rwc", path.display()), 4)
        .await
        .unwrap()
}
