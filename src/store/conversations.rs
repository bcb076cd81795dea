use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::Row;

use super::{now_timestamp, Database};
use crate::core::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(PipelineError::Storage(format!(
                "stored message has unknown sender '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversation {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: String,
    pub model_used: Option<String>,
}

/// Conversations and their append-only message log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, PipelineError>;

    /// Messages in (timestamp, id) order. With `window = Some(n)` only the
    /// most recent `n` are returned, still oldest first. `n` is rounded down
    /// to whole turns so a windowed replay always opens with a user message.
    async fn load_messages(
        &self,
        conversation_id: &str,
        window: Option<usize>,
    ) -> Result<Vec<StoredMessage>, PipelineError>;

    /// Records one user/assistant exchange in a single transaction, creating
    /// the conversation when needed. The user message is stamped with
    /// `received_at`. Returns the assistant message.
    async fn append_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        received_at: &str,
        assistant_text: &str,
        model_used: &str,
    ) -> Result<StoredMessage, PipelineError>;
}

fn row_to_message(row: &AnyRow) -> Result<StoredMessage, PipelineError> {
    let sender: String = row.try_get("sender")?;
    Ok(StoredMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender: Sender::parse(&sender)?,
        text: row.try_get("text")?,
        timestamp: row.try_get("sent_at")?,
        model_used: row.try_get("model_used")?,
    })
}

#[async_trait]
impl ConversationStore for Database {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, PipelineError> {
        let row = sqlx::query("SELECT id, created_at, updated_at FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| -> Result<Conversation, PipelineError> {
            Ok(Conversation {
                id: row.try_get("id")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    async fn load_messages(
        &self,
        conversation_id: &str,
        window: Option<usize>,
    ) -> Result<Vec<StoredMessage>, PipelineError> {
        let rows = match window {
            Some(n) => {
                sqlx::query(
                    "SELECT id, conversation_id, sender, text, sent_at, model_used FROM (
                        SELECT id, conversation_id, sender, text, sent_at, model_used
                        FROM messages
                        WHERE conversation_id = $1
                        ORDER BY sent_at DESC, id DESC
                        LIMIT $2
                     ) recent
                     ORDER BY sent_at ASC, id ASC",
                )
                .bind(conversation_id)
                .bind((n - n % 2) as i64)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, conversation_id, sender, text, sent_at, model_used
                     FROM messages
                     WHERE conversation_id = $1
                     ORDER BY sent_at ASC, id ASC",
                )
                .bind(conversation_id)
                .fetch_all(self.pool())
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        received_at: &str,
        assistant_text: &str,
        model_used: &str,
    ) -> Result<StoredMessage, PipelineError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO conversations (id, created_at, updated_at) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(conversation_id)
        .bind(received_at)
        .bind(received_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (conversation_id, sender, text, sent_at, model_used)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(conversation_id)
        .bind(Sender::User.as_str())
        .bind(user_text)
        .bind(received_at)
        .bind(None::<String>)
        .execute(&mut *tx)
        .await?;

        let answered = now_timestamp();
        let assistant_id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (conversation_id, sender, text, sent_at, model_used)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(conversation_id)
        .bind(Sender::Assistant.as_str())
        .bind(assistant_text)
        .bind(&answered)
        .bind(model_used)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(&answered)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(StoredMessage {
            id: assistant_id,
            conversation_id: conversation_id.to_string(),
            sender: Sender::Assistant,
            text: assistant_text.to_string(),
            timestamp: answered,
            model_used: Some(model_used.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_database;

    #[tokio::test]
    async fn unknown_conversation_is_none() {
        let db = test_database().await;
        assert!(db.get_conversation("missing").await.unwrap().is_none());
        assert!(db.load_messages("missing", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_turn_creates_conversation_with_two_messages() {
        let db = test_database().await;
        let reply = db.append_turn("t1", "Hello", &now_timestamp(), "Hi there", "gpt-4o-mini").await.unwrap();

        let conversation = db.get_conversation("t1").await.unwrap().unwrap();
        assert_eq!(conversation.updated_at, reply.timestamp);

        let messages = db.load_messages("t1", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].text, "Hello");
        assert_eq!(messages[0].model_used, None);
        assert_eq!(messages[1].sender, Sender::Assistant);
        assert_eq!(messages[1].model_used.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn later_turns_append_and_keep_created_at() {
        let db = test_database().await;
        db.append_turn("t1", "one", &now_timestamp(), "1", "m").await.unwrap();
        let created = db.get_conversation("t1").await.unwrap().unwrap().created_at;
        let before = db.load_messages("t1", None).await.unwrap();

        db.append_turn("t1", "two", &now_timestamp(), "2", "m").await.unwrap();
        let after = db.load_messages("t1", None).await.unwrap();

        assert_eq!(after.len(), 4);
        assert_eq!(&after[..2], &before[..]);
        assert_eq!(after[2].text, "two");
        assert_eq!(after[3].text, "2");
        assert_eq!(
            db.get_conversation("t1").await.unwrap().unwrap().created_at,
            created
        );
    }

    #[tokio::test]
    async fn window_returns_most_recent_in_order() {
        let db = test_database().await;
        for i in 0..3 {
            db.append_turn("t1", &format!("q{}", i), &now_timestamp(), &format!("a{}", i), "m")
                .await
                .unwrap();
        }

        let texts = |messages: Vec<StoredMessage>| -> Vec<String> {
            messages.into_iter().map(|m| m.text).collect()
        };
        let recent = db.load_messages("t1", Some(4)).await.unwrap();
        assert_eq!(texts(recent), vec!["q1", "a1", "q2", "a2"]);

        let odd = db.load_messages("t1", Some(3)).await.unwrap();
        assert_eq!(odd[0].sender, Sender::User);
        assert_eq!(texts(odd), vec!["q2", "a2"]);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let db = test_database().await;
        db.append_turn("a", "for a", &now_timestamp(), "ok", "m").await.unwrap();
        db.append_turn("b", "for b", &now_timestamp(), "ok", "m").await.unwrap();

        let messages = db.load_messages("a", None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.conversation_id == "a"));
    }

    #[tokio::test]
    async fn user_message_keeps_its_receive_time() {
        let db = test_database().await;
        let received_at = "2024-01-01T00:00:00.000000Z";
        let reply = db.append_turn("t1", "hello", received_at, "hi", "m").await.unwrap();

        let messages = db.load_messages("t1", None).await.unwrap();
        assert_eq!(messages[0].timestamp, received_at);
        assert_eq!(messages[1].timestamp, reply.timestamp);
        assert_eq!(
            db.get_conversation("t1").await.unwrap().unwrap().created_at,
            received_at
        );
    }

    #[tokio::test]
    async fn failed_assistant_insert_rolls_back_the_turn() {
        let db = test_database().await;
        sqlx::query(
            "CREATE TRIGGER reject_assistant BEFORE INSERT ON messages
             WHEN NEW.sender = 'assistant'
             BEGIN SELECT RAISE(ABORT, 'assistant insert rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let result = db.append_turn("t1", "hello", &now_timestamp(), "hi", "m").await;

        assert!(matches!(result, Err(PipelineError::Storage(_))));
        assert!(db.get_conversation("t1").await.unwrap().is_none());
        assert!(db.load_messages("t1", None).await.unwrap().is_empty());
    }
}
