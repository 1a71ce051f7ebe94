//! `messages` table — the thread's conversation history.

use chrono::{DateTime, Utc};
use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub message_id: Uuid,
    pub thread_id: Uuid,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub is_llm_message: bool,
    pub content: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn insert_message(
        &self,
        thread_id: Uuid,
        kind: &str,
        is_llm_message: bool,
        content: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Result<Uuid> {
        let message_id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO messages (message_id, thread_id, type, is_llm_message, content, metadata, created_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7)"#,
        )
        .bind(message_id)
        .bind(thread_id)
        .bind(kind)
        .bind(is_llm_message)
        .bind(&content)
        .bind(&metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("insert_message: {e}")))?;
        Ok(message_id)
    }

    /// The text of the thread's first `user` message — the Run Coordinator's
    /// `initial_prompt_text` (§4.7 step 5). An empty or missing result
    /// means the caller must fail the run.
    pub async fn first_user_message_text(&self, thread_id: Uuid) -> Result<Option<String>> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"SELECT content FROM messages
               WHERE thread_id = $1 AND type = 'user'
               ORDER BY created_at ASC LIMIT 1"#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("first_user_message_text: {e}")))?;

        Ok(row.and_then(|(content,)| {
            content
                .get("text")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| content.as_str().map(str::to_string))
        }))
    }

    pub async fn list_messages(&self, thread_id: Uuid) -> Result<Vec<MessageRow>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT message_id, thread_id, type, is_llm_message, content, metadata, created_at
               FROM messages WHERE thread_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("list_messages: {e}")))?;
        Ok(rows)
    }
}
