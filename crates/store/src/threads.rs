//! `threads` table — an ordered conversation history owned by a project.

use chrono::{DateTime, Utc};
use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Store;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub thread_id: Uuid,
    pub project_id: Uuid,
    pub account_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn insert_thread(&self, project_id: Uuid, account_id: Uuid) -> Result<Thread> {
        let thread = Thread {
            thread_id: Uuid::new_v4(),
            project_id,
            account_id,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO threads (thread_id, project_id, account_id, created_at) VALUES ($1,$2,$3,$4)",
        )
        .bind(thread.thread_id)
        .bind(thread.project_id)
        .bind(thread.account_id)
        .bind(thread.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("insert_thread: {e}")))?;
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: Uuid) -> Result<Option<Thread>> {
        let row: Option<Thread> = sqlx::query_as(
            "SELECT thread_id, project_id, account_id, created_at FROM threads WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_thread: {e}")))?;
        Ok(row)
    }
}
