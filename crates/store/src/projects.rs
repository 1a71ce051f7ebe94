//! `projects` table — the long-lived owner of a sandbox and its threads.

use chrono::{DateTime, Utc};
use sa_domain::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Store;

/// The `sandbox` blob stored on a project row (spec §6:
/// `{id, pass, vnc_preview, sandbox_url, token, is_local}`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxInfo {
    pub id: String,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub vnc_preview: Option<String>,
    #[serde(default)]
    pub sandbox_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub sandbox: Option<SandboxInfo>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    project_id: Uuid,
    account_id: Uuid,
    name: String,
    sandbox: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl ProjectRow {
    fn into_project(self) -> Project {
        Project {
            project_id: self.project_id,
            account_id: self.account_id,
            name: self.name,
            sandbox: self.sandbox.and_then(|v| serde_json::from_value(v).ok()),
            created_at: self.created_at,
        }
    }
}

impl Store {
    pub async fn insert_project(&self, account_id: Uuid, name: &str) -> Result<Project> {
        let project_id = Uuid::new_v4();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO projects (project_id, account_id, name, sandbox, created_at) VALUES ($1,$2,$3,NULL,$4)",
        )
        .bind(project_id)
        .bind(account_id)
        .bind(name)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("insert_project: {e}")))?;

        Ok(Project {
            project_id,
            account_id,
            name: name.to_string(),
            sandbox: None,
            created_at,
        })
    }

    pub async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT project_id, account_id, name, sandbox, created_at FROM projects WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_project: {e}")))?;
        Ok(row.map(ProjectRow::into_project))
    }

    pub async fn update_project_sandbox(&self, project_id: Uuid, sandbox: &SandboxInfo) -> Result<()> {
        sqlx::query("UPDATE projects SET sandbox = $2 WHERE project_id = $1")
            .bind(project_id)
            .bind(serde_json::to_value(sandbox).unwrap_or_default())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("update_project_sandbox: {e}")))?;
        Ok(())
    }

    /// Fire-and-forget project naming (§4.8 `initiate`): the LLM call
    /// happens elsewhere, this just writes the resolved name.
    pub async fn rename_project(&self, project_id: Uuid, name: &str) -> Result<()> {
        sqlx::query("UPDATE projects SET name = $2 WHERE project_id = $1")
            .bind(project_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("rename_project: {e}")))?;
        Ok(())
    }
}
