//! `tasks` table — one row per task-DAG node, stored as a JSONB blob.
//!
//! Mirrors the original `TaskStorage` ABC (`task_types.py`): the row
//! columns exist only for indexed lookups (`run_id`, `parent_id`,
//! `status`), the task itself round-trips whole through `data`.

use sa_domain::error::{Error, Result};
use sa_domain::task::{Task, TaskStatus};
use uuid::Uuid;

use crate::Store;

fn status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::PendingPlanning => "pending_planning",
        TaskStatus::Planned => "planned",
        TaskStatus::ExecutingPlan => "executing_plan",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Paused => "paused",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn row_to_task(data: serde_json::Value) -> Result<Task> {
    serde_json::from_value(data).map_err(|e| Error::Store(format!("corrupt task row: {e}")))
}

impl Store {
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let data = serde_json::to_value(task).unwrap_or_default();
        sqlx::query(
            r#"INSERT INTO tasks (id, run_id, parent_id, status, data, created_at)
               VALUES ($1,$2,$3,$4,$5,$6)"#,
        )
        .bind(task.id)
        .bind(task.run_id)
        .bind(task.parent_id)
        .bind(status_str(task.status))
        .bind(&data)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("insert_task: {e}")))?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM tasks WHERE id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Store(format!("get_task: {e}")))?;
        row.map(|(data,)| row_to_task(data)).transpose()
    }

    /// Direct children of `parent_id`, in creation order.
    pub async fn get_subtasks(&self, parent_id: Uuid) -> Result<Vec<Task>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT data FROM tasks WHERE parent_id = $1 ORDER BY created_at ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_subtasks: {e}")))?;
        rows.into_iter().map(|(data,)| row_to_task(data)).collect()
    }

    /// All tasks belonging to a run with a given status (e.g. the
    /// executor's "runnable subtasks" scan, §4.6).
    pub async fn get_by_status(&self, run_id: Uuid, status: TaskStatus) -> Result<Vec<Task>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT data FROM tasks WHERE run_id = $1 AND status = $2 ORDER BY created_at ASC",
        )
        .bind(run_id)
        .bind(status_str(status))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_by_status: {e}")))?;
        rows.into_iter().map(|(data,)| row_to_task(data)).collect()
    }

    /// All tasks for a run, in creation order (planner output + executor
    /// progress, taken together).
    pub async fn get_all_tasks(&self, run_id: Uuid) -> Result<Vec<Task>> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT data FROM tasks WHERE run_id = $1 ORDER BY created_at ASC",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_all_tasks: {e}")))?;
        rows.into_iter().map(|(data,)| row_to_task(data)).collect()
    }

    /// Overwrite a task's row wholesale. `sa-tasks` is the authoritative
    /// in-memory owner; this is its write-through, not a partial patch.
    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let data = serde_json::to_value(task).unwrap_or_default();
        let result = sqlx::query("UPDATE tasks SET status = $2, data = $3 WHERE id = $1")
            .bind(task.id)
            .bind(status_str(task.status))
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("update_task: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(Error::Store(format!("update_task: no such task {}", task.id)));
        }
        Ok(())
    }

    pub async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("delete_task: {e}")))?;
        Ok(())
    }
}
