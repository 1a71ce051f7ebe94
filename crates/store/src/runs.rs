//! `runs` table — one row per agent run (spec §3, §6).

use chrono::{DateTime, Utc};
use sa_domain::error::{Error, Result};
use sa_domain::response::ResponseEvent;
use sa_domain::run::{Run, RunOptions, RunStatus};
use uuid::Uuid;

use crate::Store;

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    thread_id: Uuid,
    project_id: Uuid,
    account_id: Uuid,
    status: String,
    options: serde_json::Value,
    instance_id: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    responses: serde_json::Value,
}

impl RunRow {
    fn into_run(self) -> Result<Run> {
        Ok(Run {
            id: self.id,
            project_id: self.project_id,
            thread_id: self.thread_id,
            status: parse_status(&self.status)?,
            options: serde_json::from_value(self.options).unwrap_or_default(),
            instance_id: self.instance_id,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error,
        })
    }
}

fn parse_status(s: &str) -> Result<RunStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| Error::Store(format!("bad run status '{s}': {e}")))
}

fn status_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
        RunStatus::Stopped => "stopped",
        RunStatus::PlanningFailed => "planning_failed",
    }
}

impl Store {
    /// Insert a new `running`/`queued` run row. Account-scoped callers are
    /// expected to have already verified no other run is `running` for
    /// this project, but that check is racy across a fleet of worker
    /// processes; `runs_one_running_per_project` is the actual guarantee,
    /// and a violation here is reported as a conflict rather than a
    /// generic store error.
    pub async fn insert_run(&self, run: &Run, account_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO runs (id, thread_id, project_id, account_id, status, options,
                                  instance_id, created_at, started_at, completed_at, error, responses)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,'[]'::jsonb)"#,
        )
        .bind(run.id)
        .bind(run.thread_id)
        .bind(run.project_id)
        .bind(account_id)
        .bind(status_str(run.status))
        .bind(serde_json::to_value(&run.options).unwrap_or_default())
        .bind(&run.instance_id)
        .bind(run.created_at)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|d| d.code()) {
            Some(code) if code == "23505" => {
                Error::Conflict(format!("a running run already exists for project {}", run.project_id))
            }
            _ => Error::Store(format!("insert_run: {e}")),
        })?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>> {
        let row: Option<RunRow> = sqlx::query_as(
            r#"SELECT id, thread_id, project_id, account_id, status, options,
                      instance_id, created_at, started_at, completed_at, error, responses
               FROM runs WHERE id = $1"#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("get_run: {e}")))?;
        row.map(RunRow::into_run).transpose()
    }

    /// Runs for a thread, most recent first (§4.8 `list`).
    pub async fn list_runs_by_thread(&self, thread_id: Uuid) -> Result<Vec<Run>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            r#"SELECT id, thread_id, project_id, account_id, status, options,
                      instance_id, created_at, started_at, completed_at, error, responses
               FROM runs WHERE thread_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("list_runs_by_thread: {e}")))?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    /// Whether a run in this project is currently `running` (§3 invariant
    /// check, §4.8 `start`).
    pub async fn has_running_run(&self, project_id: Uuid) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM runs WHERE project_id = $1 AND status = 'running' LIMIT 1")
                .bind(project_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Store(format!("has_running_run: {e}")))?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn set_instance(&self, run_id: Uuid, instance_id: &str) -> Result<()> {
        sqlx::query("UPDATE runs SET instance_id = $2 WHERE id = $1")
            .bind(run_id)
            .bind(instance_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("set_instance: {e}")))?;
        Ok(())
    }

    /// Finalize a run's terminal status with the full replayed event log
    /// (§4.7 step 10). Retries with exponential backoff: the write races
    /// a concurrent `stop` call, and last-writer-wins is acceptable
    /// provided the stored status stays terminal (§5).
    pub async fn finalize_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        error: Option<&str>,
        responses: &[ResponseEvent],
    ) -> Result<()> {
        let responses_json = serde_json::to_value(responses).unwrap_or_default();
        let status_s = status_str(status);
        self.with_retry(|| async {
            sqlx::query(
                r#"UPDATE runs SET status = $2, error = $3, responses = $4, completed_at = now()
                   WHERE id = $1"#,
            )
            .bind(run_id)
            .bind(status_s)
            .bind(error)
            .bind(&responses_json)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("finalize_run: {e}")))?;
            Ok(())
        })
        .await
    }

    /// Stop path (§4.8 `stop`): write a terminal status immediately,
    /// independent of the worker's own finalize. A no-op if the run is
    /// already terminal (idempotence, §8).
    pub async fn mark_stopped_if_active(&self, run_id: Uuid, error: Option<&str>) -> Result<RunStatus> {
        let target = if error.is_some() { RunStatus::Failed } else { RunStatus::Stopped };
        let row: Option<(String,)> = sqlx::query_as(
            r#"UPDATE runs SET status = $2, error = COALESCE($3, error), completed_at = now()
               WHERE id = $1 AND status IN ('queued','running')
               RETURNING status"#,
        )
        .bind(run_id)
        .bind(status_str(target))
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("mark_stopped_if_active: {e}")))?;

        match row {
            Some((s,)) => parse_status(&s),
            None => {
                // Already terminal: report the existing status unchanged.
                let existing = self.get_run(run_id).await?;
                Ok(existing.map(|r| r.status).unwrap_or(RunStatus::Stopped))
            }
        }
    }
}
