//! Wire-shape types for the Control Plane (§6 HTTP surface). Kept
//! separate from `sa_domain::run::Run` because the external JSON keys
//! (`threadId`, `startedAt`, ...) are camelCase while the domain type and
//! the store stay snake_case throughout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sa_domain::run::{Run, RunStatus};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDto {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&Run> for RunDto {
    fn from(run: &Run) -> Self {
        RunDto {
            id: run.id,
            thread_id: run.thread_id,
            status: run.status,
            started_at: run.started_at,
            completed_at: run.completed_at,
            error: run.error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub thread_id: Uuid,
    pub agent_run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub agent_run_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub agent_runs: Vec<RunDto>,
}

/// Run options accepted on `start`, mirroring `RunOptions` but with every
/// field optional so a caller may omit what it doesn't care about.
#[derive(Debug, Default, Deserialize)]
pub struct RunOptionsInput {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub enable_thinking: Option<bool>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
}

impl From<RunOptionsInput> for sa_domain::run::RunOptions {
    fn from(input: RunOptionsInput) -> Self {
        sa_domain::run::RunOptions {
            model: input.model,
            stream: input.stream,
            enable_thinking: input.enable_thinking,
            reasoning_effort: input.reasoning_effort,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    #[allow(dead_code)]
    pub token: Option<String>,
}
