/// Shared error type used across all orchestrator crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The task planner produced an invalid or unvalidatable plan.
    #[error("planning failed: {0}")]
    PlanningFailed(String),

    /// The plan executor found a pending subtask set with nothing runnable.
    #[error("deadlock: {0}")]
    Deadlock(String),

    /// A tool invocation failed after the orchestrator's own retries.
    #[error("tool {tool_id} failed: {message}")]
    ToolFailed { tool_id: String, message: String },

    /// The sandbox provider could not be reached or returned a fault.
    #[error("sandbox: {0}")]
    Sandbox(String),

    /// The run registry or response log backend is unavailable.
    #[error("registry: {0}")]
    Registry(String),

    /// The persisted store returned an error.
    #[error("store: {0}")]
    Store(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
