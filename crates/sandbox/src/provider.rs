//! The sandbox-provider collaborator (spec §1, §4.7): `create` / `get_or_start` /
//! `exec` / `stop`, exactly as the Run Coordinator expects. Two backends
//! implement this trait — [`crate::local::LocalSandboxProvider`] (a
//! subprocess under a per-project temp dir) and
//! [`crate::remote::RemoteNodeSandboxProvider`] (a websocket-connected
//! sandbox node) — selected at bootstrap by `sa_domain::config::SandboxConfig`.

use async_trait::async_trait;
use sa_domain::error::Result;
use sa_store::projects::SandboxInfo;
use uuid::Uuid;

/// A command to run inside a project's sandbox.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub command: String,
    pub workdir: Option<String>,
    pub timeout_sec: u64,
}

/// The outcome of running a command in a sandbox.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl ExecOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The sandbox-provider collaborator named in §1 and driven by
/// `sa-gateway::runtime::coordinator`'s `get_or_start_sandbox` step.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a brand-new sandbox for a project that doesn't have one
    /// yet. Persists nothing itself — the caller writes the returned
    /// [`SandboxInfo`] onto the project row.
    async fn create(&self, project_id: Uuid) -> Result<SandboxInfo>;

    /// Ensure a sandbox is running and reachable, starting one if the
    /// project has none or its existing one is no longer alive. Returns
    /// the (possibly refreshed) [`SandboxInfo`] the caller should persist
    /// if it changed.
    async fn get_or_start(&self, project_id: Uuid, existing: Option<SandboxInfo>) -> Result<SandboxInfo>;

    /// Run a command inside the project's sandbox.
    async fn exec(&self, sandbox: &SandboxInfo, spec: ExecSpec) -> Result<ExecOutcome>;

    /// Run the configured cleanup commands and release the sandbox's
    /// resources (§4.7 step 10). Best-effort: a cleanup command's nonzero
    /// exit is logged, not propagated.
    async fn stop(&self, sandbox: &SandboxInfo) -> Result<()>;
}
