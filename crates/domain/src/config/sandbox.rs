use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sandbox provider (the "create/get_or_start/exec/stop" collaborator)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub provider: SandboxProviderKind,
    /// Timeout for orchestration-sized shell commands, seconds (§5: 60s).
    #[serde(default = "d_60")]
    pub orchestration_timeout_sec: u64,
    /// Timeout for larger scripted commands, seconds (§5: 300s).
    #[serde(default = "d_300")]
    pub script_timeout_sec: u64,
    /// Cleanup commands run against `/workspace` before the sandbox is
    /// stopped (§4.7 step 10). Non-zero exit is logged, not fatal.
    #[serde(default = "d_cleanup_commands")]
    pub cleanup_commands: Vec<String>,
    /// Base `ws://`/`wss://` URL a `remote_node` sandbox node connects
    /// through. Required when `provider = remote_node`.
    #[serde(default)]
    pub remote_ws_url: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            provider: SandboxProviderKind::default(),
            orchestration_timeout_sec: 60,
            script_timeout_sec: 300,
            cleanup_commands: d_cleanup_commands(),
            remote_ws_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxProviderKind {
    /// Runs commands in a local subprocess under a per-project temp
    /// directory. Used for tests and single-host deployments.
    #[default]
    Local,
    /// Dispatches to a remote sandbox node over the node protocol.
    RemoteNode,
}

fn d_60() -> u64 {
    60
}
fn d_300() -> u64 {
    300
}
fn d_cleanup_commands() -> Vec<String> {
    vec![
        "find /workspace -name '*.tmp' -type f -delete".into(),
        "find /workspace -type d -empty -delete".into(),
    ]
}
