use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Exec / process-manager tool guard rails
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Default timeout for a command before it's backgrounded as a
    /// tracked process instead of returning inline.
    #[serde(default = "d_background_ms")]
    pub background_ms: u64,
    /// Default hard timeout for a foreground exec call.
    #[serde(default = "d_timeout_sec")]
    pub timeout_sec: u64,
    /// Max chars retained per process's combined stdout/stderr buffer
    /// before the oldest quarter is dropped.
    #[serde(default = "d_max_output_chars")]
    pub max_output_chars: usize,
    /// How long a finished process session is kept around before
    /// `cleanup_stale` evicts it.
    #[serde(default = "d_cleanup_ms")]
    pub cleanup_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            background_ms: d_background_ms(),
            timeout_sec: d_timeout_sec(),
            max_output_chars: d_max_output_chars(),
            cleanup_ms: d_cleanup_ms(),
        }
    }
}

fn d_background_ms() -> u64 {
    5_000
}
fn d_timeout_sec() -> u64 {
    60
}
fn d_max_output_chars() -> usize {
    200_000
}
fn d_cleanup_ms() -> u64 {
    3_600_000
}
