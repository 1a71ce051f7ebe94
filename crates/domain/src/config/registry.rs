use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run Registry / Response Log backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,
    /// Required when `backend = redis`.
    #[serde(default = "d_redis_url")]
    pub redis_url: String,
    /// T_reg — liveness key TTL, seconds (§5: 24h default).
    #[serde(default = "d_86400")]
    pub run_ttl_seconds: u64,
    /// T_log — response log retention after a run reaches a terminal
    /// status, seconds (§5: 24h default).
    #[serde(default = "d_86400")]
    pub log_ttl_seconds: u64,
    /// How many appended events between TTL refreshes (§4.7 step 2: ~50).
    #[serde(default = "d_50")]
    pub ttl_refresh_every_events: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::default(),
            redis_url: d_redis_url(),
            run_ttl_seconds: 86_400,
            log_ttl_seconds: 86_400,
            ttl_refresh_every_events: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    /// Single-process in-memory backend: `tokio::sync::broadcast` fan-out
    /// plus a `parking_lot::RwLock<HashMap<..>>` map. Used for tests and
    /// single-instance deployments.
    #[default]
    Memory,
    /// Shared Redis-backed key/value + pub/sub, required once more than
    /// one worker process is running (§5).
    Redis,
}

fn d_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}
fn d_86400() -> u64 {
    86_400
}
fn d_50() -> u32 {
    50
}
