use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persisted relational store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_database_url")]
    pub database_url: String,
    #[serde(default = "d_5")]
    pub max_connections: u32,
    /// Attempts for the finalize-run write (§4.7 step 10: "up to 3 retries
    /// on conflict, exponential backoff").
    #[serde(default = "d_3")]
    pub finalize_retry_attempts: u32,
    #[serde(default = "d_100")]
    pub finalize_retry_base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: d_database_url(),
            max_connections: 5,
            finalize_retry_attempts: 3,
            finalize_retry_base_delay_ms: 100,
        }
    }
}

fn d_database_url() -> String {
    "postgres://localhost/orchestrator".into()
}
fn d_5() -> u32 {
    5
}
fn d_3() -> u32 {
    3
}
fn d_100() -> u64 {
    100
}
