use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task State Manager / Plan Executor guard rails
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Run independent runnable subtasks concurrently instead of the
    /// reference design's sequential pass (§4.6 ordering guarantees).
    /// Stream events are still serialized per run either way.
    #[serde(default)]
    pub concurrent_subtasks: bool,
    /// Worker pool size for the in-process job broker (§6 task-broker
    /// contract).
    #[serde(default = "d_8")]
    pub broker_workers: usize,
    /// Bound on queued-but-undispatched jobs before `start`/`initiate`
    /// back-pressures the caller.
    #[serde(default = "d_256")]
    pub broker_queue_capacity: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            concurrent_subtasks: false,
            broker_workers: 8,
            broker_queue_capacity: 256,
        }
    }
}

fn d_8() -> usize {
    8
}
fn d_256() -> usize {
    256
}
