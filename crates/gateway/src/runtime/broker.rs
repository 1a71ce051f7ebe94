//! In-process task broker (spec §6 "task-broker contract"): an
//! `mpsc`-channel-fed pool of worker tasks standing in for the reference
//! design's external `dramatiq.actor` dispatch. At-least-once delivery —
//! a crashed worker simply drops queued run ids — is acceptable because
//! `coordinator::run` re-checks the run's persisted status before doing
//! any work, so a duplicate delivery of an already-terminal run is a
//! no-op (§8 "duplicate task-broker delivery").

use std::sync::Arc;

use sa_domain::error::{Error, Result};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::runtime::coordinator;
use crate::state::AppState;

pub struct JobQueue {
    tx: mpsc::Sender<Uuid>,
}

impl JobQueue {
    /// Spawn `workers` tasks draining a bounded channel of run ids, each
    /// one driving `coordinator::run` to completion before picking up the
    /// next job.
    pub fn spawn(state: AppState, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Uuid>(capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..workers {
            let rx = rx.clone();
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    let run_id = { rx.lock().await.recv().await };
                    let Some(run_id) = run_id else { break };
                    if let Err(e) = coordinator::run(state.clone(), run_id).await {
                        tracing::error!(run_id = %run_id, worker_id, error = %e, "run coordinator failed");
                    }
                }
            });
        }

        Self { tx }
    }

    /// Queue a run for dispatch. Back-pressures the caller once
    /// `capacity` jobs are already queued.
    pub async fn enqueue(&self, run_id: Uuid) -> Result<()> {
        self.tx
            .send(run_id)
            .await
            .map_err(|_| Error::Other("job broker queue is closed".into()))
    }
}
