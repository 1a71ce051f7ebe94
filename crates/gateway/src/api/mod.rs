//! Control Plane (spec §4.8, §6): the HTTP surface over the Run Registry,
//! Response Log, and Store. Grounded on `backend/agent/api.py`'s route
//! table, realized with axum the way the teacher's own `api` module is
//! built.

pub mod dto;
pub mod error;
pub mod runs;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agent/initiate", post(runs::initiate))
        .route("/thread/:thread_id/agent/start", post(runs::start))
        .route("/agent-run/:run_id/stop", post(runs::stop))
        .route("/agent-run/:run_id", get(runs::get))
        .route("/thread/:thread_id/agent-runs", get(runs::list))
        .route("/agent-run/:run_id/stream", get(runs::stream_run))
        .with_state(state)
}
