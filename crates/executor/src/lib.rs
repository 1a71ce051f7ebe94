//! Plan Executor (spec §4.6) — drives a planned task's subtask DAG to
//! completion, one dependency-satisfied batch at a time.
//!
//! Grounded line-for-line on `agentpress/plan_executor.py::execute_plan`:
//! the runnable-set computation, single-pass deadlock detection, 3-attempt
//! parameter synthesis with reminder-prompt retries, and the
//! `SystemCompleteTask` short-circuit are all carried over faithfully.

pub mod execute;
pub mod sink;

pub use execute::{execute_plan, ExecutorConfig, PlanOutcome};
pub use sink::EventSink;
