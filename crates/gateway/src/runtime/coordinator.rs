//! The Run Coordinator (spec §4.7): the background worker entry point that
//! drives one run from `running` to a terminal status.
//!
//! Grounded on `run_agent_background.py`/`agent/run.py`'s dispatch
//! sequence: claim the run, stand up the sandbox and tool registry, plan,
//! execute, persist the final result, release the sandbox.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::error::{Error, Result};
use sa_domain::response::{ResponseEvent, Substatus};
use sa_domain::run::RunStatus;
use sa_executor::{execute_plan, EventSink, ExecutorConfig};
use sa_registry::ControlSignal;
use sa_tools::builtin::{ExecTool, FileOpsTool, ProcessTool};
use sa_tools::complete_task::SystemCompleteTask;
use sa_tools::{ProcessManager, ToolOrchestrator};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::runtime::sink::RegistryEventSink;
use crate::state::AppState;

/// Drive `run_id` to a terminal status. Safe to call more than once for the
/// same run id: if the run is already terminal this is a no-op, covering
/// the job broker's at-least-once delivery (§8 "duplicate task-broker
/// delivery").
pub async fn run(state: AppState, run_id: Uuid) -> Result<()> {
    let Some(run) = state.store.get_run(run_id).await? else {
        return Err(Error::NotFound(format!("run {run_id}")));
    };
    if run.status.is_terminal() {
        tracing::info!(run_id = %run_id, status = ?run.status, "run already terminal, skipping duplicate delivery");
        return Ok(());
    }

    state.store.set_instance(run_id, &state.instance_id).await?;
    state.registry.register(&state.instance_id, run_id).await?;

    let cancel = CancellationToken::new();
    let stop_watcher = spawn_stop_watcher(state.registry.clone(), run_id, state.instance_id.clone(), cancel.clone());

    let outcome = drive(&state, run_id, run.thread_id, run.project_id, &cancel).await;
    stop_watcher.abort();

    let (final_status, error) = match &outcome {
        Ok((status, error)) => (*status, error.clone()),
        Err(e) => (RunStatus::Failed, Some(e.to_string())),
    };

    finalize(&state, run_id, final_status, error.as_deref()).await?;

    state.registry.deregister(&state.instance_id, run_id).await?;
    state
        .registry
        .set_retention(run_id, state.config.registry.log_ttl_seconds)
        .await?;

    outcome.map(|_| ())
}

async fn drive(
    state: &AppState,
    run_id: Uuid,
    thread_id: Uuid,
    project_id: Uuid,
    cancel: &CancellationToken,
) -> Result<(RunStatus, Option<String>)> {
    let sink = TtlRefreshingSink {
        inner: RegistryEventSink::new(state.registry.clone(), run_id),
        registry: state.registry.clone(),
        instance_id: state.instance_id.clone(),
        run_id,
        every: state.config.registry.ttl_refresh_every_events.max(1),
        count: AtomicU32::new(0),
    };

    sink.emit(ResponseEvent::status(run_id, Substatus::ThreadRunStart, serde_json::json!({})))
        .await?;

    let Some(project) = state.store.get_project(project_id).await? else {
        return Err(Error::NotFound(format!("project {project_id}")));
    };
    let sandbox = state.sandbox.get_or_start(project_id, project.sandbox.clone()).await?;
    if project.sandbox.as_ref().map(|s| &s.id) != Some(&sandbox.id) {
        state.store.update_project_sandbox(project_id, &sandbox).await?;
    }
    let workspace_root = workspace_root_for(&sandbox);

    let Some(initial_prompt) = state.store.first_user_message_text(thread_id).await? else {
        return Err(Error::NotFound(format!("no user message found for thread {thread_id}")));
    };

    let Some(provider) = state.default_provider() else {
        return Err(Error::Config("no LLM provider configured".into()));
    };

    let tools = build_tool_orchestrator(state, workspace_root);

    state.tasks.hydrate_run(run_id).await?;
    sink.emit(ResponseEvent::status(run_id, Substatus::AssistantResponseStart, serde_json::json!({})))
        .await?;

    let main_task = match sa_planner::plan_task(&state.tasks, &tools, provider.as_ref(), run_id, &initial_prompt).await {
        Ok(task) => task,
        Err(Error::PlanningFailed(reason)) => {
            sink.emit(ResponseEvent::status(run_id, Substatus::Error, serde_json::json!({"reason": reason}))).await?;
            sandbox_stop(state, &sandbox).await;
            sink.emit(ResponseEvent::status(run_id, Substatus::ThreadRunEnd, serde_json::json!({}))).await?;
            return Ok((RunStatus::PlanningFailed, Some(reason)));
        }
        Err(e) => return Err(e),
    };

    let executor_config = ExecutorConfig { concurrent_subtasks: state.config.tasks.concurrent_subtasks };
    let plan_outcome = execute_plan(
        &state.tasks,
        &tools,
        provider.as_ref(),
        run_id,
        main_task.id,
        &executor_config,
        &sink,
        cancel,
    )
    .await?;

    sandbox_stop(state, &sandbox).await;

    let (status, substatus, error) = if plan_outcome.stopped {
        (RunStatus::Stopped, Substatus::Stopped, None)
    } else if plan_outcome.plan_failed {
        (RunStatus::Failed, Substatus::Failed, Some(plan_outcome.summary.clone()))
    } else {
        (RunStatus::Completed, Substatus::Completed, None)
    };

    sink.emit(ResponseEvent::status(
        run_id,
        substatus,
        serde_json::json!({"summary": plan_outcome.summary}),
    ))
    .await?;

    sink.emit(ResponseEvent::status(run_id, Substatus::ThreadRunEnd, serde_json::json!({})))
        .await?;

    Ok((status, error))
}

fn build_tool_orchestrator(state: &AppState, workspace_root: PathBuf) -> ToolOrchestrator {
    let tools = ToolOrchestrator::new();
    let manager = Arc::new(ProcessManager::new(state.config.exec.clone()));
    tools.register(Arc::new(SystemCompleteTask));
    tools.register(Arc::new(ExecTool::new(manager.clone())));
    tools.register(Arc::new(ProcessTool::new(manager)));
    tools.register(Arc::new(FileOpsTool::new(workspace_root)));
    tools
}

/// `SandboxInfo.sandbox_url` carries `file://{path}` for the local
/// provider; other providers give the orchestrator no filesystem access
/// of their own, so file-ops operate under a scratch directory instead.
pub(crate) fn workspace_root_for(sandbox: &sa_store::projects::SandboxInfo) -> PathBuf {
    sandbox
        .sandbox_url
        .as_deref()
        .and_then(|url| url.strip_prefix("file://"))
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

async fn sandbox_stop(state: &AppState, sandbox: &sa_store::projects::SandboxInfo) {
    if let Err(e) = state.sandbox.stop(sandbox).await {
        tracing::warn!(sandbox_id = %sandbox.id, error = %e, "sandbox stop failed");
    }
}

async fn finalize(state: &AppState, run_id: Uuid, status: RunStatus, error: Option<&str>) -> Result<()> {
    let responses: Vec<ResponseEvent> = state
        .registry
        .read_range(run_id, 0, None)
        .await?
        .into_iter()
        .map(|(_, event)| event)
        .collect();

    state.store.finalize_run(run_id, status, error, &responses).await?;

    let signal = if status == RunStatus::Completed || status == RunStatus::Stopped {
        ControlSignal::EndStream
    } else {
        ControlSignal::Error
    };
    state.registry.publish_control(run_id, None, signal).await?;
    Ok(())
}

/// Subscribes to this run's control channel (both the run-wide and
/// instance-scoped names, per §4.7 step 2) and cancels the executor's
/// token the moment a `Stop` signal arrives.
fn spawn_stop_watcher(
    registry: Arc<dyn sa_registry::RegistryBackend>,
    run_id: Uuid,
    instance_id: String,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut global = match registry.subscribe_control(run_id, None).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "failed to subscribe to control channel");
                return;
            }
        };
        let mut scoped = match registry.subscribe_control(run_id, Some(&instance_id)).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "failed to subscribe to instance control channel");
                return;
            }
        };
        loop {
            tokio::select! {
                Some(signal) = global.recv() => {
                    if signal == ControlSignal::Stop {
                        cancel.cancel();
                        break;
                    }
                }
                Some(signal) = scoped.recv() => {
                    if signal == ControlSignal::Stop {
                        cancel.cancel();
                        break;
                    }
                }
                else => break,
            }
        }
    })
}

/// Wraps [`RegistryEventSink`] to refresh the run's liveness TTL every
/// `every` events (§4.7 step 2: "~50"), instead of only on a fixed timer —
/// a quiet run doesn't need refreshing, a noisy one needs it more often.
struct TtlRefreshingSink {
    inner: RegistryEventSink,
    registry: Arc<dyn sa_registry::RegistryBackend>,
    instance_id: String,
    run_id: Uuid,
    every: u32,
    count: AtomicU32,
}

#[async_trait]
impl EventSink for TtlRefreshingSink {
    async fn emit(&self, event: ResponseEvent) -> Result<()> {
        self.inner.emit(event).await?;
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.every == 0 {
            self.registry.refresh_ttl(&self.instance_id, self.run_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_store::projects::SandboxInfo;

    #[test]
    fn workspace_root_strips_file_scheme() {
        let sandbox = SandboxInfo {
            id: "sbx-1".into(),
            sandbox_url: Some("file:///tmp/sa-workspaces/sbx-1".into()),
            is_local: true,
            ..Default::default()
        };
        assert_eq!(workspace_root_for(&sandbox), PathBuf::from("/tmp/sa-workspaces/sbx-1"));
    }

    #[test]
    fn workspace_root_falls_back_to_tempdir_for_non_local_sandboxes() {
        let sandbox = SandboxInfo {
            id: "remote-1".into(),
            sandbox_url: Some("wss://node.example/remote-1".into()),
            is_local: false,
            ..Default::default()
        };
        assert_eq!(workspace_root_for(&sandbox), std::env::temp_dir());
    }

    #[test]
    fn workspace_root_falls_back_when_sandbox_url_missing() {
        let sandbox = SandboxInfo { id: "no-url".into(), ..Default::default() };
        assert_eq!(workspace_root_for(&sandbox), std::env::temp_dir());
    }
}
