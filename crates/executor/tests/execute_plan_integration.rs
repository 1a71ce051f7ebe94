//! End-to-end scenarios for the plan executor (spec §8), each built from a
//! fake [`LlmProvider`] and an in-process [`ToolOrchestrator`] fed by a
//! migration-backed `TaskManager`.

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::LlmCapabilities;
use sa_domain::error::Result;
use sa_domain::response::{ResponseEvent, Substatus};
use sa_domain::stream::{BoxStream, StreamEvent};
use sa_domain::task::{Task, TaskStatus};
use sa_executor::{execute_plan, EventSink, ExecutorConfig};
use sa_providers::traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
use sa_store::Store;
use sa_tasks::TaskManager;
use sa_tools::complete_task::SystemCompleteTask;
use sa_tools::orchestrator::{Tool, ToolOrchestrator};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Always returns the same canned JSON — enough to drive parameter
/// synthesis without a real model.
struct FixedProvider {
    response: String,
}

impl FixedProvider {
    fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

#[async_trait]
impl LlmProvider for FixedProvider {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            content: self.response.clone(),
            tool_calls: vec![],
            usage: None,
            model: "fake-model".into(),
            finish_reason: Some("stop".into()),
        })
    }

    async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        Err(sa_domain::error::Error::Provider { provider: "fake".into(), message: "streaming not used in these tests".into() })
    }

    async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
        Ok(EmbeddingsResponse { embeddings: vec![] })
    }

    fn capabilities(&self) -> &LlmCapabilities {
        static CAPS: LlmCapabilities = LlmCapabilities {
            supports_tools: sa_domain::capability::ToolSupport::None,
            supports_streaming: false,
            supports_json_mode: true,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        };
        &CAPS
    }

    fn provider_id(&self) -> &str {
        "fake"
    }
}

/// A tool whose `run` method either succeeds with a fixed payload or fails,
/// and records invocation order for dependency-ordering assertions.
struct RecordingTool {
    fail: bool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for RecordingTool {
    fn tool_id(&self) -> &str {
        "ShellTool"
    }

    fn schemas(&self) -> Vec<sa_domain::tool::ToolSchema> {
        vec![sa_domain::tool::ToolSchema {
            tool_id: "ShellTool".into(),
            method: "run".into(),
            description: "run a shell command".into(),
            parameters: serde_json::json!({"type": "object", "properties": {"cmd": {"type": "string"}}}),
        }]
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        _cancel: CancellationToken,
    ) -> std::result::Result<serde_json::Value, String> {
        self.log.lock().await.push(method.to_string());
        if self.fail {
            return Err("non-zero exit".to_string());
        }
        Ok(serde_json::json!({"stdout": "hello\n", "exit_code": 0}))
    }
}

async fn build_main_with_subtasks(
    tasks: &TaskManager,
    run_id: Uuid,
    subtasks: Vec<(&str, Vec<String>, Vec<Uuid>)>,
) -> Task {
    let main = tasks.create(Task::new_main(run_id, "do the thing")).await.unwrap();

    for (name, assigned_tools, dependencies) in subtasks {
        let mut subtask = Task::new_subtask(run_id, main.id, name);
        subtask.assigned_tools = assigned_tools;
        subtask.dependencies = dependencies;
        // `create` appends the new subtask's id to `main.subtasks` itself.
        tasks.create(subtask).await.unwrap();
    }

    tasks.update(main.id, |t| t.status = TaskStatus::Planned).await.unwrap()
}

#[sqlx::test(migrations = "../store/migrations")]
async fn happy_path_single_step_plan_emits_events_in_order(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();
    let log = Arc::new(Mutex::new(Vec::new()));

    let main = build_main_with_subtasks(
        &tasks,
        run_id,
        vec![("echo", vec!["ShellTool__run".into()], vec![])],
    )
    .await;

    let tools = ToolOrchestrator::new();
    tools.register(Arc::new(RecordingTool { fail: false, log: log.clone() }));
    let provider = FixedProvider::new(r#"{"cmd": "echo hello"}"#);
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());
    let cancel = CancellationToken::new();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(!outcome.plan_failed);
    assert!(!outcome.stopped);

    let events = sink.lock().await;
    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Status { status, .. } => Some(match status {
                Substatus::PlanExecutionStart => "plan_execution_start",
                Substatus::PlanExecutionEnd => "plan_execution_end",
                _ => "other_status",
            }),
            ResponseEvent::AssistantMessageUpdate { .. } => "assistant_message_update",
            ResponseEvent::ToolStarted { .. } => "tool_started",
            ResponseEvent::ToolResult { .. } => "tool_result",
            ResponseEvent::ToolOutcome { .. } => "tool_outcome",
        })
        .collect();

    assert_eq!(kinds.first(), Some(&"plan_execution_start"));
    assert!(kinds.contains(&"tool_started"));
    assert!(kinds.contains(&"tool_result"));
    assert!(kinds.contains(&"tool_outcome"));
    assert_eq!(kinds.last(), Some(&"plan_execution_end"));

    let main_after = tasks.get(main.id).unwrap();
    assert_eq!(main_after.status, TaskStatus::Completed);
}

#[sqlx::test(migrations = "../store/migrations")]
async fn tool_failure_fails_the_plan_and_stops_after_the_failing_step(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();
    let log = Arc::new(Mutex::new(Vec::new()));

    let main = build_main_with_subtasks(
        &tasks,
        run_id,
        vec![("echo", vec!["ShellTool__run".into()], vec![])],
    )
    .await;

    let tools = ToolOrchestrator::new();
    tools.register(Arc::new(RecordingTool { fail: true, log: log.clone() }));
    let provider = FixedProvider::new(r#"{"cmd": "echo hello"}"#);
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());
    let cancel = CancellationToken::new();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(outcome.plan_failed);
    let main_after = tasks.get(main.id).unwrap();
    assert_eq!(main_after.status, TaskStatus::Failed);
}

#[sqlx::test(migrations = "../store/migrations")]
async fn dependency_ordering_runs_s3_after_both_s1_and_s2_complete(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();
    let log = Arc::new(Mutex::new(Vec::new()));

    let main = tasks.create(Task::new_main(run_id, "dag")).await.unwrap();

    let mut s1 = Task::new_subtask(run_id, main.id, "s1");
    s1.assigned_tools = vec!["ShellTool__run".into()];
    let s1 = tasks.create(s1).await.unwrap();

    let mut s2 = Task::new_subtask(run_id, main.id, "s2");
    s2.assigned_tools = vec!["ShellTool__run".into()];
    let s2 = tasks.create(s2).await.unwrap();

    let mut s3 = Task::new_subtask(run_id, main.id, "s3");
    s3.assigned_tools = vec!["ShellTool__run".into()];
    s3.dependencies = vec![s1.id, s2.id];
    let s3 = tasks.create(s3).await.unwrap();

    let main = tasks.update(main.id, |t| t.status = TaskStatus::Planned).await.unwrap();

    let tools = ToolOrchestrator::new();
    tools.register(Arc::new(RecordingTool { fail: false, log: log.clone() }));
    let provider = FixedProvider::new(r#"{"cmd": "echo hello"}"#);
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());
    let cancel = CancellationToken::new();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(!outcome.plan_failed);
    let ordered = log.lock().await;
    assert_eq!(ordered.len(), 3);
    // s1/s2 run in the same pass (order between them unspecified); s3 must
    // be last since it depends on both.
    assert_eq!(ordered[2], "run");
    let s3_after = tasks.get(s3.id).unwrap();
    let s1_after = tasks.get(s1.id).unwrap();
    let s2_after = tasks.get(s2.id).unwrap();
    assert!(s3_after.start_time.unwrap() >= s1_after.end_time.unwrap());
    assert!(s3_after.start_time.unwrap() >= s2_after.end_time.unwrap());
}

#[sqlx::test(migrations = "../store/migrations")]
async fn pending_subtask_with_unsatisfiable_dependency_deadlocks(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();

    let main = tasks.create(Task::new_main(run_id, "broken dag")).await.unwrap();

    let ghost_dependency = Uuid::new_v4();
    let mut orphan = Task::new_subtask(run_id, main.id, "orphan");
    orphan.dependencies = vec![ghost_dependency];
    tasks.create(orphan).await.unwrap();

    let main = tasks.update(main.id, |t| t.status = TaskStatus::Planned).await.unwrap();

    let tools = ToolOrchestrator::new();
    let provider = FixedProvider::new("{}");
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());
    let cancel = CancellationToken::new();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(outcome.plan_failed);
    assert!(!outcome.stopped);
}

/// §8 scenario 4: a cancellation observed between subtasks stops the plan
/// before the next one starts, without rolling back the one already run.
#[sqlx::test(migrations = "../store/migrations")]
async fn cancellation_between_subtasks_stops_before_the_next_one_starts(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();
    let log = Arc::new(Mutex::new(Vec::new()));

    let main = tasks.create(Task::new_main(run_id, "two steps")).await.unwrap();

    let mut s1 = Task::new_subtask(run_id, main.id, "s1");
    s1.assigned_tools = vec!["ShellTool__run".into()];
    let s1 = tasks.create(s1).await.unwrap();
    let mut s2 = Task::new_subtask(run_id, main.id, "s2");
    s2.assigned_tools = vec!["ShellTool__run".into()];
    s2.dependencies = vec![s1.id];
    let s2 = tasks.create(s2).await.unwrap();

    let main = tasks.update(main.id, |t| t.status = TaskStatus::Planned).await.unwrap();

    let tools = ToolOrchestrator::new();
    tools.register(Arc::new(RecordingTool { fail: false, log: log.clone() }));
    let provider = FixedProvider::new(r#"{"cmd": "echo hello"}"#);
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(outcome.stopped);
    assert!(log.lock().await.is_empty());
    let s1_after = tasks.get(s1.id).unwrap();
    assert_eq!(s1_after.status, TaskStatus::Pending);
}

/// §8 scenario 3-adjacent: the agent's own completion signal ends the plan
/// even with subtasks still pending.
#[sqlx::test(migrations = "../store/migrations")]
async fn system_complete_task_ends_the_plan_early(pool: PgPool) {
    let store = Arc::new(Store::from_pool(pool));
    let tasks = TaskManager::new(store);
    let run_id = Uuid::new_v4();

    let mut done = Task::new_subtask(run_id, Uuid::nil(), "finish");
    done.assigned_tools = vec!["SystemCompleteTask__task_complete".into()];
    let main = tasks.create(Task::new_main(run_id, "goal")).await.unwrap();
    done.parent_id = Some(main.id);
    let done = tasks.create(done).await.unwrap();

    let mut never_runs = Task::new_subtask(run_id, main.id, "unreachable");
    never_runs.dependencies = vec![done.id];
    let never_runs = tasks.create(never_runs).await.unwrap();

    let main = tasks.update(main.id, |t| t.status = TaskStatus::Planned).await.unwrap();

    let tools = ToolOrchestrator::new();
    tools.register(Arc::new(SystemCompleteTask));
    let provider = FixedProvider::new(r#"{"summary": "all done"}"#);
    let sink: Mutex<Vec<ResponseEvent>> = Mutex::new(Vec::new());
    let cancel = CancellationToken::new();

    let outcome = execute_plan(&tasks, &tools, &provider, run_id, main.id, &ExecutorConfig::default(), &sink, &cancel)
        .await
        .unwrap();

    assert!(outcome.agent_signalled_completion);
    assert!(outcome.summary.contains("all done"));
    let never_runs_after = tasks.get(never_runs.id).unwrap();
    assert_eq!(never_runs_after.status, TaskStatus::Pending);
}
