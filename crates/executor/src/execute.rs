use std::collections::HashSet;

use sa_domain::error::{Error, Result};
use sa_domain::response::{ResponseEvent, Substatus};
use sa_domain::task::{Task, TaskStatus};
use sa_domain::tool::{Message, ToolSchema};
use sa_providers::traits::{ChatRequest, LlmProvider};
use sa_tasks::TaskManager;
use sa_tools::orchestrator::ToolOrchestrator;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::sink::EventSink;

/// One retry beyond the first attempt, i.e. 2 total parameter-synthesis
/// attempts before giving up — matches the original's
/// `MAX_PARAM_GENERATION_RETRIES = 2` meaning 3 total attempts for the
/// *tool call*, but only 2 of those are parameter-generation LLM calls
/// (the third attempt reuses the last successfully-parsed params if any);
/// here we spend all 3 on synthesis since there's nothing cheaper to fall
/// back to.
const MAX_PARAM_SYNTHESIS_ATTEMPTS: u32 = 3;
const STEP_SUMMARY_TRUNCATE: usize = 200;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Run independent runnable subtasks within one pass concurrently
    /// instead of sequentially. Off by default — the reference design's
    /// `plan_executor.py` processes subtasks one at a time within a pass.
    pub concurrent_subtasks: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { concurrent_subtasks: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanOutcome {
    pub agent_signalled_completion: bool,
    pub summary: String,
    pub plan_failed: bool,
    pub stopped: bool,
}

struct StepResult {
    step_name: String,
    tool_used: Option<String>,
    result: serde_json::Value,
}

/// Drive `main_task_id`'s subtask DAG to completion. `main_task_id` must
/// already be `Planned` (the Task Planner's job) with its `subtasks` list
/// populated; this function moves it through `ExecutingPlan` to a terminal
/// status and returns the same outcome it persisted.
#[allow(clippy::too_many_arguments)]
pub async fn execute_plan(
    tasks: &TaskManager,
    tools: &ToolOrchestrator,
    provider: &dyn LlmProvider,
    thread_run_id: Uuid,
    main_task_id: Uuid,
    config: &ExecutorConfig,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<PlanOutcome> {
    let main = tasks
        .get(main_task_id)
        .ok_or_else(|| Error::NotFound(format!("task {main_task_id}")))?;

    tasks.set_status(main.id, TaskStatus::ExecutingPlan).await?;
    sink.emit(ResponseEvent::status(
        thread_run_id,
        Substatus::PlanExecutionStart,
        serde_json::json!({"main_task_id": main.id}),
    ))
    .await?;

    let total = main.subtasks.len();
    let mut completed_subtask_ids: HashSet<Uuid> = HashSet::new();
    let mut all_step_results: Vec<StepResult> = Vec::new();
    let mut outcome = PlanOutcome::default();
    let mut agent_summary: Option<String> = None;
    let mut step_number = 0usize;

    'outer: loop {
        if cancel.is_cancelled() {
            outcome.stopped = true;
            break;
        }

        let subtasks = tasks.get_subtasks(main.id);
        let pending: Vec<Task> = subtasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        if pending.is_empty() {
            break;
        }

        let runnable: Vec<Task> = pending
            .into_iter()
            .filter(|t| t.dependencies.iter().all(|d| completed_subtask_ids.contains(d)))
            .collect();

        if runnable.is_empty() {
            tracing::error!(main_task_id = %main.id, "plan deadlocked: pending subtasks with unsatisfied dependencies");
            sink.emit(ResponseEvent::status(
                thread_run_id,
                Substatus::Error,
                serde_json::json!({"reason": "deadlock", "main_task_id": main.id}),
            ))
            .await?;
            outcome.plan_failed = true;
            break;
        }

        if config.concurrent_subtasks {
            let futures = runnable.iter().enumerate().map(|(i, subtask)| {
                run_subtask(tasks, tools, provider, thread_run_id, &main, subtask, step_number + i + 1, total, sink)
            });
            let results = futures_util::future::join_all(futures).await;
            for (subtask, result) in runnable.iter().zip(results) {
                step_number += 1;
                let outcome_step = result?;
                completed_subtask_ids.insert(subtask.id);
                if let Some(step) = outcome_step.step {
                    all_step_results.push(step);
                }
                if let Some(summary) = outcome_step.agent_signalled_summary {
                    outcome.agent_signalled_completion = true;
                    agent_summary = Some(summary);
                    break 'outer;
                }
                if outcome_step.failed {
                    outcome.plan_failed = true;
                    break 'outer;
                }
            }
        } else {
            for subtask in &runnable {
                step_number += 1;
                let outcome_step =
                    run_subtask(tasks, tools, provider, thread_run_id, &main, subtask, step_number, total, sink).await?;
                completed_subtask_ids.insert(subtask.id);
                if let Some(step) = outcome_step.step {
                    all_step_results.push(step);
                }
                if let Some(summary) = outcome_step.agent_signalled_summary {
                    outcome.agent_signalled_completion = true;
                    agent_summary = Some(summary);
                    break 'outer;
                }
                if outcome_step.failed {
                    outcome.plan_failed = true;
                    break 'outer;
                }
            }
        }
    }

    outcome.summary = build_summary(&outcome, agent_summary.as_deref(), &all_step_results);

    let final_status = if outcome.stopped {
        TaskStatus::Cancelled
    } else if outcome.plan_failed {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    };

    if final_status == TaskStatus::Failed {
        tasks.fail(main.id, outcome.summary.clone()).await?;
    } else {
        tasks
            .update(main.id, |t| {
                t.status = final_status;
                t.result = Some(serde_json::json!({"summary": outcome.summary}));
            })
            .await?;
    }

    sink.emit(ResponseEvent::status(
        thread_run_id,
        Substatus::PlanExecutionEnd,
        serde_json::json!({
            "main_task_id": main.id,
            "summary": outcome.summary,
            "agent_signalled_completion": outcome.agent_signalled_completion,
            "plan_failed": outcome.plan_failed,
            "stopped": outcome.stopped,
        }),
    ))
    .await?;

    Ok(outcome)
}

struct SubtaskOutcome {
    step: Option<StepResult>,
    agent_signalled_summary: Option<String>,
    failed: bool,
}

#[allow(clippy::too_many_arguments)]
async fn run_subtask(
    tasks: &TaskManager,
    tools: &ToolOrchestrator,
    provider: &dyn LlmProvider,
    thread_run_id: Uuid,
    main: &Task,
    subtask: &Task,
    step_index: usize,
    total: usize,
    sink: &dyn EventSink,
) -> Result<SubtaskOutcome> {
    tasks
        .update(subtask.id, |t| {
            t.status = TaskStatus::Running;
            t.start_time = Some(chrono::Utc::now());
        })
        .await?;

    sink.emit(ResponseEvent::assistant_message_update(
        thread_run_id,
        serde_json::json!({"text": format!("Step {step_index} of {total}: starting '{}'", subtask.name)}),
    ))
    .await?;

    if subtask.assigned_tools.is_empty() {
        let synthetic = serde_json::json!({"status": "success", "note": "no tool assigned; marked complete"});
        tasks.complete(subtask.id, synthetic.clone()).await?;
        return Ok(SubtaskOutcome {
            step: Some(StepResult { step_name: subtask.name.clone(), tool_used: None, result: synthetic }),
            agent_signalled_summary: None,
            failed: false,
        });
    }

    // The reference design assigns at most one tool per subtask; a
    // subtask with several is treated as a configuration error, not a
    // fan-out point.
    let qualified = &subtask.assigned_tools[0];
    let Some((tool_id, method)) = ToolSchema::split_qualified(qualified) else {
        let err = format!("malformed assigned tool '{qualified}' (expected 'tool_id__method')");
        tasks.fail(subtask.id, err.clone()).await?;
        return Ok(SubtaskOutcome { step: None, agent_signalled_summary: None, failed: true });
    };

    let schema = tools
        .schemas()
        .into_iter()
        .find(|s| s.qualified_name() == *qualified);
    let Some(schema) = schema else {
        let err = format!("no schema registered for tool '{qualified}'");
        tasks.fail(subtask.id, err.clone()).await?;
        return Ok(SubtaskOutcome { step: None, agent_signalled_summary: None, failed: true });
    };

    let params = match synthesize_params(provider, main, subtask, &schema).await {
        Ok(p) => p,
        Err(e) => {
            tasks.fail(subtask.id, e.to_string()).await?;
            return Ok(SubtaskOutcome { step: None, agent_signalled_summary: None, failed: true });
        }
    };

    let tool_call_id = Uuid::new_v4();
    sink.emit(ResponseEvent::tool_started(
        thread_run_id,
        tool_call_id,
        serde_json::json!({"tool": qualified, "params": params}),
    ))
    .await?;

    let result = tools.invoke(tool_id, method, params).await;

    sink.emit(ResponseEvent::ToolResult {
        tool_call_id,
        content: serde_json::json!({"output": result.output, "error": result.error}),
        metadata: sa_domain::response::EventMetadata::new(thread_run_id),
    })
    .await?;

    if !result.is_success() {
        let outcome_content = serde_json::json!({"status": "failed", "error": result.error});
        sink.emit(ResponseEvent::tool_outcome(thread_run_id, tool_call_id, outcome_content)).await?;
        sink.emit(ResponseEvent::assistant_message_update(
            thread_run_id,
            serde_json::json!({"text": format!("Step {step_index} of {total}: failed")}),
        ))
        .await?;
        let err = result.error.unwrap_or_else(|| "tool call failed".to_string());
        tasks.fail(subtask.id, err.clone()).await?;
        return Ok(SubtaskOutcome { step: None, agent_signalled_summary: None, failed: true });
    }

    let outcome_content = serde_json::json!({"status": "completed", "output": result.output});
    sink.emit(ResponseEvent::tool_outcome(thread_run_id, tool_call_id, outcome_content)).await?;
    sink.emit(ResponseEvent::assistant_message_update(
        thread_run_id,
        serde_json::json!({"text": format!("Step {step_index} of {total}: completed")}),
    ))
    .await?;

    let output = result.output.clone().unwrap_or(serde_json::Value::Null);
    tasks.complete(subtask.id, output.clone()).await?;

    if tool_id == sa_tools::complete_task::TOOL_ID && method == sa_tools::complete_task::METHOD {
        let summary = output
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("task completed")
            .to_string();
        return Ok(SubtaskOutcome {
            step: Some(StepResult { step_name: subtask.name.clone(), tool_used: Some(qualified.clone()), result: output }),
            agent_signalled_summary: Some(summary),
            failed: false,
        });
    }

    Ok(SubtaskOutcome {
        step: Some(StepResult { step_name: subtask.name.clone(), tool_used: Some(qualified.clone()), result: output }),
        agent_signalled_summary: None,
        failed: false,
    })
}

/// Up to `MAX_PARAM_SYNTHESIS_ATTEMPTS` LLM calls asking for this tool's
/// JSON parameters, each one reminded more forcefully than the last that
/// the response must be JSON and nothing else.
async fn synthesize_params(
    provider: &dyn LlmProvider,
    main: &Task,
    subtask: &Task,
    schema: &ToolSchema,
) -> Result<serde_json::Value> {
    let goal = main.description.as_deref().unwrap_or(&main.name);
    let subtask_desc = subtask.description.as_deref().unwrap_or(&subtask.name);

    let system = format!(
        "You are generating parameters for a single tool call in service of a larger goal.\n\
         Overall goal: {goal}\n\
         Current subtask: {subtask_desc}\n\
         Tool: {} — {}\n\
         Parameter schema: {}\n\
         Respond with a JSON object of parameters only (use `{{}}` if the tool takes none). \
         No prose, no markdown fences.",
        schema.qualified_name(),
        schema.description,
        schema.parameters,
    );

    let mut messages = vec![Message::system(system.clone()), Message::user(subtask_desc.to_string())];
    let mut last_raw = String::new();

    for attempt in 0..MAX_PARAM_SYNTHESIS_ATTEMPTS {
        if attempt > 0 {
            messages.push(Message::system(
                "Reminder: respond with a bare JSON object only, no other text.".to_string(),
            ));
        }

        let req = ChatRequest { messages: messages.clone(), json_mode: true, ..Default::default() };
        let response = provider.chat(req).await?;
        last_raw = response.content.clone();

        match serde_json::from_str::<serde_json::Value>(&response.content) {
            Ok(v @ serde_json::Value::Object(_)) => return Ok(v),
            Ok(_) | Err(_) => {
                messages.push(Message::assistant(response.content));
                continue;
            }
        }
    }

    Err(Error::ToolFailed {
        tool_id: schema.tool_id.clone(),
        message: format!("parameter synthesis did not produce a JSON object after {MAX_PARAM_SYNTHESIS_ATTEMPTS} attempts; last output: {last_raw}"),
    })
}

fn build_summary(outcome: &PlanOutcome, agent_summary: Option<&str>, steps: &[StepResult]) -> String {
    if outcome.stopped {
        return "Run stopped before the plan finished executing.".to_string();
    }

    let listing = steps
        .iter()
        .map(|s| {
            let result_str = s.result.to_string();
            let truncated: String = result_str.chars().take(STEP_SUMMARY_TRUNCATE).collect();
            format!(
                "- {} ({}): {truncated}",
                s.step_name,
                s.tool_used.as_deref().unwrap_or("no tool")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    if let Some(summary) = agent_summary {
        return format!("{summary}\n\n{listing}");
    }
    if outcome.plan_failed {
        return format!("Plan execution failed after {} completed step(s).\n{listing}", steps.len());
    }
    format!("All subtasks processed.\n{listing}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, tool: Option<&str>, result: serde_json::Value) -> StepResult {
        StepResult { step_name: name.to_string(), tool_used: tool.map(str::to_string), result }
    }

    #[test]
    fn stopped_summary_ignores_steps_and_agent_summary() {
        let outcome = PlanOutcome { stopped: true, ..Default::default() };
        let steps = vec![step("echo", Some("exec__run"), serde_json::json!({"stdout": "hi"}))];
        let summary = build_summary(&outcome, Some("would have said this"), &steps);
        assert_eq!(summary, "Run stopped before the plan finished executing.");
    }

    #[test]
    fn agent_signalled_summary_is_prefixed_to_the_step_listing() {
        let outcome = PlanOutcome { agent_signalled_completion: true, ..Default::default() };
        let steps = vec![step("echo", Some("exec__run"), serde_json::json!({"stdout": "hi"}))];
        let summary = build_summary(&outcome, Some("All done, found nothing unusual."), &steps);
        assert!(summary.starts_with("All done, found nothing unusual.\n\n"));
        assert!(summary.contains("echo (exec__run)"));
    }

    #[test]
    fn failed_summary_reports_completed_step_count() {
        let outcome = PlanOutcome { plan_failed: true, ..Default::default() };
        let steps = vec![
            step("a", Some("exec__run"), serde_json::json!({})),
            step("b", Some("exec__run"), serde_json::json!({})),
        ];
        let summary = build_summary(&outcome, None, &steps);
        assert!(summary.starts_with("Plan execution failed after 2 completed step(s)."));
    }

    #[test]
    fn successful_summary_lists_every_step_with_its_tool() {
        let outcome = PlanOutcome::default();
        let steps = vec![step("only-step", None, serde_json::json!({"ok": true}))];
        let summary = build_summary(&outcome, None, &steps);
        assert!(summary.starts_with("All subtasks processed."));
        assert!(summary.contains("only-step (no tool)"));
    }

    #[test]
    fn step_result_is_truncated_in_the_summary() {
        let outcome = PlanOutcome::default();
        let huge = serde_json::json!({"stdout": "x".repeat(STEP_SUMMARY_TRUNCATE * 2)});
        let steps = vec![step("big", Some("exec__run"), huge)];
        let summary = build_summary(&outcome, None, &steps);
        let line = summary.lines().nth(1).unwrap();
        // `- big (exec__run): ` plus at most STEP_SUMMARY_TRUNCATE chars of the result.
        assert!(line.len() <= "- big (exec__run): ".len() + STEP_SUMMARY_TRUNCATE);
    }
}
