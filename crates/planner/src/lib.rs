//! Task Planner (spec §4.5) — one LLM call turning a run's prompt into a
//! main task plus a validated subtask DAG.
//!
//! Grounded on `agentpress/tool_orchestrator.py`'s schema catalog shape
//! (`tool_id__method` qualified names) and `agentpress/plan_executor.py`'s
//! expectations of the subtask records it consumes (`assigned_tools`,
//! `dependencies` resolved to sibling task ids before execution starts).

use std::collections::HashSet;

use sa_domain::error::{Error, Result};
use sa_domain::task::Task;
use sa_domain::tool::ToolSchema;
use sa_providers::traits::{ChatRequest, LlmProvider};
use sa_tools::orchestrator::ToolOrchestrator;
use sa_tasks::TaskManager;
use serde::Deserialize;
use uuid::Uuid;

/// Raw shape the planning LLM call is asked to return. Dependencies are
/// expressed as indices into `subtasks`, not ids — the model cannot know
/// the ids we'll assign, and restricting it to indices is what makes the
/// "earlier-sibling-only" acyclicity check a simple integer comparison.
#[derive(Debug, Deserialize)]
struct LlmPlanResponse {
    subtasks: Vec<LlmSubtask>,
}

#[derive(Debug, Deserialize)]
struct LlmSubtask {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assigned_tools: Vec<String>,
    #[serde(default)]
    dependencies: Vec<usize>,
}

/// Plan a run: create the main task, call the LLM once for a subtask DAG,
/// validate it, and materialize the subtasks. On any validation failure
/// the main task is left in `planning_failed` with the failure recorded
/// in `error`, and this function returns `Err(Error::PlanningFailed)`.
pub async fn plan_task(
    tasks: &TaskManager,
    tools: &ToolOrchestrator,
    provider: &dyn LlmProvider,
    run_id: Uuid,
    prompt: &str,
) -> Result<Task> {
    let main = tasks
        .create(Task::new_main(run_id, summarize(prompt)))
        .await?;
    tasks
        .update(main.id, |t| t.status = sa_domain::task::TaskStatus::PendingPlanning)
        .await?;

    let schemas = tools.schemas();
    let result = request_plan(provider, prompt, &schemas).await;

    let raw = match result {
        Ok(raw) => raw,
        Err(e) => {
            tasks.fail(main.id, e.to_string()).await?;
            return Err(Error::PlanningFailed(e.to_string()));
        }
    };

    match validate_plan(&raw, &schemas) {
        Ok(()) => {}
        Err(reason) => {
            tasks.fail(main.id, reason.clone()).await?;
            return Err(Error::PlanningFailed(reason));
        }
    }

    let mut subtask_ids = Vec::with_capacity(raw.subtasks.len());
    for llm_subtask in &raw.subtasks {
        let mut subtask = Task::new_subtask(run_id, main.id, llm_subtask.name.clone());
        subtask.description = llm_subtask.description.clone();
        subtask.assigned_tools = llm_subtask.assigned_tools.clone();
        subtask.dependencies = llm_subtask
            .dependencies
            .iter()
            .map(|&idx| subtask_ids[idx])
            .collect();
        // `create` appends the new subtask's id to `main.subtasks` itself.
        let created = tasks.create(subtask).await?;
        subtask_ids.push(created.id);
    }

    let planned = tasks
        .update(main.id, |t| t.status = sa_domain::task::TaskStatus::Planned)
        .await?;
    Ok(planned)
}

async fn request_plan(
    provider: &dyn LlmProvider,
    prompt: &str,
    schemas: &[ToolSchema],
) -> Result<LlmPlanResponse> {
    let catalog = schemas
        .iter()
        .map(|s| {
            format!(
                "- {} :: {}\n  parameters: {}",
                s.qualified_name(),
                s.description,
                s.parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are a task planner. Given a user's goal and a catalog of available tools, \
         decompose the goal into an ordered list of subtasks. Respond with JSON only, of the \
         exact shape {{\"subtasks\": [{{\"name\": str, \"description\": str, \
         \"assigned_tools\": [str], \"dependencies\": [int]}}]}}. `assigned_tools` entries \
         must be taken verbatim from the catalog below, or left empty if the subtask needs no \
         tool call. `dependencies` are 0-based indices into this same subtasks array, and may \
         only reference subtasks earlier in the array.\n\nAvailable tools:\n{catalog}"
    );

    let req = ChatRequest {
        messages: vec![
            sa_domain::tool::Message::system(system),
            sa_domain::tool::Message::user(prompt.to_string()),
        ],
        json_mode: true,
        ..Default::default()
    };

    let response = provider.chat(req).await?;
    serde_json::from_str(&response.content)
        .map_err(|e| Error::PlanningFailed(format!("unparseable plan response: {e}")))
}

/// Schema membership, earlier-sibling-only dependency indices, and a
/// non-empty subtask list. Acyclicity falls out of the index-range check:
/// a dependency can only point backward, so no cycle is expressible.
fn validate_plan(plan: &LlmPlanResponse, schemas: &[ToolSchema]) -> std::result::Result<(), String> {
    if plan.subtasks.is_empty() {
        return Err("plan contains no subtasks".to_string());
    }

    let known: HashSet<String> = schemas.iter().map(ToolSchema::qualified_name).collect();

    for (idx, subtask) in plan.subtasks.iter().enumerate() {
        for tool_name in &subtask.assigned_tools {
            if !known.contains(tool_name) {
                return Err(format!(
                    "subtask {idx} ('{}') assigned unknown tool '{tool_name}'",
                    subtask.name
                ));
            }
        }
        for &dep in &subtask.dependencies {
            if dep >= idx {
                return Err(format!(
                    "subtask {idx} ('{}') depends on non-earlier index {dep}",
                    subtask.name
                ));
            }
        }
    }
    Ok(())
}

fn summarize(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.len() <= 80 {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..80])
    }
}
