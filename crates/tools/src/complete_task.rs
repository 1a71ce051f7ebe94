//! The distinguished completion tool.
//!
//! Performs no external action. The plan executor looks for a successful
//! call to `SystemCompleteTask__task_complete` to end a run rather than
//! waiting for every subtask to reach `completed` on its own — the agent
//! declares the objective met, and the executor trusts that declaration.

use async_trait::async_trait;
use sa_domain::tool::ToolSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Tool;

pub const TOOL_ID: &str = "SystemCompleteTask";
pub const METHOD: &str = "task_complete";

#[derive(Debug, Deserialize)]
struct TaskCompleteParams {
    summary: String,
}

pub struct SystemCompleteTask;

#[async_trait]
impl Tool for SystemCompleteTask {
    fn tool_id(&self) -> &str {
        TOOL_ID
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            tool_id: TOOL_ID.into(),
            method: METHOD.into(),
            description: "Signal that the entire request has been completed. Call only once every objective has been met and verified; provide a final summary.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "A brief summary of how the task was completed and the final outcome."
                    }
                },
                "required": ["summary"],
            }),
        }]
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, String> {
        if method != METHOD {
            return Err(format!("unknown method '{method}' on tool '{TOOL_ID}'"));
        }
        let params: TaskCompleteParams =
            serde_json::from_value(params).map_err(|e| format!("invalid params: {e}"))?;

        tracing::info!(summary = %params.summary, "task marked complete by agent");

        Ok(serde_json::json!({
            "status": "success",
            "message": "task marked as complete by agent",
            "summary": params.summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_complete_echoes_summary() {
        let tool = SystemCompleteTask;
        let result = tool
            .call(METHOD, serde_json::json!({"summary": "done"}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["summary"], "done");
    }

    #[tokio::test]
    async fn rejects_unknown_method() {
        let tool = SystemCompleteTask;
        let result = tool
            .call("bogus", serde_json::json!({}), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_params() {
        let tool = SystemCompleteTask;
        let result = tool
            .call(METHOD, serde_json::json!({"wrong_field": 1}), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
