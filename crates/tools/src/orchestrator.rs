//! Tool Orchestrator — a uniform registry/dispatch layer over concrete tools.
//!
//! Generalizes the name-matched dispatch pattern used by the gateway's
//! `runtime/tools.rs` (one central switch over tool names, delegating to a
//! per-tool handler), but produces a structured [`ToolResult`] instead of a
//! raw content/is_error pair, and tracks each in-flight call by
//! `execution_id` so a run can cancel one call without tearing down the
//! others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::tool::{ToolResult, ToolSchema};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A single registered tool, exposing one or more methods.
///
/// `call` receives a `CancellationToken` rather than a plain future timeout:
/// cooperative cancellation is this system's stop mechanism, and a tool that
/// ignores the token is simply cancelled at its next await point instead of
/// mid-instruction.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier this tool registers under (`ToolSchema::tool_id`).
    fn tool_id(&self) -> &str;

    /// Schemas for every method this tool exposes.
    fn schemas(&self) -> Vec<ToolSchema>;

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, String>;
}

struct Execution {
    cancel: CancellationToken,
}

/// Registry + dispatcher for every `Tool` a run can call.
pub struct ToolOrchestrator {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    executions: RwLock<HashMap<Uuid, Execution>>,
}

impl Default for ToolOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolOrchestrator {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool, overwriting any previous registration under the
    /// same id.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let id = tool.tool_id().to_string();
        if self.tools.read().contains_key(&id) {
            tracing::warn!(tool_id = %id, "tool already registered, overwriting");
        }
        self.tools.write().insert(id.clone(), tool);
        tracing::info!(tool_id = %id, "tool registered");
    }

    /// Re-register a tool under its existing id. A maintenance operation —
    /// not meant to run on the hot path of a plan execution.
    pub fn reload(&self, tool: Arc<dyn Tool>) {
        self.register(tool);
    }

    pub fn unregister(&self, tool_id: &str) -> bool {
        self.tools.write().remove(tool_id).is_some()
    }

    /// Schemas for every method of every registered tool, keyed for the
    /// planner and for parameter-synthesis prompts via
    /// `ToolSchema::qualified_name`.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.read().values().flat_map(|t| t.schemas()).collect()
    }

    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Invoke one method of a registered tool, mapping any error the tool
    /// returns to a `failed` result rather than propagating it — a single
    /// misbehaving tool must not take down the executor's loop.
    pub async fn invoke(&self, tool_id: &str, method: &str, params: serde_json::Value) -> ToolResult {
        let execution_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.executions
            .write()
            .insert(execution_id, Execution { cancel: cancel.clone() });

        let tool = self.tools.read().get(tool_id).cloned();
        let start = Instant::now();

        let Some(tool) = tool else {
            self.executions.write().remove(&execution_id);
            let mut r = ToolResult::failure(tool_id, method, format!("tool '{tool_id}' not registered"), 0);
            r.execution_id = execution_id;
            return r;
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tool.call(method, params, cancel.clone()) => Some(result),
        };

        self.executions.write().remove(&execution_id);
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut result = match outcome {
            None => ToolResult::cancelled(tool_id, method, duration_ms),
            Some(Ok(output)) => ToolResult::success(tool_id, method, output, duration_ms),
            Some(Err(e)) => ToolResult::failure(tool_id, method, e, duration_ms),
        };
        result.execution_id = execution_id;
        result
    }

    /// Cancel an in-flight call by its execution id. Returns `false` if the
    /// call already finished or no such execution is tracked.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.executions.read().get(&execution_id) {
            Some(exec) => {
                exec.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn tool_id(&self) -> &str {
            "echo"
        }

        fn schemas(&self) -> Vec<ToolSchema> {
            vec![ToolSchema {
                tool_id: "echo".into(),
                method: "say".into(),
                description: "echo back the input".into(),
                parameters: serde_json::json!({"type": "object"}),
            }]
        }

        async fn call(
            &self,
            method: &str,
            params: serde_json::Value,
            _cancel: CancellationToken,
        ) -> Result<serde_json::Value, String> {
            match method {
                "say" => Ok(params),
                "boom" => Err("boom requested".into()),
                other => Err(format!("unknown method '{other}'")),
            }
        }
    }

    #[tokio::test]
    async fn invoke_dispatches_by_tool_id_and_method() {
        let orch = ToolOrchestrator::new();
        orch.register(Arc::new(EchoTool));
        let result = orch.invoke("echo", "say", serde_json::json!({"x": 1})).await;
        assert!(result.is_success());
        assert_eq!(result.output.unwrap()["x"], 1);
    }

    #[tokio::test]
    async fn invoke_unknown_tool_fails_without_panicking() {
        let orch = ToolOrchestrator::new();
        let result = orch.invoke("nope", "say", serde_json::json!({})).await;
        assert!(!result.is_success());
        assert!(result.is_terminal());
    }

    #[tokio::test]
    async fn invoke_propagates_tool_error_as_failed_result() {
        let orch = ToolOrchestrator::new();
        orch.register(Arc::new(EchoTool));
        let result = orch.invoke("echo", "boom", serde_json::json!({})).await;
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("boom requested"));
    }

    #[tokio::test]
    async fn reload_overwrites_existing_registration() {
        let orch = ToolOrchestrator::new();
        orch.register(Arc::new(EchoTool));
        orch.reload(Arc::new(EchoTool));
        assert_eq!(orch.tool_ids(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn schemas_collects_across_all_registered_tools() {
        let orch = ToolOrchestrator::new();
        orch.register(Arc::new(EchoTool));
        let schemas = orch.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].qualified_name(), "echo__say");
    }
}
