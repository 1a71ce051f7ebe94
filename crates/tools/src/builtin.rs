//! `Tool`-trait adapters over the concrete exec/process/file-ops
//! implementations, so the orchestrator can dispatch to them uniformly
//! alongside `SystemCompleteTask`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::tool::ToolSchema;
use tokio_util::sync::CancellationToken;

use crate::exec::{self, ExecRequest};
use crate::file_ops::{self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest, FileReadRequest, FileWriteRequest};
use crate::manager::ProcessManager;
use crate::orchestrator::Tool;
use crate::process::{self, ProcessRequest};

fn params(fields: serde_json::Value) -> serde_json::Value {
    fields
}

/// Shell execution (§4.3 "representative tools"), grounded on
/// `sa-tools::exec`.
pub struct ExecTool {
    manager: Arc<ProcessManager>,
}

impl ExecTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn tool_id(&self) -> &str {
        "exec"
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            tool_id: "exec".into(),
            method: "run".into(),
            description: "Run a shell command, foreground or backgrounded after a yield timeout.".into(),
            parameters: params(serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "background": {"type": "boolean"},
                    "yield_ms": {"type": "integer"},
                    "timeout_sec": {"type": "integer"},
                    "workdir": {"type": "string"},
                },
                "required": ["command"],
            })),
        }]
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, String> {
        if method != "run" {
            return Err(format!("unknown method '{method}' on tool 'exec'"));
        }
        let req: ExecRequest = serde_json::from_value(params).map_err(|e| format!("invalid params: {e}"))?;
        let resp = exec::exec(&self.manager, req).await;
        serde_json::to_value(resp).map_err(|e| e.to_string())
    }
}

/// Background process session management, grounded on `sa-tools::process`.
pub struct ProcessTool {
    manager: Arc<ProcessManager>,
}

impl ProcessTool {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for ProcessTool {
    fn tool_id(&self) -> &str {
        "process"
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            tool_id: "process".into(),
            method: "manage".into(),
            description: "Inspect or control a background process session (list/poll/log/write/kill/clear/remove).".into(),
            parameters: params(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list","poll","log","write","kill","clear","remove"]},
                    "session_id": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"},
                    "tail_lines": {"type": "integer"},
                    "data": {"type": "string"},
                    "eof": {"type": "boolean"},
                },
                "required": ["action"],
            })),
        }]
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, String> {
        if method != "manage" {
            return Err(format!("unknown method '{method}' on tool 'process'"));
        }
        let req: ProcessRequest = serde_json::from_value(params).map_err(|e| format!("invalid params: {e}"))?;
        let resp = process::handle_process(&self.manager, req).await;
        if resp.success {
            Ok(serde_json::to_value(resp).map_err(|e| e.to_string())?)
        } else {
            Err(resp.error.unwrap_or_else(|| "process action failed".into()))
        }
    }
}

/// Workspace-scoped file I/O, grounded on `sa-tools::file_ops`
/// (generalizing `sb_files_tool.py`).
pub struct FileOpsTool {
    workspace_root: PathBuf,
}

impl FileOpsTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for FileOpsTool {
    fn tool_id(&self) -> &str {
        "file_ops"
    }

    fn schemas(&self) -> Vec<ToolSchema> {
        let path_params = |extra: serde_json::Value| {
            let mut obj = serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]});
            if let (Some(props), serde_json::Value::Object(extra_props)) = (obj.get_mut("properties"), &extra) {
                if let serde_json::Value::Object(map) = props {
                    for (k, v) in extra_props {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }
            obj
        };

        vec![
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "read".into(),
                description: "Read a file within the workspace.".into(),
                parameters: path_params(serde_json::json!({"offset": {"type": "integer"}, "limit": {"type": "integer"}})),
            },
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "write".into(),
                description: "Write (overwrite) a file within the workspace.".into(),
                parameters: path_params(serde_json::json!({"content": {"type": "string"}})),
            },
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "append".into(),
                description: "Append to a file within the workspace.".into(),
                parameters: path_params(serde_json::json!({"content": {"type": "string"}})),
            },
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "move".into(),
                description: "Move/rename a file within the workspace.".into(),
                parameters: serde_json::json!({"type": "object", "properties": {"source": {"type": "string"}, "destination": {"type": "string"}}, "required": ["source", "destination"]}),
            },
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "delete".into(),
                description: "Delete a file within the workspace.".into(),
                parameters: path_params(serde_json::json!({})),
            },
            ToolSchema {
                tool_id: "file_ops".into(),
                method: "list".into(),
                description: "List a directory within the workspace.".into(),
                parameters: path_params(serde_json::json!({})),
            },
        ]
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        _cancel: CancellationToken,
    ) -> Result<serde_json::Value, String> {
        match method {
            "read" => {
                let req: FileReadRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_read(&self.workspace_root, req).await
            }
            "write" => {
                let req: FileWriteRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_write(&self.workspace_root, req).await
            }
            "append" => {
                let req: FileAppendRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_append(&self.workspace_root, req).await
            }
            "move" => {
                let req: FileMoveRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_move(&self.workspace_root, req).await
            }
            "delete" => {
                let req: FileDeleteRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_delete(&self.workspace_root, req).await
            }
            "list" => {
                let req: FileListRequest = serde_json::from_value(params).map_err(|e| e.to_string())?;
                file_ops::file_list(&self.workspace_root, req).await
            }
            other => Err(format!("unknown method '{other}' on tool 'file_ops'")),
        }
    }
}
