use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: MessageContent::Parts(vec![ContentPart::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error: false,
            }]),
        }
    }
}

// ── Tool Orchestrator schema / result types ─────────────────────────

/// A tool's advertised schema, as handed to the planner and to the LLM
/// during parameter synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub tool_id: String,
    pub method: String,
    pub description: String,
    /// JSON Schema for this method's parameters.
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Qualified name used in plans and dependency references, e.g.
    /// `"exec__run"`.
    pub fn qualified_name(&self) -> String {
        format!("{}__{}", self.tool_id, self.method)
    }

    /// Split a qualified tool string (`"tool_id__method"`) into its parts.
    pub fn split_qualified(tool_string: &str) -> Option<(&str, &str)> {
        tool_string.split_once("__")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    /// Recorded the moment dispatch starts, before the tool has returned.
    Running,
    Success,
    Failed,
    /// The run was stopped while this tool call was in flight.
    Cancelled,
}

/// The outcome of a single tool invocation, uniform across every tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub execution_id: uuid::Uuid,
    pub tool_id: String,
    pub method: String,
    pub status: ToolResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    /// Placeholder recorded at dispatch time, before the tool call returns.
    pub fn running(execution_id: uuid::Uuid, tool_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            execution_id,
            tool_id: tool_id.into(),
            method: method.into(),
            status: ToolResultStatus::Running,
            output: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn success(tool_id: impl Into<String>, method: impl Into<String>, output: serde_json::Value, duration_ms: u64) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4(),
            tool_id: tool_id.into(),
            method: method.into(),
            status: ToolResultStatus::Success,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    pub fn failure(tool_id: impl Into<String>, method: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4(),
            tool_id: tool_id.into(),
            method: method.into(),
            status: ToolResultStatus::Failed,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    pub fn cancelled(tool_id: impl Into<String>, method: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4(),
            tool_id: tool_id.into(),
            method: method.into(),
            status: ToolResultStatus::Cancelled,
            output: None,
            error: Some("cancelled".into()),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ToolResultStatus::Success)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, ToolResultStatus::Running)
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Extract and join all text content, returning an owned String.
    ///
    /// For `Text` variant, returns the string directly.
    /// For `Parts` variant, joins all `Text` parts with `"\n"`.
    /// Non-text parts (ToolUse, ToolResult, Image) are skipped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_all_text_from_text_variant() {
        let content = MessageContent::Text("hello world".into());
        assert_eq!(content.extract_all_text(), "hello world");
    }

    #[test]
    fn extract_all_text_from_parts_joins_with_newline() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "line one".into() },
            ContentPart::ToolUse {
                id: "c1".into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
            ContentPart::Text { text: "line two".into() },
        ]);
        assert_eq!(content.extract_all_text(), "line one\nline two");
    }

    #[test]
    fn extract_all_text_empty_parts() {
        let content = MessageContent::Parts(vec![]);
        assert_eq!(content.extract_all_text(), "");
    }

    #[test]
    fn tool_schema_qualified_name_and_split_round_trip() {
        let schema = ToolSchema {
            tool_id: "exec".into(),
            method: "run".into(),
            description: "run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        assert_eq!(schema.qualified_name(), "exec__run");
        assert_eq!(
            ToolSchema::split_qualified("exec__run"),
            Some(("exec", "run"))
        );
    }

    #[test]
    fn split_qualified_rejects_missing_delimiter() {
        assert_eq!(ToolSchema::split_qualified("exec"), None);
    }

    #[test]
    fn tool_result_success_and_failure_helpers() {
        let ok = ToolResult::success("exec", "run", serde_json::json!({"stdout": "hi"}), 12);
        assert!(ok.is_success());
        assert!(ok.error.is_none());

        let err = ToolResult::failure("exec", "run", "boom", 3);
        assert!(!err.is_success());
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
