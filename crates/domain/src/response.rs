use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata carried by every response event. `thread_run_id` is mandatory;
/// everything else is event-specific and lives in `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    pub thread_run_id: Uuid,
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    pub fn new(thread_run_id: Uuid) -> Self {
        Self {
            thread_run_id,
            extra: serde_json::Map::new(),
        }
    }
}

/// Terminal and intermediate substatuses carried by a `status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Substatus {
    ThreadRunStart,
    AssistantResponseStart,
    Finish,
    ThreadRunEnd,
    Error,
    Completed,
    Failed,
    Stopped,
    PlanExecutionStart,
    PlanExecutionEnd,
}

impl Substatus {
    /// Whether this substatus, if observed in the Response Log, means the
    /// run has reached one of its terminal states.
    pub fn is_run_terminal(self) -> bool {
        matches!(self, Substatus::Completed | Substatus::Failed | Substatus::Stopped)
    }
}

/// One element of the append-only Response Log. Opaque to the log itself;
/// only terminal `Status` values are interpreted by the Control Plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseEvent {
    #[serde(rename = "assistant_text_chunk")]
    AssistantTextChunk {
        content: serde_json::Value,
        metadata: EventMetadata,
    },

    #[serde(rename = "tool_started")]
    ToolStarted {
        tool_call_id: Uuid,
        content: serde_json::Value,
        metadata: EventMetadata,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: Uuid,
        content: serde_json::Value,
        metadata: EventMetadata,
    },

    #[serde(rename = "tool_outcome")]
    ToolOutcome {
        tool_call_id: Uuid,
        content: serde_json::Value,
        metadata: EventMetadata,
    },

    #[serde(rename = "assistant_message_update")]
    AssistantMessageUpdate {
        content: serde_json::Value,
        metadata: EventMetadata,
    },

    #[serde(rename = "status")]
    Status {
        status: Substatus,
        content: serde_json::Value,
        metadata: EventMetadata,
    },
}

impl ResponseEvent {
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            ResponseEvent::AssistantTextChunk { metadata, .. }
            | ResponseEvent::ToolStarted { metadata, .. }
            | ResponseEvent::ToolResult { metadata, .. }
            | ResponseEvent::ToolOutcome { metadata, .. }
            | ResponseEvent::AssistantMessageUpdate { metadata, .. }
            | ResponseEvent::Status { metadata, .. } => metadata,
        }
    }

    /// The terminal run status this event carries, if any.
    pub fn terminal_status(&self) -> Option<Substatus> {
        match self {
            ResponseEvent::Status { status, .. } if status.is_run_terminal() => Some(*status),
            _ => None,
        }
    }

    pub fn status(thread_run_id: Uuid, status: Substatus, content: serde_json::Value) -> Self {
        ResponseEvent::Status {
            status,
            content,
            metadata: EventMetadata::new(thread_run_id),
        }
    }

    pub fn assistant_message_update(thread_run_id: Uuid, content: serde_json::Value) -> Self {
        ResponseEvent::AssistantMessageUpdate {
            content,
            metadata: EventMetadata::new(thread_run_id),
        }
    }

    pub fn tool_started(thread_run_id: Uuid, tool_call_id: Uuid, content: serde_json::Value) -> Self {
        ResponseEvent::ToolStarted {
            tool_call_id,
            content,
            metadata: EventMetadata::new(thread_run_id),
        }
    }

    /// A tool call's final outcome. `content` carries `{"status": "completed" |
    /// "failed", ...}` alongside the tool's own output/error — the executor
    /// doesn't need a dedicated `tool_completed`/`tool_failed` event type
    /// since the outcome is just another shape of this event's content.
    pub fn tool_outcome(thread_run_id: Uuid, tool_call_id: Uuid, content: serde_json::Value) -> Self {
        ResponseEvent::ToolOutcome {
            tool_call_id,
            content,
            metadata: EventMetadata::new(thread_run_id),
        }
    }
}
