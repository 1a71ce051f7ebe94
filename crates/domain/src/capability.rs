use serde::{Deserialize, Serialize};

/// How strictly a provider supports structured tool-calling. Used by the
/// parameter-synthesis step to decide whether it can lean on the
/// provider's native tool-call machinery or must fall back to JSON-mode
/// prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSupport {
    /// No tool-calling support at all.
    None,
    /// Tool calls are supported but argument JSON isn't schema-validated
    /// by the provider.
    Basic,
    /// Provider enforces the JSON schema on tool-call arguments.
    StrictJson,
}

/// The advertised capabilities of one provider/model combination (the
/// `complete(messages, model, options) -> response` collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: ToolSupport,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub supports_vision: bool,
    pub context_window_tokens: Option<u32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        Self {
            supports_tools: ToolSupport::None,
            supports_streaming: false,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        }
    }
}
