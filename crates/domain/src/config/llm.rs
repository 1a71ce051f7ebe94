use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider (the "complete" collaborator, §1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_20000u")]
    pub default_timeout_ms: u64,
    /// Max total attempts for per-subtask parameter synthesis (§4.6: "up
    /// to 3 total attempts").
    #[serde(default = "d_3")]
    pub max_param_synthesis_attempts: u32,
    /// Server-wide model override. When set alongside `local_base_url`,
    /// it takes precedence over the caller's requested model (§4.8
    /// `start` resolution chain).
    #[serde(default)]
    pub server_model_override: Option<String>,
    #[serde(default)]
    pub local_base_url: Option<String>,
    /// Fallback model when neither the override nor the caller supplied one.
    #[serde(default = "d_default_model")]
    pub default_model: String,
    /// `alias -> concrete model string` rewriting applied after resolution.
    #[serde(default)]
    pub model_aliases: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 20_000,
            max_param_synthesis_attempts: 3,
            server_model_override: None,
            local_base_url: None,
            default_model: d_default_model(),
            model_aliases: std::collections::HashMap::new(),
            providers: Vec::new(),
        }
    }
}

impl LlmConfig {
    /// Resolve the effective model name per §4.8 `start`: server-wide
    /// override (only meaningful with a local provider configured) beats
    /// the caller's choice, which beats the server default; an alias is
    /// then rewritten to its concrete target.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        let chosen = if self.local_base_url.is_some() {
            self.server_model_override
                .clone()
                .or_else(|| requested.map(str::to_string))
                .unwrap_or_else(|| self.default_model.clone())
        } else {
            requested
                .map(str::to_string)
                .unwrap_or_else(|| self.default_model.clone())
        };
        self.model_aliases.get(&chosen).cloned().unwrap_or(chosen)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompat,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    None,
}

fn d_20000u() -> u64 {
    20_000
}
fn d_3() -> u32 {
    3
}
fn d_default_model() -> String {
    "gpt-4o-mini".into()
}
