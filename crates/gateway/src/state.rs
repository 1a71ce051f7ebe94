use std::sync::Arc;

use sa_domain::config::Config;
use sa_executor::ExecutorConfig;
use sa_providers::registry::ProviderRegistry;
use sa_providers::traits::LlmProvider;
use sa_registry::RegistryBackend;
use sa_sandbox::SandboxProvider;
use sa_store::Store;
use sa_tasks::TaskManager;
use sa_tools::ToolOrchestrator;
use tokio::sync::OnceCell;

use crate::runtime::broker::JobQueue;

/// Shared application state passed to all API handlers and to the
/// background Run Coordinator.
///
/// Fields are grouped by concern:
/// - **Core services** — config, persistence, LLM providers
/// - **Run lifecycle collaborators** — registry, sandbox, tools, tasks
/// - **Identity & dispatch** — this instance's id, the job broker
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub providers: Arc<ProviderRegistry>,

    // ── Run lifecycle collaborators ─────────────────────────────────────
    pub registry: Arc<dyn RegistryBackend>,
    pub sandbox: Arc<dyn SandboxProvider>,
    pub tasks: Arc<TaskManager>,
    pub executor_config: Arc<ExecutorConfig>,

    // ── Identity & dispatch ──────────────────────────────────────────────
    /// Identifies this worker process in the Run Registry's
    /// `active_run:{instance}:{run_id}` keys.
    pub instance_id: String,
    /// The in-process job broker. Set once by `bootstrap::build_app_state`
    /// after construction, since the broker's workers hold a clone of this
    /// very state.
    pub broker: Arc<OnceCell<JobQueue>>,
}

impl AppState {
    /// The single configured default LLM provider (§4.8 model resolution
    /// assumes one server-wide provider list, first entry wins when a
    /// caller doesn't disambiguate by provider id).
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.config
            .llm
            .providers
            .first()
            .and_then(|pc| self.providers.get(&pc.id))
    }

    pub fn broker(&self) -> &JobQueue {
        self.broker
            .get()
            .expect("broker must be installed by bootstrap before serving requests")
    }
}
