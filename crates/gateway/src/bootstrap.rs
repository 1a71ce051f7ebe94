//! `AppState` construction: connects every collaborator named in spec §4.7
//! and wires the in-process job broker around it.

use std::sync::Arc;

use anyhow::Context;
use sa_domain::config::{Config, ConfigSeverity, RegistryBackend as RegistryBackendKind};
use sa_executor::ExecutorConfig;
use sa_providers::registry::ProviderRegistry;
use sa_registry::{MemoryBackend, RedisBackend};
use sa_store::Store;
use sa_tasks::TaskManager;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::runtime::broker::JobQueue;
use crate::state::AppState;

/// Validate config, connect every subsystem, and return a fully-wired
/// [`AppState`] with its job broker already running.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let store = Arc::new(Store::connect(&config.store).await.context("connecting to store")?);
    tracing::info!("store connected");

    let providers = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    if providers.is_empty() {
        tracing::warn!("no LLM providers initialized — runs will fail until one is configured");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    let registry: Arc<dyn sa_registry::RegistryBackend> = match config.registry.backend {
        RegistryBackendKind::Memory => {
            tracing::info!("run registry: in-memory backend");
            Arc::new(MemoryBackend::new())
        }
        RegistryBackendKind::Redis => {
            tracing::info!(url = %config.registry.redis_url, "run registry: redis backend");
            Arc::new(
                RedisBackend::connect(&config.registry.redis_url, config.registry.run_ttl_seconds)
                    .await
                    .context("connecting to redis registry backend")?,
            )
        }
    };

    let sandbox = sa_sandbox::build_provider(&config.sandbox);
    tracing::info!(provider = ?config.sandbox.provider, "sandbox provider ready");

    let tasks = Arc::new(TaskManager::new(store.clone()));
    let executor_config = Arc::new(ExecutorConfig {
        concurrent_subtasks: config.tasks.concurrent_subtasks,
    });

    let instance_id = format!("{}-{}", hostname(), Uuid::new_v4());
    tracing::info!(instance_id = %instance_id, "instance identity assigned");

    let state = AppState {
        config: config.clone(),
        store,
        providers,
        registry,
        sandbox,
        tasks,
        executor_config,
        instance_id,
        broker: Arc::new(OnceCell::new()),
    };

    let broker = JobQueue::spawn(state.clone(), config.tasks.broker_workers, config.tasks.broker_queue_capacity);
    state
        .broker
        .set(broker)
        .map_err(|_| anyhow::anyhow!("broker already installed"))?;
    tracing::info!(
        workers = config.tasks.broker_workers,
        capacity = config.tasks.broker_queue_capacity,
        "job broker ready"
    );

    Ok(state)
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "sa-gateway".to_string())
}
