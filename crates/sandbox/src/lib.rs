//! The sandbox-provider collaborator (spec §1, §4.7).
//!
//! A sandbox is the per-project execution environment the Plan Executor's
//! tools run against. This crate defines the uniform [`SandboxProvider`]
//! trait and two implementations: a local subprocess sandbox for tests and
//! single-host deployments, and a remote-node sandbox dialed over
//! websocket for fleet deployments.

pub mod local;
pub mod provider;
pub mod remote;

pub use local::LocalSandboxProvider;
pub use provider::{ExecOutcome, ExecSpec, SandboxProvider};
pub use remote::RemoteNodeSandboxProvider;

use std::sync::Arc;

use sa_domain::config::{SandboxConfig, SandboxProviderKind};

/// Build the configured [`SandboxProvider`] implementation.
pub fn build_provider(config: &SandboxConfig) -> Arc<dyn SandboxProvider> {
    match config.provider {
        SandboxProviderKind::Local => Arc::new(LocalSandboxProvider::new(config.clone())),
        SandboxProviderKind::RemoteNode => Arc::new(RemoteNodeSandboxProvider::new(config.clone())),
    }
}
