//! Local subprocess sandbox: each project gets a temp directory standing in
//! for `/workspace`, and commands run via `sh -c` under it. Grounded on
//! `sa-tools::exec`'s spawn/capture/timeout idiom, generalized from a
//! single ad-hoc command to a project-scoped, reusable sandbox.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sa_domain::config::SandboxConfig;
use sa_domain::error::{Error, Result};
use sa_protocol::MAX_EXEC_RESPONSE_BYTES;
use sa_store::projects::SandboxInfo;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::provider::{ExecOutcome, ExecSpec, SandboxProvider};

struct LocalSandbox {
    dir: TempDir,
}

pub struct LocalSandboxProvider {
    config: SandboxConfig,
    sandboxes: Mutex<HashMap<String, Arc<LocalSandbox>>>,
}

impl LocalSandboxProvider {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            sandboxes: Mutex::new(HashMap::new()),
        }
    }

    fn provision(&self) -> Result<SandboxInfo> {
        let dir = TempDir::new().map_err(|e| Error::Sandbox(format!("create workspace: {e}")))?;
        let sandbox_id = Uuid::new_v4().to_string();
        let path = dir.path().to_path_buf();
        self.sandboxes
            .lock()
            .insert(sandbox_id.clone(), Arc::new(LocalSandbox { dir }));

        Ok(SandboxInfo {
            id: sandbox_id,
            pass: None,
            vnc_preview: None,
            sandbox_url: Some(format!("file://{}", path.display())),
            token: None,
            is_local: true,
        })
    }

    fn workdir(&self, sandbox_id: &str) -> Option<PathBuf> {
        self.sandboxes
            .lock()
            .get(sandbox_id)
            .map(|s| s.dir.path().to_path_buf())
    }
}

#[async_trait]
impl SandboxProvider for LocalSandboxProvider {
    async fn create(&self, _project_id: Uuid) -> Result<SandboxInfo> {
        self.provision()
    }

    async fn get_or_start(&self, _project_id: Uuid, existing: Option<SandboxInfo>) -> Result<SandboxInfo> {
        if let Some(info) = existing {
            if info.is_local && self.workdir(&info.id).is_some() {
                return Ok(info);
            }
        }
        self.provision()
    }

    async fn exec(&self, sandbox: &SandboxInfo, spec: ExecSpec) -> Result<ExecOutcome> {
        let base = self
            .workdir(&sandbox.id)
            .ok_or_else(|| Error::Sandbox(format!("no such local sandbox: {}", sandbox.id)))?;
        let cwd = match &spec.workdir {
            Some(w) if PathBuf::from(w).is_absolute() => PathBuf::from(w),
            Some(w) => base.join(w),
            None => base,
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&spec.command)
            .current_dir(&cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Sandbox(format!("spawn: {e}")))?;
        let mut stdout_pipe = child.stdout.take().expect("piped stdout");
        let mut stderr_pipe = child.stderr.take().expect("piped stderr");

        let timeout = std::time::Duration::from_secs(spec.timeout_sec);
        let run = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let (a, b, status) = tokio::join!(
                stdout_pipe.read_to_end(&mut stdout),
                stderr_pipe.read_to_end(&mut stderr),
                child.wait(),
            );
            a.ok();
            b.ok();
            (stdout, stderr, status)
        };

        match tokio::time::timeout(timeout, run).await {
            Ok((stdout, stderr, status)) => {
                let status = status.map_err(|e| Error::Sandbox(format!("wait: {e}")))?;
                let (stdout, truncated_out) = truncate(stdout);
                let (stderr, truncated_err) = truncate(stderr);
                Ok(ExecOutcome {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    truncated: truncated_out || truncated_err,
                })
            }
            Err(_) => {
                let _ = child.start_kill();
                Err(Error::Timeout(format!(
                    "sandbox command exceeded {}s",
                    spec.timeout_sec
                )))
            }
        }
    }

    async fn stop(&self, sandbox: &SandboxInfo) -> Result<()> {
        if let Some(dir) = self.workdir(&sandbox.id) {
            for cmd in &self.config.cleanup_commands {
                let output = Command::new("sh").arg("-c").arg(cmd).current_dir(&dir).output().await;
                match output {
                    Ok(o) if !o.status.success() => {
                        tracing::warn!(sandbox_id = %sandbox.id, command = %cmd, code = ?o.status.code(), "cleanup command failed");
                    }
                    Err(e) => {
                        tracing::warn!(sandbox_id = %sandbox.id, command = %cmd, error = %e, "cleanup command failed to spawn");
                    }
                    _ => {}
                }
            }
        }
        self.sandboxes.lock().remove(&sandbox.id);
        Ok(())
    }
}

fn truncate(mut bytes: Vec<u8>) -> (String, bool) {
    let truncated = bytes.len() > MAX_EXEC_RESPONSE_BYTES;
    if truncated {
        bytes.truncate(MAX_EXEC_RESPONSE_BYTES);
    }
    (String::from_utf8_lossy(&bytes).into_owned(), truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_exec_roundtrip() {
        let provider = LocalSandboxProvider::new(SandboxConfig::default());
        let info = provider.create(Uuid::new_v4()).await.unwrap();
        assert!(info.is_local);

        let outcome = provider
            .exec(
                &info,
                ExecSpec {
                    command: "echo hello".into(),
                    workdir: None,
                    timeout_sec: 10,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn exec_on_unknown_sandbox_errors() {
        let provider = LocalSandboxProvider::new(SandboxConfig::default());
        let bogus = SandboxInfo {
            id: "does-not-exist".into(),
            is_local: true,
            ..Default::default()
        };
        let result = provider
            .exec(
                &bogus,
                ExecSpec {
                    command: "echo hi".into(),
                    workdir: None,
                    timeout_sec: 5,
                },
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_or_start_reuses_existing() {
        let provider = LocalSandboxProvider::new(SandboxConfig::default());
        let project_id = Uuid::new_v4();
        let first = provider.create(project_id).await.unwrap();
        let second = provider
            .get_or_start(project_id, Some(first.clone()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn timeout_kills_long_running_command() {
        let provider = LocalSandboxProvider::new(SandboxConfig::default());
        let info = provider.create(Uuid::new_v4()).await.unwrap();
        let result = provider
            .exec(
                &info,
                ExecSpec {
                    command: "sleep 5".into(),
                    workdir: None,
                    timeout_sec: 1,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn stop_removes_sandbox() {
        let provider = LocalSandboxProvider::new(SandboxConfig::default());
        let info = provider.create(Uuid::new_v4()).await.unwrap();
        provider.stop(&info).await.unwrap();
        let result = provider
            .exec(
                &info,
                ExecSpec {
                    command: "echo hi".into(),
                    workdir: None,
                    timeout_sec: 5,
                },
            )
            .await;
        assert!(result.is_err());
    }
}
