//! Remote-node sandbox provider: dispatches `exec`/`stop` over a websocket
//! to a sandbox node, generalized from `sa-node-sdk`'s reconnect/dispatch
//! idiom (macOS sidecar → per-project sandbox container), with the
//! per-connection bookkeeping folded in here instead of a separate
//! registry module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use sa_domain::config::SandboxConfig;
use sa_domain::error::{Error, Result};
use sa_protocol::{ProtocolError, SandboxWsMessage, PROTOCOL_VERSION};
use sa_store::projects::SandboxInfo;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::provider::{ExecOutcome, ExecSpec, SandboxProvider};

type Pending = Arc<parking_lot::Mutex<HashMap<String, oneshot::Sender<SandboxWsMessage>>>>;

struct RemoteConnection {
    outbound: mpsc::Sender<SandboxWsMessage>,
    pending: Pending,
}

impl RemoteConnection {
    async fn request(&self, request_id: String, msg: SandboxWsMessage, timeout: Duration) -> Result<SandboxWsMessage> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id.clone(), tx);
        if self.outbound.send(msg).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(Error::Sandbox("sandbox connection closed".into()));
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(Error::Sandbox("sandbox connection closed before reply".into())),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(Error::Timeout("sandbox did not reply in time".into()))
            }
        }
    }
}

pub struct RemoteNodeSandboxProvider {
    config: SandboxConfig,
    connections: AsyncMutex<HashMap<String, Arc<RemoteConnection>>>,
}

impl RemoteNodeSandboxProvider {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            connections: AsyncMutex::new(HashMap::new()),
        }
    }

    fn ws_url(&self) -> Result<&str> {
        self.config
            .remote_ws_url
            .as_deref()
            .ok_or_else(|| Error::Config("sandbox.remote_ws_url is required for the remote_node provider".into()))
    }

    async fn dial(&self, project_id: Uuid) -> Result<(String, Arc<RemoteConnection>)> {
        let base = self.ws_url()?;
        let url = format!("{base}?project_id={project_id}");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Sandbox(format!("connect to sandbox node: {e}")))?;
        let (mut write, mut read) = ws.split();

        // Handshake: expect SandboxHello first, answer with GatewayWelcome.
        let hello = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<SandboxWsMessage>(&text) {
                        Ok(SandboxWsMessage::SandboxHello { sandbox_id, protocol_version, .. }) => {
                            if protocol_version != PROTOCOL_VERSION {
                                let err = ProtocolError::VersionMismatch {
                                    node: protocol_version,
                                    gateway: PROTOCOL_VERSION,
                                };
                                return Err(Error::Sandbox(err.to_string()));
                            }
                            break sandbox_id;
                        }
                        _ => continue,
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Sandbox(format!("handshake read: {e}"))),
                None => return Err(Error::Sandbox("sandbox closed before handshake".into())),
            }
        };

        let welcome = SandboxWsMessage::GatewayWelcome {
            session_id: Uuid::new_v4().to_string(),
            gateway_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        write
            .send(Message::Text(serde_json::to_string(&welcome).unwrap()))
            .await
            .map_err(|e| Error::Sandbox(format!("handshake write: {e}")))?;

        let pending: Pending = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel::<SandboxWsMessage>(32);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&msg) else { continue };
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let pending_reader = pending.clone();
        let tx_reader = tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let Ok(Message::Text(text)) = frame else { continue };
                let Ok(msg) = serde_json::from_str::<SandboxWsMessage>(&text) else { continue };
                match msg {
                    SandboxWsMessage::ExecResponse { ref request_id, .. } => {
                        if let Some(tx) = pending_reader.lock().remove(request_id) {
                            let _ = tx.send(msg);
                        }
                    }
                    SandboxWsMessage::StopAck => {
                        if let Some(tx) = pending_reader.lock().remove("stop") {
                            let _ = tx.send(msg);
                        }
                    }
                    SandboxWsMessage::Ping { timestamp } => {
                        let _ = tx_reader.send(SandboxWsMessage::Pong { timestamp }).await;
                    }
                    _ => {}
                }
            }
        });

        Ok((hello, Arc::new(RemoteConnection { outbound: tx, pending })))
    }
}

#[async_trait]
impl SandboxProvider for RemoteNodeSandboxProvider {
    async fn create(&self, project_id: Uuid) -> Result<SandboxInfo> {
        let (sandbox_id, conn) = self.dial(project_id).await?;
        self.connections.lock().await.insert(sandbox_id.clone(), conn);
        Ok(SandboxInfo {
            id: sandbox_id,
            pass: None,
            vnc_preview: None,
            sandbox_url: self.config.remote_ws_url.clone(),
            token: None,
            is_local: false,
        })
    }

    async fn get_or_start(&self, project_id: Uuid, existing: Option<SandboxInfo>) -> Result<SandboxInfo> {
        if let Some(info) = &existing {
            if !info.is_local && self.connections.lock().await.contains_key(&info.id) {
                return Ok(info.clone());
            }
        }
        match existing {
            Some(info) if !info.is_local => {
                let (sandbox_id, conn) = self.dial(project_id).await?;
                self.connections.lock().await.insert(sandbox_id.clone(), conn);
                Ok(SandboxInfo { id: sandbox_id, ..info })
            }
            _ => self.create(project_id).await,
        }
    }

    async fn exec(&self, sandbox: &SandboxInfo, spec: ExecSpec) -> Result<ExecOutcome> {
        let conn = self
            .connections
            .lock()
            .await
            .get(&sandbox.id)
            .cloned()
            .ok_or_else(|| Error::Sandbox(format!("no connection for sandbox {}", sandbox.id)))?;

        let request_id = Uuid::new_v4().to_string();
        let msg = SandboxWsMessage::ExecRequest {
            request_id: request_id.clone(),
            command: spec.command,
            workdir: spec.workdir,
            timeout_sec: spec.timeout_sec,
        };
        let timeout = Duration::from_secs(spec.timeout_sec + 5);
        match conn.request(request_id, msg, timeout).await? {
            SandboxWsMessage::ExecResponse { exit_code, stdout, stderr, truncated, error, .. } => {
                if let Some(err) = error {
                    return Err(Error::Sandbox(err));
                }
                Ok(ExecOutcome { exit_code, stdout, stderr, truncated })
            }
            _other => Err(Error::Sandbox(ProtocolError::UnexpectedMessage.to_string())),
        }
    }

    async fn stop(&self, sandbox: &SandboxInfo) -> Result<()> {
        let conn = self.connections.lock().await.remove(&sandbox.id);
        if let Some(conn) = conn {
            let _ = conn
                .request("stop".to_string(), SandboxWsMessage::Stop { reason: None }, Duration::from_secs(10))
                .await;
        }
        Ok(())
    }
}
