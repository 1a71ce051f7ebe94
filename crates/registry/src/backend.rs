use async_trait::async_trait;
use sa_domain::response::ResponseEvent;
use sa_domain::Result;
use uuid::Uuid;

/// Control-channel payloads. Transmitted as plain tokens over the
/// `agent_run:{run_id}:control[:{instance}]` pub/sub channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Stop,
    EndStream,
    Error,
}

impl ControlSignal {
    pub fn as_wire(self) -> &'static str {
        match self {
            ControlSignal::Stop => "STOP",
            ControlSignal::EndStream => "END_STREAM",
            ControlSignal::Error => "ERROR",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "STOP" => Some(ControlSignal::Stop),
            "END_STREAM" => Some(ControlSignal::EndStream),
            "ERROR" => Some(ControlSignal::Error),
            _ => None,
        }
    }
}

/// A shared key/value + pub/sub service realizing both the run registry
/// and the response log. A single trait because both components live on
/// the same backing store in every real deployment (in-process broadcast
/// channels, or a shared Redis instance) and their key names interleave
/// the two concerns.
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    // ── Run registry ─────────────────────────────────────────────────
    async fn register(&self, instance: &str, run_id: Uuid) -> Result<()>;
    async fn deregister(&self, instance: &str, run_id: Uuid) -> Result<()>;
    async fn list_active(&self, instance: &str) -> Result<Vec<Uuid>>;
    async fn find_instances(&self, run_id: Uuid) -> Result<Vec<String>>;
    async fn refresh_ttl(&self, instance: &str, run_id: Uuid) -> Result<()>;

    // ── Response log ──────────────────────────────────────────────────
    /// Append one event, returning its logical sequence index. Does
    /// *not* notify — callers invoke [`RegistryBackend::notify`]
    /// separately, per the append-then-notify contract.
    async fn append(&self, run_id: Uuid, event: ResponseEvent) -> Result<u64>;
    async fn read_range(&self, run_id: Uuid, from: u64, to: Option<u64>) -> Result<Vec<(u64, ResponseEvent)>>;
    async fn notify(&self, run_id: Uuid) -> Result<()>;
    /// Subscribe to the "new event" pub/sub channel. Returns a receiver
    /// that wakes (carrying no payload of its own — readers re-read by
    /// index) whenever `notify` fires for this run.
    async fn subscribe_events(&self, run_id: Uuid) -> Result<tokio::sync::mpsc::UnboundedReceiver<()>>;
    async fn subscribe_control(&self, run_id: Uuid, instance: Option<&str>) -> Result<tokio::sync::mpsc::UnboundedReceiver<ControlSignal>>;
    async fn publish_control(&self, run_id: Uuid, instance: Option<&str>, signal: ControlSignal) -> Result<()>;
    async fn set_retention(&self, run_id: Uuid, ttl_seconds: u64) -> Result<()>;
}
