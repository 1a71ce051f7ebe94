//! `EventSink` over the Response Log: every event the Plan Executor emits
//! is appended to the run's log and then broadcast to subscribers via the
//! registry's "new event" pub/sub channel (spec §4.3 append-then-notify).

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::response::ResponseEvent;
use sa_domain::Result;
use sa_executor::EventSink;
use sa_registry::RegistryBackend;
use uuid::Uuid;

pub struct RegistryEventSink {
    registry: Arc<dyn RegistryBackend>,
    run_id: Uuid,
}

impl RegistryEventSink {
    pub fn new(registry: Arc<dyn RegistryBackend>, run_id: Uuid) -> Self {
        Self { registry, run_id }
    }
}

#[async_trait]
impl EventSink for RegistryEventSink {
    async fn emit(&self, event: ResponseEvent) -> Result<()> {
        self.registry.append(self.run_id, event).await?;
        self.registry.notify(self.run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::response::Substatus;
    use sa_registry::MemoryBackend;

    #[tokio::test]
    async fn emit_appends_then_notifies() {
        let backend: Arc<dyn RegistryBackend> = Arc::new(MemoryBackend::new());
        let run_id = Uuid::new_v4();
        let mut events = backend.subscribe_events(run_id).await.unwrap();
        let sink = RegistryEventSink::new(backend.clone(), run_id);

        sink.emit(ResponseEvent::status(run_id, Substatus::ThreadRunStart, serde_json::json!({})))
            .await
            .unwrap();

        assert!(events.try_recv().is_ok());
        let replay = backend.read_range(run_id, 0, None).await.unwrap();
        assert_eq!(replay.len(), 1);
    }
}
