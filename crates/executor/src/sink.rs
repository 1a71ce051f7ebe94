use async_trait::async_trait;
use sa_domain::error::Result;
use sa_domain::response::ResponseEvent;

/// Where the executor sends every event it produces. The Run Coordinator
/// implements this over the Response Log (`append` then `notify`); tests
/// implement it over a plain `Vec`.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ResponseEvent) -> Result<()>;
}

#[async_trait]
impl EventSink for tokio::sync::Mutex<Vec<ResponseEvent>> {
    async fn emit(&self, event: ResponseEvent) -> Result<()> {
        self.lock().await.push(event);
        Ok(())
    }
}
