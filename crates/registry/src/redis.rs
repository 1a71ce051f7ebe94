//! Redis-backed registry: the distributed deployment of [`RegistryBackend`].
//!
//! Run liveness is one key per `(instance, run_id)` pair with a refreshed
//! TTL rather than a Redis Set, so a crashed instance's runs expire on
//! their own without a reaper process. The response log is a Redis List
//! (`RPUSH`/`LRANGE`); new-event and control notifications are plain
//! pub/sub channels — subscribers re-read the log by index rather than
//! trusting pub/sub payloads, since Redis pub/sub does not guarantee
//! delivery to a disconnected subscriber.

use async_trait::async_trait;
use redis::AsyncCommands;
use sa_domain::error::Error;
use sa_domain::response::ResponseEvent;
use sa_domain::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{ControlSignal, RegistryBackend};

pub struct RedisBackend {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    run_ttl_seconds: u64,
}

impl RedisBackend {
    /// Connect to Redis and build a backend. `run_ttl_seconds` is the TTL
    /// applied to liveness keys on [`RegistryBackend::register`] and
    /// [`RegistryBackend::refresh_ttl`].
    pub async fn connect(redis_url: &str, run_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Registry(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| Error::Registry(format!("redis connection failed: {e}")))?;
        Ok(Self {
            client,
            conn,
            run_ttl_seconds,
        })
    }

    fn active_key(instance: &str, run_id: Uuid) -> String {
        format!("active_run:{instance}:{run_id}")
    }

    fn active_key_pattern(instance: &str) -> String {
        format!("active_run:{instance}:*")
    }

    fn log_key(run_id: Uuid) -> String {
        format!("agent_run:{run_id}:responses")
    }

    fn new_response_channel(run_id: Uuid) -> String {
        format!("agent_run:{run_id}:new_response")
    }

    fn control_channel(run_id: Uuid, instance: Option<&str>) -> String {
        match instance {
            Some(i) => format!("agent_run:{run_id}:control:{i}"),
            None => format!("agent_run:{run_id}:control"),
        }
    }

    /// Spawn a background task forwarding every message on `channel` into
    /// `tx`, mapped through `convert`. The task exits once `tx`'s receiver
    /// is dropped or the subscription errors out.
    async fn spawn_subscription<T, F>(&self, channel: String, convert: F, tx: mpsc::UnboundedSender<T>) -> Result<()>
    where
        T: Send + 'static,
        F: Fn(String) -> Option<T> + Send + 'static,
    {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| Error::Registry(format!("redis pubsub connection failed: {e}")))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| Error::Registry(format!("redis subscribe failed: {e}")))?;

        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            loop {
                use futures_util::StreamExt;
                let Some(msg) = stream.next().await else {
                    break;
                };
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if let Some(value) = convert(payload) {
                    if tx.send(value).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(())
    }
}

#[async_trait]
impl RegistryBackend for RedisBackend {
    async fn register(&self, instance: &str, run_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::active_key(instance, run_id);
        let _: () = conn
            .set_ex(&key, run_id.to_string(), self.run_ttl_seconds)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }

    async fn deregister(&self, instance: &str, run_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::active_key(instance, run_id);
        let _: () = conn.del(&key).await.map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }

    async fn list_active(&self, instance: &str) -> Result<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(Self::active_key_pattern(instance))
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        let prefix = format!("active_run:{instance}:");
        Ok(keys
            .iter()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect())
    }

    async fn find_instances(&self, run_id: Uuid) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys("active_run:*")
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        let suffix = format!(":{run_id}");
        Ok(keys
            .iter()
            .filter(|k| k.ends_with(&suffix))
            .filter_map(|k| {
                k.strip_prefix("active_run:")
                    .and_then(|rest| rest.strip_suffix(&suffix))
                    .map(str::to_string)
            })
            .collect())
    }

    async fn refresh_ttl(&self, instance: &str, run_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::active_key(instance, run_id);
        let _: () = conn
            .expire(&key, self.run_ttl_seconds as i64)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }

    async fn append(&self, run_id: Uuid, event: ResponseEvent) -> Result<u64> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&event)?;
        let key = Self::log_key(run_id);
        let len: i64 = conn
            .rpush(&key, payload)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok((len - 1) as u64)
    }

    async fn read_range(&self, run_id: Uuid, from: u64, to: Option<u64>) -> Result<Vec<(u64, ResponseEvent)>> {
        let mut conn = self.conn.clone();
        let key = Self::log_key(run_id);
        let stop: isize = to.map(|t| t as isize - 1).unwrap_or(-1);
        let raw: Vec<String> = conn
            .lrange(&key, from as isize, stop)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        raw.into_iter()
            .enumerate()
            .map(|(i, s)| {
                let event: ResponseEvent = serde_json::from_str(&s)?;
                Ok((from + i as u64, event))
            })
            .collect()
    }

    async fn notify(&self, run_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(Self::new_response_channel(run_id), "new")
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }

    async fn subscribe_events(&self, run_id: Uuid) -> Result<mpsc::UnboundedReceiver<()>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.spawn_subscription(Self::new_response_channel(run_id), |_| Some(()), tx)
            .await?;
        Ok(rx)
    }

    async fn subscribe_control(&self, run_id: Uuid, instance: Option<&str>) -> Result<mpsc::UnboundedReceiver<ControlSignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.spawn_subscription(
            Self::control_channel(run_id, instance),
            |payload| ControlSignal::from_wire(&payload),
            tx,
        )
        .await?;
        Ok(rx)
    }

    async fn publish_control(&self, run_id: Uuid, instance: Option<&str>, signal: ControlSignal) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(Self::control_channel(run_id, instance), signal.as_wire())
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }

    async fn set_retention(&self, run_id: Uuid, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = Self::log_key(run_id);
        let _: () = conn
            .expire(&key, ttl_seconds as i64)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        Ok(())
    }
}
