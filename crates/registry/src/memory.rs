//! Single-process backend: a `parking_lot::RwLock`-guarded map plus
//! `mpsc` fan-out channels, standing in for the shared key/value + pub/sub
//! service backing the run registry and response log. Used by tests and
//! single-instance deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sa_domain::response::ResponseEvent;
use sa_domain::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{ControlSignal, RegistryBackend};

#[derive(Default)]
struct State {
    /// instance -> registered run ids.
    active: HashMap<String, Vec<Uuid>>,
    log: HashMap<Uuid, Vec<ResponseEvent>>,
    event_subs: HashMap<Uuid, Vec<mpsc::UnboundedSender<()>>>,
    control_subs: HashMap<(Uuid, Option<String>), Vec<mpsc::UnboundedSender<ControlSignal>>>,
}

pub struct MemoryBackend {
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    async fn register(&self, instance: &str, run_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        let entries = state.active.entry(instance.to_string()).or_default();
        if !entries.contains(&run_id) {
            entries.push(run_id);
        }
        Ok(())
    }

    async fn deregister(&self, instance: &str, run_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        if let Some(entries) = state.active.get_mut(instance) {
            entries.retain(|id| *id != run_id);
        }
        Ok(())
    }

    async fn list_active(&self, instance: &str) -> Result<Vec<Uuid>> {
        let state = self.state.read();
        Ok(state.active.get(instance).cloned().unwrap_or_default())
    }

    async fn find_instances(&self, run_id: Uuid) -> Result<Vec<String>> {
        let state = self.state.read();
        Ok(state
            .active
            .iter()
            .filter(|(_, runs)| runs.contains(&run_id))
            .map(|(instance, _)| instance.clone())
            .collect())
    }

    async fn refresh_ttl(&self, _instance: &str, _run_id: Uuid) -> Result<()> {
        // In-memory keys never expire; refresh is a no-op here. Kept as
        // a distinct call so the RedisBackend and MemoryBackend share a
        // call site in the Coordinator's refresh-every-50-events cadence.
        Ok(())
    }

    async fn append(&self, run_id: Uuid, event: ResponseEvent) -> Result<u64> {
        let mut state = self.state.write();
        let log = state.log.entry(run_id).or_default();
        log.push(event);
        Ok((log.len() - 1) as u64)
    }

    async fn read_range(&self, run_id: Uuid, from: u64, to: Option<u64>) -> Result<Vec<(u64, ResponseEvent)>> {
        let state = self.state.read();
        let Some(log) = state.log.get(&run_id) else {
            return Ok(Vec::new());
        };
        let end = to.map(|t| t as usize).unwrap_or(log.len()).min(log.len());
        let start = (from as usize).min(end);
        Ok(log[start..end]
            .iter()
            .enumerate()
            .map(|(i, ev)| ((start + i) as u64, ev.clone()))
            .collect())
    }

    async fn notify(&self, run_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        if let Some(subs) = state.event_subs.get_mut(&run_id) {
            subs.retain(|tx| tx.send(()).is_ok());
        }
        Ok(())
    }

    async fn subscribe_events(&self, run_id: Uuid) -> Result<mpsc::UnboundedReceiver<()>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();
        state.event_subs.entry(run_id).or_default().push(tx);
        Ok(rx)
    }

    async fn subscribe_control(&self, run_id: Uuid, instance: Option<&str>) -> Result<mpsc::UnboundedReceiver<ControlSignal>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();
        state
            .control_subs
            .entry((run_id, instance.map(str::to_string)))
            .or_default()
            .push(tx);
        Ok(rx)
    }

    async fn publish_control(&self, run_id: Uuid, instance: Option<&str>, signal: ControlSignal) -> Result<()> {
        let mut state = self.state.write();
        let key = (run_id, instance.map(str::to_string));
        if let Some(subs) = state.control_subs.get_mut(&key) {
            subs.retain(|tx| tx.send(signal).is_ok());
        }
        Ok(())
    }

    async fn set_retention(&self, _run_id: Uuid, _ttl_seconds: u64) -> Result<()> {
        // No eviction policy for the in-memory backend; retention is a
        // real concern only for the Redis backend, where it maps to EXPIRE.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::response::Substatus;

    #[tokio::test]
    async fn register_and_list_active() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        backend.register("inst-1", run_id).await.unwrap();
        let active = backend.list_active("inst-1").await.unwrap();
        assert_eq!(active, vec![run_id]);

        backend.deregister("inst-1", run_id).await.unwrap();
        assert!(backend.list_active("inst-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_instances_returns_all_owners() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        backend.register("a", run_id).await.unwrap();
        backend.register("b", run_id).await.unwrap();
        let mut instances = backend.find_instances(run_id).await.unwrap();
        instances.sort();
        assert_eq!(instances, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn append_then_read_range_replays_in_order() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        let e1 = ResponseEvent::status(run_id, Substatus::ThreadRunStart, serde_json::json!({}));
        let e2 = ResponseEvent::status(run_id, Substatus::Completed, serde_json::json!({}));
        let i1 = backend.append(run_id, e1).await.unwrap();
        let i2 = backend.append(run_id, e2).await.unwrap();
        assert_eq!((i1, i2), (0, 1));

        let all = backend.read_range(run_id, 0, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, 0);
        assert_eq!(all[1].0, 1);
    }

    #[tokio::test]
    async fn late_subscriber_replays_from_index_zero() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        backend
            .append(run_id, ResponseEvent::status(run_id, Substatus::ThreadRunStart, serde_json::json!({})))
            .await
            .unwrap();

        // A subscriber connecting after the append still observes it via
        // read_range(0, None) — subscribe_events only signals *new*
        // appends going forward.
        let replay = backend.read_range(run_id, 0, None).await.unwrap();
        assert_eq!(replay.len(), 1);
    }

    #[tokio::test]
    async fn notify_wakes_subscribed_receiver() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        let mut rx = backend.subscribe_events(run_id).await.unwrap();
        backend.notify(run_id).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn control_signal_delivered_to_matching_channel_only() {
        let backend = MemoryBackend::new();
        let run_id = Uuid::new_v4();
        let mut global_rx = backend.subscribe_control(run_id, None).await.unwrap();
        let mut inst_rx = backend.subscribe_control(run_id, Some("inst-1")).await.unwrap();

        backend.publish_control(run_id, None, ControlSignal::Stop).await.unwrap();
        assert_eq!(global_rx.try_recv().unwrap(), ControlSignal::Stop);
        assert!(inst_rx.try_recv().is_err());

        backend.publish_control(run_id, Some("inst-1"), ControlSignal::EndStream).await.unwrap();
        assert_eq!(inst_rx.try_recv().unwrap(), ControlSignal::EndStream);
    }

    #[tokio::test]
    async fn control_signal_wire_round_trip() {
        assert_eq!(ControlSignal::from_wire("STOP"), Some(ControlSignal::Stop));
        assert_eq!(ControlSignal::from_wire("END_STREAM"), Some(ControlSignal::EndStream));
        assert_eq!(ControlSignal::from_wire("ERROR"), Some(ControlSignal::Error));
        assert_eq!(ControlSignal::from_wire("garbage"), None);
        assert_eq!(ControlSignal::Stop.as_wire(), "STOP");
    }
}
