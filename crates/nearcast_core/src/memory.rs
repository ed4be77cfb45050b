//! In-memory backends for tests and the simulator: a TTL key-value map,
//! a process-local pub/sub bus, and a vector-backed archive. Production
//! deployments use the Redis- and SQLite-backed implementations in the
//! server crate; these exist so the whole gateway runs self-contained.

use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::location::Location;
use crate::pubsub::PubSub;
use crate::store::{ArchiveStore, KeyValueStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

/// Key-value map with per-key TTL, expired lazily on read.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        MemoryKv::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn setex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> Result<(), CoreError> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_vec(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }
}

type BusMessage = (String, Vec<u8>);

/// Process-local broker. Each [`connect`](MemoryBus::connect) hands out an
/// independent handle with its own subscription set, mirroring one broker
/// connection.
#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<HashMap<String, HashMap<u64, mpsc::UnboundedSender<BusMessage>>>>,
    next_handle: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryBus::default())
    }

    /// Open a new pub/sub handle on this bus.
    pub fn connect(self: &Arc<Self>) -> MemoryPubSub {
        let (tx, rx) = mpsc::unbounded_channel();
        MemoryPubSub {
            bus: self.clone(),
            handle: self.next_handle.fetch_add(1, Ordering::Relaxed),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Number of handles currently subscribed to `channel` (test hook).
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(channel)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    fn publish(&self, channel: &str, payload: &[u8]) {
        if let Some(subs) = self.subscribers.lock().unwrap().get(channel) {
            for tx in subs.values() {
                // a closed handle is cleaned up on disconnect
                let _ = tx.send((channel.to_string(), payload.to_vec()));
            }
        }
    }

    fn subscribe(&self, handle: u64, channel: &str, tx: mpsc::UnboundedSender<BusMessage>) {
        self.subscribers
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .insert(handle, tx);
    }

    fn unsubscribe(&self, handle: u64, channel: &str) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(subs) = subscribers.get_mut(channel) {
            subs.remove(&handle);
            if subs.is_empty() {
                subscribers.remove(channel);
            }
        }
    }

    fn disconnect(&self, handle: u64) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|_, subs| {
            subs.remove(&handle);
            !subs.is_empty()
        });
    }
}

/// One connection to a [`MemoryBus`].
pub struct MemoryPubSub {
    bus: Arc<MemoryBus>,
    handle: u64,
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<BusMessage>>,
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), CoreError> {
        self.bus.publish(channel, payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.bus.subscribe(self.handle, channel, self.tx.clone());
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.bus.unsubscribe(self.handle, channel);
        Ok(())
    }

    async fn receive(&self) -> Result<(String, Vec<u8>), CoreError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| CoreError::Broker("bus closed".to_string()))
    }
}

impl Drop for MemoryPubSub {
    fn drop(&mut self) {
        self.bus.disconnect(self.handle);
    }
}

/// Vector-backed archive.
#[derive(Default)]
pub struct MemoryArchive {
    sessions: Mutex<Vec<(ClientId, TokenId, String)>>,
    tracks: Mutex<HashMap<TokenId, Vec<Location>>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        MemoryArchive::default()
    }

    /// Number of recorded sessions (test hook).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn record_session(
        &self,
        client_id: ClientId,
        token_id: TokenId,
        user_agent: &str,
    ) -> Result<(), CoreError> {
        self.sessions
            .lock()
            .unwrap()
            .push((client_id, token_id, user_agent.to_string()));
        Ok(())
    }

    async fn append_location(&self, token_id: TokenId, loc: &Location) -> Result<(), CoreError> {
        self.tracks
            .lock()
            .unwrap()
            .entry(token_id)
            .or_default()
            .push(*loc);
        Ok(())
    }

    async fn locations_by_token(&self, token_id: TokenId) -> Result<Vec<Location>, CoreError> {
        Ok(self
            .tracks
            .lock()
            .unwrap()
            .get(&token_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn kv_entries_expire() {
        let kv = MemoryKv::new();
        kv.setex("token", 1, b"client").await.unwrap();
        assert_eq!(kv.get("token").await.unwrap().as_deref(), Some(&b"client"[..]));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(kv.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bus_routes_to_subscribed_handles_only() {
        let bus = MemoryBus::new();
        let a = bus.connect();
        let b = bus.connect();

        a.subscribe("cell-1").await.unwrap();
        b.publish("cell-1", b"hello").await.unwrap();
        b.publish("cell-2", b"elsewhere").await.unwrap();

        let (channel, payload) = a.receive().await.unwrap();
        assert_eq!(channel, "cell-1");
        assert_eq!(payload, b"hello");

        a.unsubscribe("cell-1").await.unwrap();
        assert_eq!(bus.subscriber_count("cell-1"), 0);
    }

    #[tokio::test]
    async fn archive_preserves_track_order() {
        let archive = MemoryArchive::new();
        let token = TokenId::random();
        for i in 0..3 {
            let loc = Location::new(1.0, 2.0, 0.0, 0.0, i);
            archive.append_location(token, &loc).await.unwrap();
        }
        let track = archive.locations_by_token(token).await.unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track[2].timestamp, 2);
    }
}
