use crate::broker::Broker;
use crate::cell::Cell;
use crate::error::CoreError;
use crate::pubsub::PubSub;
use crate::store::{ClientChannel, ConnectionId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One independent namespace of pub/sub channels with per-connection
/// bookkeeping: the cell plane and the group plane are two instances.
///
/// Invariants maintained under a single plane-wide lock:
/// - `(conn, channel)` is in `by_connection` iff it is in `by_channel`;
/// - the broker subscription for a channel exists iff the channel has at
///   least one subscriber.
pub struct SubscriptionPlane {
    broker: Broker,
    state: RwLock<PlaneState>,
}

#[derive(Default)]
struct PlaneState {
    by_connection: HashMap<ConnectionId, HashSet<String>>,
    by_channel: HashMap<String, HashMap<ConnectionId, Arc<dyn ClientChannel>>>,
}

impl SubscriptionPlane {
    pub fn new(feed: Arc<dyn PubSub>) -> Arc<Self> {
        Arc::new(SubscriptionPlane {
            broker: Broker::new(feed),
            state: RwLock::new(PlaneState::default()),
        })
    }

    /// Start the receive loop: every inbound message is fanned out to the
    /// channel's current subscribers under the read lock. Writes to
    /// subscribers are non-blocking, so a slow consumer never stalls the
    /// loop. The task ends when the broker connection is torn down.
    pub fn run(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let plane = self.clone();
        tokio::spawn(async move {
            loop {
                match plane.broker.receive().await {
                    Ok((channel, payload)) => {
                        let state = plane.state.read().await;
                        if let Some(subscribers) = state.by_channel.get(&channel) {
                            for conn in subscribers.values() {
                                conn.write(&payload);
                            }
                        }
                    }
                    Err(e) => {
                        debug!("plane receive loop ending: {e}");
                        break;
                    }
                }
            }
        })
    }

    /// Subscribe `conn` to a single channel. With `replace`, any existing
    /// subscriptions of `conn` on this plane are cleared first.
    pub async fn subscribe(
        &self,
        conn: &Arc<dyn ClientChannel>,
        channel: &str,
        replace: bool,
    ) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        if replace {
            if let Err(e) = self.unsubscribe_locked(&mut state, conn.id()).await {
                warn!("stale subscription cleanup failed: {e}");
            }
        }
        self.subscribe_locked(&mut state, conn, channel).await
    }

    /// Replace `conn`'s subscriptions with the cell's whole covering, one
    /// channel per covering cell. Best-effort: a failing channel leaves the
    /// already-established ones in place and the first error is returned;
    /// the caller retries on the next cell update.
    pub async fn subscribe_to_cell(
        &self,
        conn: &Arc<dyn ClientChannel>,
        cell: &Cell,
    ) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        self.unsubscribe_locked(&mut state, conn.id()).await?;

        let mut first_err = None;
        for cell_id in cell.cell_group() {
            let channel = cell_id.to_string();
            if let Err(e) = self.subscribe_locked(&mut state, conn, &channel).await {
                warn!("cell channel {channel} subscribe failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove `conn` from every channel it holds, releasing broker
    /// subscriptions that end up with no subscribers.
    pub async fn unsubscribe_all(&self, conn_id: ConnectionId) -> Result<(), CoreError> {
        let mut state = self.state.write().await;
        self.unsubscribe_locked(&mut state, conn_id).await
    }

    /// Whether `conn` currently holds any subscription on this plane.
    pub async fn contains(&self, conn_id: ConnectionId) -> bool {
        self.state.read().await.by_connection.contains_key(&conn_id)
    }

    /// The channels `conn` currently holds, for inspection.
    pub async fn channels(&self, conn_id: ConnectionId) -> Vec<String> {
        self.state
            .read()
            .await
            .by_connection
            .get(&conn_id)
            .map(|set| {
                let mut channels: Vec<_> = set.iter().cloned().collect();
                channels.sort();
                channels
            })
            .unwrap_or_default()
    }

    /// Number of subscribers on `channel`, for inspection.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .read()
            .await
            .by_channel
            .get(channel)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    async fn subscribe_locked(
        &self,
        state: &mut PlaneState,
        conn: &Arc<dyn ClientChannel>,
        channel: &str,
    ) -> Result<(), CoreError> {
        // Broker-subscribe before the maps are touched: a failure leaves no
        // trace, and the subscription is live before any fan-out can name
        // this connection.
        if !state.by_channel.contains_key(channel) {
            self.broker.subscribe(channel).await?;
        }
        state
            .by_connection
            .entry(conn.id())
            .or_default()
            .insert(channel.to_string());
        state
            .by_channel
            .entry(channel.to_string())
            .or_default()
            .insert(conn.id(), conn.clone());
        Ok(())
    }

    async fn unsubscribe_locked(
        &self,
        state: &mut PlaneState,
        conn_id: ConnectionId,
    ) -> Result<(), CoreError> {
        let Some(channels) = state.by_connection.remove(&conn_id) else {
            return Ok(());
        };

        let mut first_err = None;
        for channel in channels {
            let emptied = match state.by_channel.get_mut(&channel) {
                Some(subs) => {
                    subs.remove(&conn_id);
                    subs.is_empty()
                }
                None => false,
            };
            if emptied {
                state.by_channel.remove(&channel);
                if let Err(e) = self.broker.unsubscribe(&channel).await {
                    warn!("channel {channel} release failed: {e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
