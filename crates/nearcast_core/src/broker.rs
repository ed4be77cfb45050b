use crate::error::CoreError;
use crate::pubsub::PubSub;
use std::sync::Arc;

/// Thin adapter over a pub/sub connection. Each subscription plane holds
/// its own broker (its own subscription set and receive stream); the
/// topology holds one more for publishing.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<dyn PubSub>,
}

impl Broker {
    pub fn new(inner: Arc<dyn PubSub>) -> Self {
        Broker { inner }
    }

    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), CoreError> {
        self.inner.publish(channel, payload).await
    }

    pub async fn subscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.inner.subscribe(channel).await
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<(), CoreError> {
        self.inner.unsubscribe(channel).await
    }

    /// The next inbound (channel, payload) pair for this connection.
    pub async fn receive(&self) -> Result<(String, Vec<u8>), CoreError> {
        self.inner.receive().await
    }
}
