use crate::error::CoreError;
use async_trait::async_trait;

/// Channel-oriented pub/sub transport. At-most-once, no persistence, no
/// replay; the subscription set is per-handle, and `receive` yields
/// messages for any channel the handle is currently subscribed to.
///
/// Implementations carry their own interior mutability: `subscribe` and
/// `receive` are called concurrently (plane operations vs. the fan-out
/// loop) on the same handle.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish `payload` on `channel`.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), CoreError>;

    /// Start receiving messages published on `channel`.
    async fn subscribe(&self, channel: &str) -> Result<(), CoreError>;

    /// Stop receiving messages published on `channel`.
    async fn unsubscribe(&self, channel: &str) -> Result<(), CoreError>;

    /// The next message on any subscribed channel. Errors once the
    /// transport is torn down, which ends the caller's receive loop.
    async fn receive(&self) -> Result<(String, Vec<u8>), CoreError>;
}
