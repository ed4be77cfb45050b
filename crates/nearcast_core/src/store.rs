use crate::entity::Entity;
use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::location::Location;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Key-value store with server-side TTL enforcement; backs the token
/// lifecycle. The production implementation is Redis (SETEX/GET).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl_secs`.
    async fn setex(&self, key: &str, ttl_secs: u64, value: &[u8]) -> Result<(), CoreError>;

    /// Fetch `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
}

/// Append-only archive of raw location points, read back per session.
/// Failures on the ingest path are logged and swallowed; the archive is
/// best-effort and never gates a broadcast.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Record a freshly created session.
    async fn record_session(
        &self,
        client_id: ClientId,
        token_id: TokenId,
        user_agent: &str,
    ) -> Result<(), CoreError>;

    /// Append one location to a session's track.
    async fn append_location(&self, token_id: TokenId, loc: &Location) -> Result<(), CoreError>;

    /// The full track of a session, in insertion order.
    async fn locations_by_token(&self, token_id: TokenId) -> Result<Vec<Location>, CoreError>;
}

/// Identity of one live client connection within the subscription planes.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// One subscriber's outbound half, owned by the transport.
///
/// `write` is called by the plane fan-out loop under a read lock and MUST
/// NOT block: implementations enqueue onto a bounded queue and drop the
/// message when the queue is full.
pub trait ClientChannel: Send + Sync {
    /// Process-unique id used as the plane bookkeeping key.
    fn id(&self) -> ConnectionId;

    /// The entity this connection speaks for.
    fn entity(&self) -> Arc<Entity>;

    /// Enqueue one outbound message, dropping it on overflow.
    fn write(&self, payload: &[u8]);
}
