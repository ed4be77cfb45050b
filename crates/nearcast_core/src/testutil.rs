//! Shared fixtures for the crate's unit tests: a counting context over the
//! in-memory backends and a recording client channel.

use crate::activity::Activity;
use crate::cell::Cell;
use crate::config::Config;
use crate::context::Context;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::memory::{MemoryArchive, MemoryBus, MemoryKv};
use crate::store::{next_connection_id, ArchiveStore, ClientChannel, ConnectionId};
use crate::topology::Topology;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A context over the in-memory backends that counts plane subscriptions,
/// so tests can assert idempotence.
pub(crate) struct CountingContext {
    topology: Topology,
    archive: Arc<MemoryArchive>,
    subscribe_cell_calls: AtomicUsize,
    subscribe_group_calls: AtomicUsize,
}

impl CountingContext {
    pub fn subscribe_cell_calls(&self) -> usize {
        self.subscribe_cell_calls.load(Ordering::Relaxed)
    }

    pub fn subscribe_group_calls(&self) -> usize {
        self.subscribe_group_calls.load(Ordering::Relaxed)
    }
}

pub(crate) async fn test_context() -> (Arc<CountingContext>, Arc<MemoryBus>) {
    test_context_with(Config::new(250.0, 15)).await
}

pub(crate) async fn test_context_with_ttl(ttl_secs: u64) -> (Arc<CountingContext>, Arc<MemoryBus>) {
    test_context_with(Config::new(250.0, 15).with_token_timeout(ttl_secs)).await
}

pub(crate) async fn test_context_with(config: Config) -> (Arc<CountingContext>, Arc<MemoryBus>) {
    let bus = MemoryBus::new();
    let topology = Topology::new(
        config,
        Arc::new(MemoryKv::new()),
        Arc::new(bus.connect()),
        Arc::new(bus.connect()),
        Arc::new(bus.connect()),
    );
    topology.run();
    let ctx = Arc::new(CountingContext {
        topology,
        archive: Arc::new(MemoryArchive::new()),
        subscribe_cell_calls: AtomicUsize::new(0),
        subscribe_group_calls: AtomicUsize::new(0),
    });
    (ctx, bus)
}

#[async_trait]
impl Context for CountingContext {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn create_token(&self, client_id: ClientId) -> Result<TokenId, CoreError> {
        self.topology.create_token(client_id).await
    }

    async fn create_entity(
        self: Arc<Self>,
        token_id: TokenId,
        _user_agent: u8,
    ) -> Result<Arc<Entity>, CoreError> {
        let client_id = self.topology.resolve(token_id).await?;
        let cell = self.topology.make_cell();
        let ctx: Arc<dyn Context> = self;
        Ok(Entity::new(ctx, client_id, token_id, cell))
    }

    async fn resolve(&self, token_id: TokenId) -> Result<ClientId, CoreError> {
        self.topology.resolve(token_id).await
    }

    async fn subscribe_to_cell(
        &self,
        conn: &Arc<dyn ClientChannel>,
        cell: &Cell,
    ) -> Result<(), CoreError> {
        self.subscribe_cell_calls.fetch_add(1, Ordering::Relaxed);
        self.topology.subscribe_to_cell(conn, cell).await
    }

    async fn subscribe_to_group(
        &self,
        conn: &Arc<dyn ClientChannel>,
        group_id: &str,
    ) -> Result<(), CoreError> {
        self.subscribe_group_calls.fetch_add(1, Ordering::Relaxed);
        self.topology.subscribe_to_group(conn, group_id, true).await
    }

    async fn unsubscribe_from_groups(
        &self,
        conn: &Arc<dyn ClientChannel>,
    ) -> Result<(), CoreError> {
        self.topology.unsubscribe_from_groups(conn).await
    }

    async fn unsubscribe(&self, conn: &Arc<dyn ClientChannel>) -> Result<(), CoreError> {
        self.topology.unsubscribe(conn).await
    }

    async fn standby(&self, entity: &Entity, _message: &[u8]) -> Result<(), CoreError> {
        let loc = entity.location();
        self.archive.append_location(entity.token_id(), &loc).await
    }

    async fn broadcast(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError> {
        let loc = entity.location();
        let _ = self.archive.append_location(entity.token_id(), &loc).await;
        self.topology.broadcast(entity, message).await
    }

    async fn get_data(&self, token_id: TokenId) -> Result<Activity, CoreError> {
        let client_id = self.topology.resolve(token_id).await?;
        let mut activity = Activity::new(client_id);
        activity.locations = self.archive.locations_by_token(token_id).await?;
        Ok(activity)
    }
}

/// A client channel that records what the fan-out hands it and counts
/// overflow drops.
pub(crate) struct RecordingChannel {
    id: ConnectionId,
    entity: Arc<Entity>,
    tx: mpsc::Sender<Vec<u8>>,
    dropped: AtomicUsize,
}

impl RecordingChannel {
    pub async fn attached(
        ctx: &Arc<CountingContext>,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        Self::with_capacity(ctx, 64).await
    }

    pub async fn with_capacity(
        ctx: &Arc<CountingContext>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let entity = Entity::new(
            ctx.clone() as Arc<dyn Context>,
            ClientId::random(),
            TokenId::random(),
            ctx.topology().make_cell(),
        );
        let (tx, rx) = mpsc::channel(capacity);
        let channel = Arc::new(RecordingChannel {
            id: next_connection_id(),
            entity,
            tx,
            dropped: AtomicUsize::new(0),
        });
        (channel, rx)
    }

    /// This channel as the trait object the planes consume.
    pub fn handle(self: &Arc<Self>) -> Arc<dyn ClientChannel> {
        self.clone()
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ClientChannel for RecordingChannel {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn entity(&self) -> Arc<Entity> {
        self.entity.clone()
    }

    fn write(&self, payload: &[u8]) {
        if self.tx.try_send(payload.to_vec()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
