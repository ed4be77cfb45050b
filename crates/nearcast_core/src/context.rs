use crate::activity::Activity;
use crate::cell::Cell;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::store::{ArchiveStore, ClientChannel};
use crate::topology::Topology;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// The capability set the transport layer drives the core through. One
/// implementation is backed by the archive store; the simulator provides
/// another that also fabricates synthetic peer traffic.
#[async_trait]
pub trait Context: Send + Sync {
    /// The topology this context operates on.
    fn topology(&self) -> &Topology;

    /// Mint a session token bound to `client_id`.
    async fn create_token(&self, client_id: ClientId) -> Result<TokenId, CoreError>;

    /// Resolve the token, record the session and allocate the entity.
    async fn create_entity(
        self: Arc<Self>,
        token_id: TokenId,
        user_agent: u8,
    ) -> Result<Arc<Entity>, CoreError>;

    /// The client identity behind a token.
    async fn resolve(&self, token_id: TokenId) -> Result<ClientId, CoreError>;

    /// Subscribe `conn` to a cell's covering (cell plane).
    async fn subscribe_to_cell(
        &self,
        conn: &Arc<dyn ClientChannel>,
        cell: &Cell,
    ) -> Result<(), CoreError>;

    /// Subscribe `conn` to a group channel (group plane).
    async fn subscribe_to_group(
        &self,
        conn: &Arc<dyn ClientChannel>,
        group_id: &str,
    ) -> Result<(), CoreError>;

    /// Remove `conn` from every group channel.
    async fn unsubscribe_from_groups(&self, conn: &Arc<dyn ClientChannel>)
        -> Result<(), CoreError>;

    /// Remove `conn` from both planes.
    async fn unsubscribe(&self, conn: &Arc<dyn ClientChannel>) -> Result<(), CoreError>;

    /// A location update that is archived but not fanned out.
    async fn standby(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError>;

    /// Archive the entity's location and fan `message` out to its cell and
    /// group channels.
    async fn broadcast(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError>;

    /// The archived activity of the session behind `token_id`.
    async fn get_data(&self, token_id: TokenId) -> Result<Activity, CoreError>;
}

/// The production context: the topology plus the append-only location
/// archive. Archive writes are best-effort — a down archive never blocks
/// session creation or a broadcast.
pub struct ArchiveContext {
    topology: Topology,
    archive: Arc<dyn ArchiveStore>,
}

impl ArchiveContext {
    pub fn new(topology: Topology, archive: Arc<dyn ArchiveStore>) -> Self {
        ArchiveContext { topology, archive }
    }
}

#[async_trait]
impl Context for ArchiveContext {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn create_token(&self, client_id: ClientId) -> Result<TokenId, CoreError> {
        self.topology.create_token(client_id).await
    }

    async fn create_entity(
        self: Arc<Self>,
        token_id: TokenId,
        user_agent: u8,
    ) -> Result<Arc<Entity>, CoreError> {
        let client_id = self.topology.resolve(token_id).await?;

        if let Err(e) = self
            .archive
            .record_session(client_id, token_id, &user_agent.to_string())
            .await
        {
            warn!("session archive failed, continuing on token alone: {e}");
        }

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
        self.topology.subscribe_to_cell(conn, cell).await
    }

    async fn subscribe_to_group(
        &self,
        conn: &Arc<dyn ClientChannel>,
        group_id: &str,
    ) -> Result<(), CoreError> {
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
        if let Err(e) = self.archive.append_location(entity.token_id(), &loc).await {
            warn!("standby archive failed: {e}");
        }
        Ok(())
    }

    async fn broadcast(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError> {
        let loc = entity.location();
        if let Err(e) = self.archive.append_location(entity.token_id(), &loc).await {
            warn!("location archive failed: {e}");
        }
        self.topology.broadcast(entity, message).await
    }

    async fn get_data(&self, token_id: TokenId) -> Result<Activity, CoreError> {
        let client_id = self.topology.resolve(token_id).await?;
        let mut activity = Activity::new(client_id);
        activity.locations = self.archive.locations_by_token(token_id).await?;
        Ok(activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::location::Location;
    use crate::memory::{MemoryArchive, MemoryBus, MemoryKv};

    async fn archive_context() -> (Arc<ArchiveContext>, Arc<MemoryArchive>) {
        let bus = MemoryBus::new();
        let topology = Topology::new(
            Config::new(250.0, 15),
            Arc::new(MemoryKv::new()),
            Arc::new(bus.connect()),
            Arc::new(bus.connect()),
            Arc::new(bus.connect()),
        );
        topology.run();
        let archive = Arc::new(MemoryArchive::new());
        (
            Arc::new(ArchiveContext::new(topology, archive.clone())),
            archive,
        )
    }

    #[tokio::test]
    async fn create_entity_resolves_and_records_the_session() {
        let (ctx, archive) = archive_context().await;
        let client = ClientId::random();
        let token = ctx.create_token(client).await.unwrap();

        let entity = ctx.clone().create_entity(token, 2).await.unwrap();
        assert_eq!(entity.client_id(), client);
        assert_eq!(entity.token_id(), token);
        assert_eq!(archive.session_count(), 1);
    }

    #[tokio::test]
    async fn create_entity_rejects_unknown_tokens() {
        let (ctx, _archive) = archive_context().await;
        assert!(matches!(
            ctx.clone().create_entity(TokenId::random(), 0).await,
            Err(CoreError::Expired)
        ));
    }

    #[tokio::test]
    async fn standby_archives_without_publishing() {
        let (ctx, _archive) = archive_context().await;
        let token = ctx.create_token(ClientId::random()).await.unwrap();
        let entity = ctx.clone().create_entity(token, 0).await.unwrap();

        entity.update(Location::new(-34.9287, 138.5999, 86.45, 0.0, 7));
        ctx.standby(&entity, b"{}").await.unwrap();
        ctx.broadcast(&entity, b"{}").await.unwrap();

        let activity = ctx.get_data(token).await.unwrap();
        assert_eq!(activity.client_id, entity.client_id());
        assert_eq!(activity.locations.len(), 2);
        assert_eq!(activity.locations[0].timestamp, 7);
    }
}
