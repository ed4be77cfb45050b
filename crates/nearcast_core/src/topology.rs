use crate::cell::Cell;
use crate::config::Config;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::plane::SubscriptionPlane;
use crate::pubsub::PubSub;
use crate::store::{ClientChannel, KeyValueStore};
use crate::broker::Broker;
use crate::token::TokenStore;
use std::sync::Arc;
use tracing::warn;

/// The composition root of the gateway core: the token store, a publishing
/// broker and the two subscription planes.
///
/// Plane exclusivity: a connection is never on both planes at once — every
/// public subscribe entry point clears the other plane first.
pub struct Topology {
    config: Config,
    tokens: TokenStore,
    publisher: Broker,
    cell_plane: Arc<SubscriptionPlane>,
    group_plane: Arc<SubscriptionPlane>,
}

impl Topology {
    /// Assemble a topology over one key-value store and three broker
    /// connections: a publish side and one receive side per plane.
    pub fn new(
        config: Config,
        kv: Arc<dyn KeyValueStore>,
        publisher: Arc<dyn PubSub>,
        cell_feed: Arc<dyn PubSub>,
        group_feed: Arc<dyn PubSub>,
    ) -> Self {
        let tokens = TokenStore::new(kv, config.token_timeout_secs);
        Topology {
            config,
            tokens,
            publisher: Broker::new(publisher),
            cell_plane: SubscriptionPlane::new(cell_feed),
            group_plane: SubscriptionPlane::new(group_feed),
        }
    }

    /// Start both plane receive loops.
    pub fn run(&self) {
        self.cell_plane.run();
        self.group_plane.run();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A fresh (sentinel) cell configured for this topology.
    pub fn make_cell(&self) -> Cell {
        Cell::new(self.config.clone())
    }

    pub fn cell_plane(&self) -> &Arc<SubscriptionPlane> {
        &self.cell_plane
    }

    pub fn group_plane(&self) -> &Arc<SubscriptionPlane> {
        &self.group_plane
    }

    /// Mint a session token for `client_id`.
    pub async fn create_token(&self, client_id: ClientId) -> Result<TokenId, CoreError> {
        self.tokens.issue(client_id).await
    }

    /// Resolve a session token back to its client identity.
    pub async fn resolve(&self, token_id: TokenId) -> Result<ClientId, CoreError> {
        self.tokens.resolve(token_id).await
    }

    /// True iff the session token has lapsed.
    pub async fn entity_expired(&self, token_id: TokenId) -> bool {
        self.tokens.expired(token_id).await
    }

    /// Move `conn` onto the cell plane, subscribed to the cell's covering.
    pub async fn subscribe_to_cell(
        &self,
        conn: &Arc<dyn ClientChannel>,
        cell: &Cell,
    ) -> Result<(), CoreError> {
        if let Err(e) = self.group_plane.unsubscribe_all(conn.id()).await {
            warn!("group plane release failed: {e}");
        }
        self.cell_plane.subscribe_to_cell(conn, cell).await
    }

    /// Move `conn` onto the group plane, subscribed to `group_id` alone.
    pub async fn subscribe_to_group(
        &self,
        conn: &Arc<dyn ClientChannel>,
        group_id: &str,
        replace: bool,
    ) -> Result<(), CoreError> {
        if let Err(e) = self.cell_plane.unsubscribe_all(conn.id()).await {
            warn!("cell plane release failed: {e}");
        }
        self.group_plane.subscribe(conn, group_id, replace).await
    }

    /// Remove `conn` from every group channel.
    pub async fn unsubscribe_from_groups(
        &self,
        conn: &Arc<dyn ClientChannel>,
    ) -> Result<(), CoreError> {
        self.group_plane.unsubscribe_all(conn.id()).await
    }

    /// Teardown: remove `conn` from both planes, swallowing errors.
    pub async fn unsubscribe(&self, conn: &Arc<dyn ClientChannel>) -> Result<(), CoreError> {
        if let Err(e) = self.cell_plane.unsubscribe_all(conn.id()).await {
            warn!("cell plane release failed: {e}");
        }
        if let Err(e) = self.group_plane.unsubscribe_all(conn.id()).await {
            warn!("group plane release failed: {e}");
        }
        Ok(())
    }

    /// Publish `message` on the entity's cell channel and then on each of
    /// its group channels. Only the cell publish error surfaces; a broken
    /// group cannot poison the broadcast.
    pub async fn broadcast(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError> {
        let cell_channel = entity.cell_id().to_string();
        self.publisher.publish(&cell_channel, message).await?;

        for group in entity.groups() {
            if let Err(e) = self.publisher.publish(&group.uuid, message).await {
                warn!("group {} publish failed: {e}", group.uuid);
            }
        }
        Ok(())
    }
}
