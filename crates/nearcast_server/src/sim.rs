//! Simulator context: the same gateway surface, but every real client is
//! surrounded by synthetic peers — one per neighboring cell of its
//! covering — whose positions are broadcast alongside the client's own.
//! Runs over the in-memory backends, so a single process demonstrates the
//! full fan-out path with no Redis and no peers.

use async_trait::async_trait;
use nearcast_core::{
    center_location, Activity, Cell, ClientChannel, ClientId, Context, CoreError, Entity, Group,
    TokenId, Topology, UserData,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::debug;

pub struct SimContext {
    topology: Topology,
    groups: Vec<Group>,
    /// Synthetic peers per real session, rebuilt on every cell change.
    peers: Mutex<HashMap<TokenId, Vec<Arc<Entity>>>>,
    me: Weak<SimContext>,
}

impl SimContext {
    pub fn new(topology: Topology) -> Arc<Self> {
        Arc::new_cyclic(|me| SimContext {
            topology,
            groups: vec![Group::new("gorilla-racing", "Gorillas")],
            peers: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    /// One synthetic entity per covering cell other than the occupied one.
    /// Peer positions are synthesized directly from cell centers; their
    /// subscription drivers never run.
    fn make_peers(&self, cell: &Cell) -> Vec<Arc<Entity>> {
        let ctx: Arc<dyn Context> = self.me.upgrade().expect("simulator context alive");
        cell.cell_group()
            .iter()
            .filter(|cell_id| **cell_id != cell.cell_id())
            .map(|cell_id| {
                let mut peer_cell = Cell::new(cell.config().clone());
                peer_cell.update(*cell_id);
                Entity::new(
                    ctx.clone(),
                    ClientId::random(),
                    TokenId::random(),
                    peer_cell,
                )
            })
            .collect()
    }

    /// Broadcast each peer's cell-center position.
    async fn broadcast_peers(&self, token_id: TokenId) {
        let peers = match self.peers.lock().await.get(&token_id) {
            Some(peers) => peers.clone(),
            None => return,
        };
        let now = chrono::Utc::now().timestamp();
        for peer in peers {
            let mut loc = center_location(peer.cell_id());
            loc.timestamp = now;
            let data = UserData {
                client_id: peer.client_id().to_string(),
                location: loc,
            };
            match serde_json::to_vec(&data) {
                Ok(message) => {
                    if let Err(e) = self.topology.broadcast(&peer, &message).await {
                        debug!("peer broadcast failed: {e}");
                    }
                }
                Err(e) => debug!("peer payload marshalling failed: {e}"),
            }
        }
    }
}

#[async_trait]
impl Context for SimContext {
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
        let groups = self.groups.clone();
        let ctx: Arc<dyn Context> = self;
        let entity = Entity::new(ctx, client_id, token_id, cell);
        entity.set_groups(groups);
        Ok(entity)
    }

    async fn resolve(&self, token_id: TokenId) -> Result<ClientId, CoreError> {
        self.topology.resolve(token_id).await
    }

    async fn subscribe_to_cell(
        &self,
        conn: &Arc<dyn ClientChannel>,
        cell: &Cell,
    ) -> Result<(), CoreError> {
        let token_id = conn.entity().token_id();
        self.peers
            .lock()
            .await
            .insert(token_id, self.make_peers(cell));
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
        self.peers.lock().await.remove(&conn.entity().token_id());
        self.topology.unsubscribe(conn).await
    }

    async fn standby(&self, entity: &Entity, _message: &[u8]) -> Result<(), CoreError> {
        self.broadcast_peers(entity.token_id()).await;
        Ok(())
    }

    async fn broadcast(&self, entity: &Entity, message: &[u8]) -> Result<(), CoreError> {
        self.topology.broadcast(entity, message).await?;
        self.broadcast_peers(entity.token_id()).await;
        Ok(())
    }

    async fn get_data(&self, token_id: TokenId) -> Result<Activity, CoreError> {
        // the simulator archives nothing; the track reads back empty
        let client_id = self.topology.resolve(token_id).await?;
        Ok(Activity::new(client_id))
    }
}
