use crate::cell::Cell;
use crate::context::Context;
use crate::group::Group;
use crate::ids::{ClientId, TokenId};
use crate::location::Location;
use crate::subscription::Subscription;
use std::sync::{Arc, Mutex, RwLock};

/// Per-session state: the client identity, its session token, the cell it
/// occupies and its subscription driver. Owned by the endpoint registry;
/// the transport and the fan-out loop hold shared references.
pub struct Entity {
    client_id: ClientId,
    token_id: TokenId,
    state: Mutex<EntityState>,
    groups: RwLock<Vec<Group>>,
    subscription: Subscription,
}

struct EntityState {
    cell: Cell,
    location: Location,
}

impl Entity {
    pub fn new(
        ctx: Arc<dyn Context>,
        client_id: ClientId,
        token_id: TokenId,
        cell: Cell,
    ) -> Arc<Self> {
        Arc::new(Entity {
            client_id,
            token_id,
            state: Mutex::new(EntityState {
                cell,
                location: Location::new(0.0, 0.0, 0.0, 0.0, 0),
            }),
            groups: RwLock::new(Vec::new()),
            subscription: Subscription::new(ctx),
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn token_id(&self) -> TokenId {
        self.token_id
    }

    /// The id of the currently occupied cell (sentinel 0 before the first
    /// location update).
    pub fn cell_id(&self) -> u64 {
        self.state.lock().unwrap().cell.cell_id()
    }

    /// A value snapshot of the current cell.
    pub fn cell_snapshot(&self) -> Cell {
        self.state.lock().unwrap().cell.clone()
    }

    pub fn location(&self) -> Location {
        self.state.lock().unwrap().location
    }

    pub fn groups(&self) -> Vec<Group> {
        self.groups.read().unwrap().clone()
    }

    pub fn set_groups(&self, groups: Vec<Group>) {
        *self.groups.write().unwrap() = groups;
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Fold in a location update. On a cell boundary crossing the driver is
    /// handed a snapshot taken under the lock, so a slow driver still
    /// resubscribes against a consistent (cell id, covering) pair even as
    /// this entity keeps moving.
    pub fn update(&self, loc: Location) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.location = loc;
            state.cell.changed(&loc).then(|| state.cell.clone())
        };
        if let Some(cell) = snapshot {
            self.subscription.set_cell(cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;

    #[tokio::test]
    async fn update_snapshots_only_on_crossing() {
        let (ctx, _bus) = test_context().await;
        let entity = Entity::new(
            ctx.clone(),
            ClientId::random(),
            TokenId::random(),
            ctx.topology().make_cell(),
        );

        let loc = Location::new(-34.9287, 138.5999, 86.45, 0.0, 100);
        entity.update(loc);
        let first_cell = entity.cell_id();
        assert_ne!(first_cell, 0);
        assert_eq!(entity.location(), loc);

        // same cell again: the location moves, the cell does not
        let nearby = Location::new(-34.92871, 138.59991, 86.5, 0.0, 101);
        entity.update(nearby);
        assert_eq!(entity.cell_id(), first_cell);
        assert_eq!(entity.location(), nearby);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_further_updates() {
        let (ctx, _bus) = test_context().await;
        let entity = Entity::new(
            ctx.clone(),
            ClientId::random(),
            TokenId::random(),
            ctx.topology().make_cell(),
        );

        entity.update(Location::new(-34.9287, 138.5999, 0.0, 0.0, 0));
        let snapshot = entity.cell_snapshot();

        entity.update(Location::new(0.0, 0.0, 0.0, 0.0, 0));
        assert_ne!(snapshot.cell_id(), entity.cell_id());
        assert!(snapshot.cell_group().contains(&snapshot.cell_id()));
    }

    #[tokio::test]
    async fn groups_are_session_scoped_values() {
        let (ctx, _bus) = test_context().await;
        let entity = Entity::new(
            ctx.clone(),
            ClientId::random(),
            TokenId::random(),
            ctx.topology().make_cell(),
        );
        entity.set_groups(vec![Group::new("g1", "First"), Group::new("g2", "Second")]);
        let groups = entity.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].uuid, "g1");
    }
}
