use crate::context::Context;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::ids::ClientId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry of live entities keyed by token, the surface the transport
/// layer calls into. Reads stay concurrent during high-rate location
/// ingest; only session creation and the expiry sweep take the write lock.
pub struct Endpoint {
    ctx: Arc<dyn Context>,
    entities: RwLock<HashMap<String, Arc<Entity>>>,
}

impl Endpoint {
    pub fn new(ctx: Arc<dyn Context>) -> Arc<Self> {
        Arc::new(Endpoint {
            ctx,
            entities: RwLock::new(HashMap::new()),
        })
    }

    pub fn ctx(&self) -> &Arc<dyn Context> {
        &self.ctx
    }

    /// Create a session: mint a token, resolve it back as a sanity check,
    /// allocate the entity and register it.
    pub async fn create_entity(
        &self,
        client_id: ClientId,
        user_agent: u8,
    ) -> Result<Arc<Entity>, CoreError> {
        let token_id = self.ctx.create_token(client_id).await?;
        let entity = self.ctx.clone().create_entity(token_id, user_agent).await?;

        self.entities
            .write()
            .await
            .insert(token_id.to_string(), entity.clone());
        info!("session created: client={client_id} token={token_id}");
        Ok(entity)
    }

    /// Look up the entity behind a token string.
    pub async fn get_entity(&self, token: &str) -> Result<Arc<Entity>, CoreError> {
        self.entities
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(token.to_string()))
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Drop every entity whose session token has lapsed, stopping its
    /// driver on the way out.
    pub async fn cleanup(&self) {
        let snapshot: Vec<(String, Arc<Entity>)> = self
            .entities
            .read()
            .await
            .iter()
            .map(|(token, entity)| (token.clone(), entity.clone()))
            .collect();

        let mut lapsed = Vec::new();
        for (token, entity) in snapshot {
            if self.ctx.topology().entity_expired(entity.token_id()).await {
                lapsed.push(token);
            }
        }
        if lapsed.is_empty() {
            return;
        }

        let mut entities = self.entities.write().await;
        for token in lapsed {
            if let Some(entity) = entities.remove(&token) {
                entity.subscription().stop();
                debug!("expired session removed: token={token}");
            }
        }
    }

    /// Periodic expiry sweep.
    pub fn spawn_cleaner(self: &Arc<Self>, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let endpoint = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // the first tick is immediate
            loop {
                interval.tick().await;
                endpoint.cleanup().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use tokio::time::Duration;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let (ctx, _bus) = test_context().await;
        let endpoint = Endpoint::new(ctx);
        let client = ClientId::random();

        let entity = endpoint.create_entity(client, 0).await.unwrap();
        assert_eq!(entity.client_id(), client);

        let fetched = endpoint
            .get_entity(&entity.token_id().to_string())
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&entity, &fetched));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (ctx, _bus) = test_context().await;
        let endpoint = Endpoint::new(ctx);
        assert!(matches!(
            endpoint.get_entity("no-such-token").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_lapsed_sessions() {
        let (ctx, _bus) = crate::testutil::test_context_with_ttl(1).await;
        let endpoint = Endpoint::new(ctx);

        let entity = endpoint.create_entity(ClientId::random(), 0).await.unwrap();
        let token = entity.token_id().to_string();

        endpoint.cleanup().await;
        assert_eq!(endpoint.entity_count().await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        endpoint.cleanup().await;
        assert_eq!(endpoint.entity_count().await, 0);
        assert!(endpoint.get_entity(&token).await.is_err());
    }
}
