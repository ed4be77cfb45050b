use crate::error::CoreError;
use crate::ids::{ClientId, TokenId};
use crate::store::KeyValueStore;
use std::sync::Arc;

/// Issues opaque session tokens and resolves them back to client
/// identities, with expiry delegated to the key-value store's TTL.
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
    ttl_secs: u64,
}

impl TokenStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl_secs: u64) -> Self {
        TokenStore { kv, ttl_secs }
    }

    /// Mint a fresh token bound to `client_id` for the configured TTL.
    pub async fn issue(&self, client_id: ClientId) -> Result<TokenId, CoreError> {
        let token_id = TokenId::random();
        self.kv
            .setex(
                &token_id.to_string(),
                self.ttl_secs,
                client_id.to_string().as_bytes(),
            )
            .await?;
        Ok(token_id)
    }

    /// The client identity behind `token_id`. `Expired` if the store no
    /// longer holds the token, `Malformed` if the stored value is not a
    /// valid identity.
    pub async fn resolve(&self, token_id: TokenId) -> Result<ClientId, CoreError> {
        let value = self
            .kv
            .get(&token_id.to_string())
            .await?
            .ok_or(CoreError::Expired)?;
        let text =
            std::str::from_utf8(&value).map_err(|_| CoreError::malformed("client identity"))?;
        ClientId::parse(text)
    }

    /// True iff the token is absent from the store.
    pub async fn expired(&self, token_id: TokenId) -> bool {
        matches!(self.kv.get(&token_id.to_string()).await, Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use tokio::time::Duration;

    #[tokio::test]
    async fn issue_then_resolve_round_trips() {
        let tokens = TokenStore::new(Arc::new(MemoryKv::new()), 30);
        let client = ClientId::random();
        let token = tokens.issue(client).await.unwrap();
        assert_eq!(tokens.resolve(token).await.unwrap(), client);
        assert!(!tokens.expired(token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_fails_after_ttl() {
        let tokens = TokenStore::new(Arc::new(MemoryKv::new()), 1);
        let token = tokens.issue(ClientId::random()).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(
            tokens.resolve(token).await,
            Err(CoreError::Expired)
        ));
        assert!(tokens.expired(token).await);
    }

    #[tokio::test]
    async fn unknown_token_is_expired() {
        let tokens = TokenStore::new(Arc::new(MemoryKv::new()), 30);
        assert!(matches!(
            tokens.resolve(TokenId::random()).await,
            Err(CoreError::Expired)
        ));
    }

    #[tokio::test]
    async fn garbage_identity_is_malformed() {
        let kv = Arc::new(MemoryKv::new());
        let token = TokenId::random();
        kv.setex(&token.to_string(), 30, b"\xff\xfenot a uuid")
            .await
            .unwrap();
        let tokens = TokenStore::new(kv, 30);
        assert!(matches!(
            tokens.resolve(token).await,
            Err(CoreError::Malformed(_))
        ));
    }
}
