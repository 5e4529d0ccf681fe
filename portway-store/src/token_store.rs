//! An in-memory [`TokenStore`] keyed by token id, grounded on the original
//! Redis-backed tokener's `Create`/`Get`/`Touch` trio (`SetNX` semantics for
//! `create` — reject on collision — `Expire` for `touch`), adapted to a
//! `DashMap` instead of round-tripping to an external store.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;

use portway_auth::token_store::{TokenStore, TokenStoreError};
use portway_core::entities::{Lifespan, Token};

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// A `Token.expiry` of `0` or earlier than now is treated as expired for
/// `Lifespan::Finite` tokens. `Lifespan::Session` tokens never expire by
/// time alone — they're retired by an explicit revoke, which this store
/// doesn't model — so `touch` only has teeth for the finite case.
fn is_expired(token: &Token) -> bool {
    token.lifespan == Lifespan::Finite && token.expiry > 0 && token.expiry <= now_secs()
}

#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: DashMap<String, Token>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, id: &str) -> Result<Option<Token>, TokenStoreError> {
        match self.tokens.get(id) {
            Some(entry) if is_expired(&entry) => {
                drop(entry);
                self.tokens.remove(id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn create(&self, token: Token) -> Result<(), TokenStoreError> {
        if self.tokens.contains_key(&token.id) {
            return Err(TokenStoreError::Duplicate);
        }
        self.tokens.insert(token.id.clone(), token);
        Ok(())
    }

    async fn touch(&self, id: &str) -> Result<(), TokenStoreError> {
        if let Some(mut entry) = self.tokens.get_mut(id) {
            if entry.lifespan == Lifespan::Session && entry.expiry > 0 {
                let ttl = entry.expiry.saturating_sub(now_secs()).max(1);
                entry.expiry = now_secs() + ttl;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite_token(id: &str, expiry: i64) -> Token {
        Token {
            id: id.to_string(),
            credential_id: "cred-1".to_string(),
            grant_type: "client_credentials".to_string(),
            token_type: "bearer".to_string(),
            subject: None,
            expiry,
            lifespan: Lifespan::Finite,
            permission_ids: vec![],
            claims: Default::default(),
            from_token: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryTokenStore::new();
        store.create(finite_token("t1", now_secs() + 60)).await.unwrap();
        let got = store.get("t1").await.unwrap();
        assert_eq!(got.unwrap().id, "t1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = InMemoryTokenStore::new();
        store.create(finite_token("t1", now_secs() + 60)).await.unwrap();
        let err = store.create(finite_token("t1", now_secs() + 60)).await.unwrap_err();
        assert!(matches!(err, TokenStoreError::Duplicate));
    }

    #[tokio::test]
    async fn get_on_expired_finite_token_returns_none_and_evicts() {
        let store = InMemoryTokenStore::new();
        store.create(finite_token("t1", now_secs() - 10)).await.unwrap();
        assert!(store.get("t1").await.unwrap().is_none());
        // Evicted — a second create with the same id now succeeds.
        store.create(finite_token("t1", now_secs() + 60)).await.unwrap();
    }

    #[tokio::test]
    async fn get_on_missing_id_returns_none() {
        let store = InMemoryTokenStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_extends_session_token_ttl() {
        let store = InMemoryTokenStore::new();
        let mut token = finite_token("t1", now_secs() + 5);
        token.lifespan = Lifespan::Session;
        store.create(token).await.unwrap();
        store.touch("t1").await.unwrap();
        let got = store.get("t1").await.unwrap().unwrap();
        assert!(got.expiry >= now_secs() + 4);
    }

    #[tokio::test]
    async fn touch_on_missing_id_is_a_no_op() {
        let store = InMemoryTokenStore::new();
        store.touch("nope").await.unwrap();
    }
}
