//! The persistent Token store: an external collaborator per SPEC_FULL.md
//! §1 ("Persistent token store (supplies token Get/Create/Touch)"). This
//! module only defines the seam; `portway-store` ships the concrete,
//! in-memory implementation used by the reference binary.

use async_trait::async_trait;
use thiserror::Error;

use portway_core::entities::Token;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token id already exists")]
    Duplicate,
    #[error("token store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Get/Create/Touch over persisted `Token` records, per the data-model
/// invariant that `Token.id` is globally unique at any instant — `create`
/// must reject duplicates rather than overwrite.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Token>, TokenStoreError>;
    async fn create(&self, token: Token) -> Result<(), TokenStoreError>;
    /// Resets TTL for a `Lifespan::Session` token. A no-op for stores that
    /// don't expire tokens out-of-band.
    async fn touch(&self, id: &str) -> Result<(), TokenStoreError>;
}
