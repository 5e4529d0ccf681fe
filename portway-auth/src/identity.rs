//! Identity resolution: an external collaborator per SPEC_FULL.md §1
//! ("Identity resolution — turning a subject string into an identity
//! record"). Injected as a trait object so the authentication pipeline
//! can be exercised with a test double, per design note "Identifier and
//! Tokener as injected interfaces".

use async_trait::async_trait;

use portway_core::entities::Identity;

#[async_trait]
pub trait Identifier: Send + Sync {
    async fn resolve(&self, subject: &str) -> anyhow::Result<Option<Identity>>;
}

/// An `Identifier` that never resolves anyone — useful for services whose
/// `authenticationType` never reaches `three-legged` and whose authenticators
/// never populate an identity.
pub struct NullIdentifier;

#[async_trait]
impl Identifier for NullIdentifier {
    async fn resolve(&self, _subject: &str) -> anyhow::Result<Option<Identity>> {
        Ok(None)
    }
}
