//! Two [`Identifier`] implementations. `SimpleIdentifier` is grounded
//! directly on the original `identity/simple` package: it manufactures an
//! `Identity` from the bare subject string, with no permissions or claims of
//! its own — useful when identity only needs to exist for claim templates
//! to reference, not to carry authorization data. `MapIdentifier` backs
//! deployments that maintain a static identity directory (permission ids,
//! claims) keyed by subject.

use async_trait::async_trait;
use dashmap::DashMap;

use portway_auth::identity::Identifier;
use portway_core::entities::Identity;

pub struct SimpleIdentifier;

#[async_trait]
impl Identifier for SimpleIdentifier {
    async fn resolve(&self, subject: &str) -> anyhow::Result<Option<Identity>> {
        Ok(Some(Identity {
            id: subject.to_string(),
            name: subject.to_string(),
            permission_ids: Vec::new(),
            claims: Default::default(),
        }))
    }
}

#[derive(Default)]
pub struct MapIdentifier {
    identities: DashMap<String, Identity>,
}

impl MapIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity) {
        self.identities.insert(identity.id.clone(), identity);
    }
}

#[async_trait]
impl Identifier for MapIdentifier {
    async fn resolve(&self, subject: &str) -> anyhow::Result<Option<Identity>> {
        Ok(self.identities.get(subject).map(|e| e.clone()))
    }
}
