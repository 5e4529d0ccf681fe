//! The Config Snapshot: an immutable, atomically-swappable view of every
//! configured Service/Consumer/Credential/Permission/Plan/Plugin (§4.1).
//!
//! Fetching and parsing the raw document is left to `portway-store` (the
//! concrete "configuration source" collaborator); this module only knows how
//! to turn an already-parsed `RawConfigDocument` into a built, indexed
//! `ConfigSnapshot`, and how to swap one in atomically.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::Credential;
use crate::entities::{Consumer, OAuth2Credential, Permission, Plan, Service};
use crate::router::CompiledRouter;

/// The raw, as-parsed config document (§6 external interfaces). Field names
/// match the wire document exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfigDocument {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub consumers: Vec<Consumer>,
    #[serde(default)]
    pub credentials: Vec<RawCredential>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub plans: Vec<Plan>,
    #[serde(default)]
    pub plugin: Vec<crate::entities::PluginRef>,
}

/// A credential entry before type-tag dispatch: every credential document
/// carries `id` and `type` at minimum; the rest is decoded per the
/// registered decoder for that `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCredential {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub properties: Value,
}

pub type DecodeFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;
pub type CredentialDecodeFn = Arc<dyn Fn(&str, &Value) -> anyhow::Result<Credential> + Send + Sync>;

/// Registry of pluggable decoders, populated by the crates that own each
/// plugin kind (filters in `portway-filter`, backends in `portway-backend`,
/// credential types in `portway-auth`) before the first snapshot is built.
/// Per design note, this registry is process-wide and read-only once
/// serving begins — reload affects only the snapshot, never the registry.
#[derive(Default, Clone)]
pub struct DecoderRegistry {
    pub filters: HashMap<String, DecodeFn>,
    pub backends: HashMap<String, DecodeFn>,
    pub credentials: HashMap<String, CredentialDecodeFn>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_filter(&mut self, name: impl Into<String>, decode: DecodeFn) {
        self.filters.insert(name.into(), decode);
    }

    pub fn register_backend(&mut self, name: impl Into<String>, decode: DecodeFn) {
        self.backends.insert(name.into(), decode);
    }

    pub fn register_credential(&mut self, type_tag: impl Into<String>, decode: CredentialDecodeFn) {
        self.credentials.insert(type_tag.into(), decode);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("unregistered filter plugin: {0}")]
    UnregisteredFilter(String),
    #[error("unregistered backend plugin: {0}")]
    UnregisteredBackend(String),
    #[error("unregistered credential type: {0}")]
    UnregisteredCredentialType(String),
    #[error("failed to decode plugin '{name}': {source}")]
    Decode { name: String, #[source] source: anyhow::Error },
}

/// The built, indexed, immutable snapshot.
pub struct ConfigSnapshot {
    pub version: u64,
    pub services: Vec<Arc<Service>>,
    pub router: CompiledRouter,
    pub consumers_by_id: HashMap<String, Arc<Consumer>>,
    pub credentials_by_id: HashMap<String, Credential>,
    pub credentials_by_type_client: HashMap<String, Credential>,
    pub permissions_by_id: HashMap<String, Arc<Permission>>,
    pub plans_by_id: HashMap<String, Arc<Plan>>,
    pub plugins_by_name: HashMap<String, Value>,
}

impl ConfigSnapshot {
    /// Builds a snapshot from a raw document, decoding every plugin
    /// reference through the registry and indexing every entity, per the
    /// four steps in §4.1. Any decode error aborts the build — callers
    /// should keep serving the previously active snapshot on `Err`.
    pub fn build(doc: &RawConfigDocument, registry: &DecoderRegistry, version: u64) -> Result<Self, BuildError> {
        let mut services = Vec::with_capacity(doc.services.len());
        for service in &doc.services {
            services.push(Arc::new(decode_service(service, registry)?));
        }

        let mut consumers_by_id = HashMap::with_capacity(doc.consumers.len());
        for consumer in &doc.consumers {
            let mut consumer = consumer.clone();
            consumer.filters = decode_refs(&consumer.filters, &registry.filters)?;
            consumers_by_id.insert(consumer.id.clone(), Arc::new(consumer));
        }

        let mut credentials_by_id = HashMap::with_capacity(doc.credentials.len());
        let mut credentials_by_type_client = HashMap::with_capacity(doc.credentials.len());
        for raw in &doc.credentials {
            let decoder = registry
                .credentials
                .get(&raw.kind)
                .ok_or_else(|| BuildError::UnregisteredCredentialType(raw.kind.clone()))?;
            let credential = decoder(&raw.kind, &raw.properties).map_err(|source| BuildError::Decode {
                name: raw.kind.clone(),
                source,
            })?;
            credentials_by_id.insert(raw.id.clone(), credential.clone());
            if let Credential::OAuth2(c) = &credential {
                let key = format!("{}|{}", raw.kind, c.client_id);
                credentials_by_type_client.insert(key, credential.clone());
            }
        }

        let mut permissions_by_id = HashMap::with_capacity(doc.permissions.len());
        for permission in &doc.permissions {
            permissions_by_id.insert(permission.id.clone(), Arc::new(permission.clone()));
        }

        let mut plans_by_id = HashMap::with_capacity(doc.plans.len());
        for plan in &doc.plans {
            let mut plan = plan.clone();
            plan.filters = decode_refs(&plan.filters, &registry.filters)?;
            plans_by_id.insert(plan.id.clone(), Arc::new(plan));
        }

        let mut plugins_by_name = HashMap::with_capacity(doc.plugin.len());
        for plugin in &doc.plugin {
            let decoded = decode_one(plugin, &registry.filters)?;
            plugins_by_name.insert(plugin.name.clone(), decoded);
        }

        let router = CompiledRouter::build(&services);

        Ok(ConfigSnapshot {
            version,
            services,
            router,
            consumers_by_id,
            credentials_by_id,
            credentials_by_type_client,
            permissions_by_id,
            plans_by_id,
            plugins_by_name,
        })
    }

    pub fn consumer(&self, id: &str) -> Option<Arc<Consumer>> {
        self.consumers_by_id.get(id).cloned()
    }

    pub fn permission(&self, id: &str) -> Option<Arc<Permission>> {
        self.permissions_by_id.get(id).cloned()
    }

    pub fn plan(&self, id: &str) -> Option<Arc<Plan>> {
        self.plans_by_id.get(id).cloned()
    }

    pub fn credential_by_id(&self, id: &str) -> Option<Credential> {
        self.credentials_by_id.get(id).cloned()
    }

    pub fn oauth2_credential_by_client_id(&self, client_id: &str) -> Option<Credential> {
        self.credentials_by_type_client.get(&format!("oauth2|{client_id}")).cloned()
    }
}

fn decode_service(service: &Service, registry: &DecoderRegistry) -> Result<Service, BuildError> {
    let mut service = service.clone();
    service.filters = decode_refs(&service.filters, &registry.filters)?;
    if let Some(backend) = &service.backend {
        service.backend = Some(decode_backend_ref(backend, registry)?);
    }
    for operation in &mut service.operations {
        operation.filters = decode_refs(&operation.filters, &registry.filters)?;
        if let Some(backend) = &operation.backend {
            operation.backend = Some(decode_backend_ref(backend, registry)?);
        }
    }
    Ok(service)
}

fn decode_refs(
    refs: &[crate::entities::PluginRef],
    decoders: &HashMap<String, DecodeFn>,
) -> Result<Vec<crate::entities::PluginRef>, BuildError> {
    refs.iter().map(|r| decode_one(r, decoders)).collect()
}

fn decode_one(
    plugin: &crate::entities::PluginRef,
    decoders: &HashMap<String, DecodeFn>,
) -> Result<crate::entities::PluginRef, BuildError> {
    let decode = decoders
        .get(&plugin.name)
        .ok_or_else(|| BuildError::UnregisteredFilter(plugin.name.clone()))?;
    let decoded = decode(&plugin.properties).map_err(|source| BuildError::Decode {
        name: plugin.name.clone(),
        source,
    })?;
    Ok(crate::entities::PluginRef { name: plugin.name.clone(), properties: decoded })
}

fn decode_backend_ref(
    plugin: &crate::entities::PluginRef,
    registry: &DecoderRegistry,
) -> Result<crate::entities::PluginRef, BuildError> {
    let decode = registry
        .backends
        .get(&plugin.name)
        .ok_or_else(|| BuildError::UnregisteredBackend(plugin.name.clone()))?;
    let decoded = decode(&plugin.properties).map_err(|source| BuildError::Decode {
        name: plugin.name.clone(),
        source,
    })?;
    Ok(crate::entities::PluginRef { name: plugin.name.clone(), properties: decoded })
}

/// Holds the live, atomically-swappable snapshot pointer. The only mutation
/// path is `swap`; readers call `load` once per request and keep their
/// `Arc` for the request's entire lifetime (data model ownership rule).
pub struct SnapshotHandle {
    inner: ArcSwap<ConfigSnapshot>,
}

impl SnapshotHandle {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self { inner: ArcSwap::new(Arc::new(initial)) }
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.inner.load_full()
    }

    pub fn swap(&self, next: ConfigSnapshot) {
        self.inner.store(Arc::new(next));
    }
}
