//! Process-wide registry wiring: the plugin decoders, the filter/backend
//! registries, and the authenticator list. All of this is global mutable
//! state completed before `serve` begins and never touched again — reload
//! only ever affects the Config Snapshot, per the design note in
//! SPEC_FULL.md §9.

use std::sync::Arc;

use serde_json::Value;

use portway_auth::authenticator::{AuthDeps, Authenticator};
use portway_auth::bearer::BearerAuthenticator;
use portway_auth::identity::Identifier;
use portway_auth::jwt::JwtAuthenticator;
use portway_auth::token_store::TokenStore;
use portway_backend::{decode_http_backend_config, BackendRegistry, HttpBackend};
use portway_core::context::Credential;
use portway_core::entities::{CredentialCommon, OAuth2Credential};
use portway_core::snapshot::DecoderRegistry;
use portway_filter::builtin::{SecurityHeadersConfig, SecurityHeadersFilter, TimingLoggerFilter};
use portway_filter::FilterRegistry;

/// Builds the decoder registry consulted at every snapshot build: one entry
/// per named filter/backend plugin and one per credential type tag. Adding a
/// plugin kind to the gateway means registering it here, nowhere else.
pub fn decoder_registry() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();

    registry.register_backend("http", Arc::new(decode_http_backend_config));

    registry.register_filter("timing-logger", Arc::new(|raw: &Value| Ok(raw.clone())));
    registry.register_filter(
        "security-headers",
        Arc::new(|raw: &Value| {
            let config: SecurityHeadersConfig = if raw.is_null() {
                SecurityHeadersConfig::default()
            } else {
                serde_json::from_value(raw.clone())?
            };
            Ok(serde_json::to_value(config)?)
        }),
    );

    registry.register_credential("oauth2", Arc::new(decode_oauth2_credential));

    registry
}

/// Decodes a `credentials[]` entry with `type: oauth2` into an
/// `OAuth2Credential`. The wire document carries `id`/`type` at the
/// `RawCredential` level rather than inside `properties` (they're consumed
/// by `#[serde(flatten)]`'s named siblings) — this stitches them back in
/// before delegating to `OAuth2Credential`'s own `Deserialize`.
fn decode_oauth2_credential(type_tag: &str, raw: &Value) -> anyhow::Result<Credential> {
    let mut object = raw
        .as_object()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("oauth2 credential properties must be a JSON object"))?;

    let id = object
        .remove("id")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| anyhow::anyhow!("oauth2 credential is missing 'id'"))?;

    // `CredentialCommon`'s remaining fields (subjectType, subjectId, enabled)
    // already live in `properties` alongside the oauth2-specific fields, so
    // a plain merge-and-deserialize covers both halves of the composition.
    object.insert("id".to_string(), Value::String(id));
    object.insert("type".to_string(), Value::String(type_tag.to_string()));

    let credential: OAuth2Credential = serde_json::from_value(Value::Object(object))?;
    let _: &CredentialCommon = &credential.common; // composition check, not a cast
    Ok(Credential::OAuth2(Arc::new(credential)))
}

pub fn backend_registry(metrics: Arc<portway_observability::MetricsCollector>) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(HttpBackend::new(metrics)));
    registry
}

pub fn filter_registry() -> FilterRegistry {
    let mut registry = FilterRegistry::new();
    registry.register(Arc::new(TimingLoggerFilter));
    registry.register(Arc::new(SecurityHeadersFilter));
    registry
}

/// Builds the ordered `Authenticator` list (§4.3): bearer first, then JWT —
/// matching the `.`-free/`.`-containing split the two implementations
/// already agree on, so declaration order only matters for which one is
/// asked first; either order is correct since each declines the other's
/// shape outright.
pub fn authenticators(
    token_store: Arc<dyn TokenStore>,
    identifier: Arc<dyn Identifier>,
    jwt_fallback_key: Vec<u8>,
) -> Vec<Arc<dyn Authenticator>> {
    let deps = AuthDeps { token_store, identifier };
    vec![
        Arc::new(BearerAuthenticator::new(deps.clone())),
        Arc::new(JwtAuthenticator::new(deps, jwt_fallback_key)),
    ]
}
