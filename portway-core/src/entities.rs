//! Config-document entities. These are decoded once during snapshot build
//! and are immutable for the lifetime of the snapshot that owns them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticationType {
    None,
    TwoLegged,
    ThreeLegged,
}

/// A reference to a named plugin (filter or backend) plus its raw, not-yet-decoded
/// configuration properties. Decoded once per snapshot build by the plugin's
/// registered decoder and cached alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRef {
    pub name: String,
    #[serde(default)]
    pub properties: Value,
}

/// A permission reference attached to an Operation, used purely for documentation/
/// validation during snapshot build — the authoritative permission list for
/// authorization purposes lives on Consumer/Identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRef {
    pub path: Vec<String>,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub method: HttpMethod,
    pub uri_pattern: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    #[serde(default)]
    pub claims: Vec<ClaimRef>,
    #[serde(default)]
    pub filters: Vec<PluginRef>,
    pub backend: Option<PluginRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub hostnames: Vec<String>,
    pub uri_prefix: Option<String>,
    pub context_root: Option<String>,
    #[serde(default)]
    pub default_version: Option<String>,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_auth_type")]
    pub authentication_type: AuthenticationType,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub filters: Vec<PluginRef>,
    pub backend: Option<PluginRef>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_auth_type() -> AuthenticationType {
    AuthenticationType::None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumer {
    pub id: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    #[serde(default)]
    pub filters: Vec<PluginRef>,
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Consumer,
    User,
}

/// Common fields shared by every credential type, analogous to the source's
/// embedded `config.Credential` composed into `OAuth2Credential`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialCommon {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub subject_type: SubjectType,
    pub subject_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSettings {
    #[serde(default)]
    pub enabled: bool,
    pub access_token_timeout: Option<u64>,
    pub refresh_token_timeout: Option<u64>,
    #[serde(default)]
    pub lifespan: Lifespan,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    #[serde(default)]
    pub claims: HashMap<String, Value>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifespan {
    #[default]
    Finite,
    Session,
}

/// A credential specialized for the OAuth2 client_credentials/JWT flows.
/// Modeled as composition (common fields + type-specific fields), per
/// the design note that the source's "is-a Credential" relationship is
/// really has-a.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Credential {
    #[serde(flatten)]
    pub common: CredentialCommon,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub grant_settings: HashMap<String, GrantSettings>,
    #[serde(default)]
    pub permission_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Action,
    Entity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    User,
    Consumer,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PermissionType,
    pub scope: PermissionScope,
    pub claim_path: Vec<String>,
    #[serde(default)]
    pub claim_value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub price_amount: Option<f64>,
    #[serde(default)]
    pub price_currency: Option<String>,
    #[serde(default)]
    pub filters: Vec<PluginRef>,
    #[serde(default)]
    pub quotas: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bearer,
    Jwt,
    Refresh,
}

/// A persisted token record, created by the OAuth2 grant handler and
/// owned by the external token store thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub credential_id: String,
    pub grant_type: String,
    pub token_type: String,
    pub subject: Option<String>,
    pub expiry: i64,
    #[serde(default)]
    pub lifespan: Lifespan,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    #[serde(default)]
    pub claims: HashMap<String, Value>,
    pub from_token: Option<String>,
}

/// The caller's identity, resolved per-request from `Token.subject` (or a JWT
/// `sub` claim) by an external `Identifier`. Distinct from Consumer in
/// three-legged flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
    #[serde(default)]
    pub claims: HashMap<String, Value>,
}
