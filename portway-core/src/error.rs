//! The typed, wire-facing error layer (`GatewayError`) and the template-driven
//! error factory that turns a reason code into a status/message/code triple.
//!
//! Process-level failures (config loading, listener bind, document fetch) use
//! `anyhow::Result` instead — see SPEC_FULL.md §4.9. This module only covers
//! conditions the pipeline itself must render to a client.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reason codes from §7 of the specification. `Display` yields the exact
/// string used as the template lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Reason {
    #[error("invalidToken")]
    InvalidToken,
    #[error("tokenMalformed")]
    TokenMalformed,
    #[error("tokenExpired")]
    TokenExpired,
    #[error("tokenNotYetActive")]
    TokenNotYetActive,
    #[error("invalidCredential")]
    InvalidCredential,
    #[error("credentialDisabled")]
    CredentialDisabled,
    #[error("notAuthenticated")]
    NotAuthenticated,
    #[error("unregisteredFilter")]
    UnregisteredFilter,
    #[error("routerUnrecognized")]
    RouterUnrecognized,
    #[error("notFound")]
    NotFound,
    #[error("methodNotAllowed")]
    MethodNotAllowed,
    #[error("internalError")]
    InternalError,
}

/// A terminal, wire-renderable pipeline error: a reason code plus the
/// placeholder values needed to fill in its template message.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct GatewayError {
    pub reason: Reason,
    pub params: HashMap<String, Value>,
}

impl GatewayError {
    pub fn new(reason: Reason) -> Self {
        Self { reason, params: HashMap::new() }
    }

    pub fn with_params(reason: Reason, params: HashMap<String, Value>) -> Self {
        Self { reason, params }
    }
}

impl From<Reason> for GatewayError {
    fn from(reason: Reason) -> Self {
        GatewayError::new(reason)
    }
}

/// A single locale's error template, as loaded from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorTemplate {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub developer_message: String,
    #[serde(default)]
    pub error_code: String,
}

impl ErrorTemplate {
    fn merge_from(&mut self, other: &ErrorTemplate) {
        if other.status != 0 {
            self.status = other.status;
        }
        if !other.message.is_empty() {
            self.message = other.message.clone();
        }
        if !other.developer_message.is_empty() {
            self.developer_message = other.developer_message.clone();
        }
        if !other.error_code.is_empty() {
            self.error_code = other.error_code.clone();
        }
    }
}

pub type ErrorTemplateMap = HashMap<String, ErrorTemplate>;

fn default_error() -> ErrorTemplate {
    ErrorTemplate {
        status: 500,
        message: "Boom".to_string(),
        developer_message: String::new(),
        error_code: String::new(),
    }
}

/// The wire form of a rendered error (the source's `APIError`).
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub developer_message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Locale-indexed template map, loaded lazily and cached. Guarded by a
/// readers-writer lock: cache fills happen under the write lock, everything
/// else reads under the read lock — per SPEC_FULL.md §5.
pub struct ErrorFactory {
    base_path: String,
    locales: RwLock<HashMap<String, ErrorTemplateMap>>,
}

impl ErrorFactory {
    /// `base_path` combines with a locale suffix and `.yaml` to form the
    /// template file name, e.g. `<base_path><locale>.yaml`. The empty-string
    /// locale is the default and must load successfully at construction.
    pub fn load(base_path: impl Into<String>) -> anyhow::Result<Self> {
        let base_path = base_path.into();
        let default_map = load_locale_file(&base_path, "")?;
        let mut locales = HashMap::with_capacity(8);
        locales.insert(String::new(), default_map);
        Ok(Self { base_path, locales: RwLock::new(locales) })
    }

    /// Construct an empty factory whose only entry is the built-in default,
    /// for process contexts (unit tests) that have no template files on disk.
    pub fn empty() -> Self {
        let mut locales = HashMap::with_capacity(1);
        locales.insert(String::new(), ErrorTemplateMap::new());
        Self { base_path: String::new(), locales: RwLock::new(locales) }
    }

    fn map_for_locale(&self, locale: &str) -> ErrorTemplateMap {
        if let Some(found) = self.locales.read().unwrap().get(locale).cloned() {
            return found;
        }
        let loaded = load_locale_file(&self.base_path, locale).unwrap_or_default();
        self.locales.write().unwrap().insert(locale.to_string(), loaded.clone());
        loaded
    }

    /// Render a `GatewayError` into the wire `ApiError`, per §4.7's lookup
    /// order: `reason|<N params>` first, then `reason` alone. Missing
    /// entirely falls back to the default 500 "Boom" error.
    pub fn render(&self, locale: &str, err: &GatewayError) -> ApiError {
        let templates = self.map_for_locale(locale);
        let reason = err.reason.to_string();
        let mut resolved = ErrorTemplate::default();
        let mut found = false;

        if let Some(t) = templates.get(&reason) {
            resolved.merge_from(t);
            found = true;
        }
        if !err.params.is_empty() {
            let keyed = format!("{}|{}", reason, err.params.len());
            if let Some(t) = templates.get(&keyed) {
                resolved.merge_from(t);
                found = true;
            }
        }

        if !found {
            resolved = default_error();
        }

        let message = substitute_placeholders(&resolved.message, &err.params);
        let developer_message = substitute_placeholders(&resolved.developer_message, &err.params);

        ApiError {
            status: if resolved.status != 0 { resolved.status } else { 500 },
            reason,
            message,
            developer_message,
            error_code: resolved.error_code,
            request_id: None,
            details: None,
        }
    }
}

fn load_locale_file(base_path: &str, locale: &str) -> anyhow::Result<ErrorTemplateMap> {
    let path = format!("{base_path}{locale}.yaml");
    let bytes = std::fs::read(&path)?;
    let templates: ErrorTemplateMap = serde_yaml::from_slice(&bytes)?;
    Ok(templates)
}

fn substitute_placeholders(message: &str, params: &HashMap<String, Value>) -> String {
    if params.is_empty() || !message.contains('{') {
        return message.to_string();
    }
    let mut out = message.to_string();
    for (key, value) in params {
        let placeholder = format!("{{{key}}}");
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &rendered);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn factory_with(templates: ErrorTemplateMap) -> ErrorFactory {
        let mut locales = HashMap::new();
        locales.insert(String::new(), templates);
        ErrorFactory { base_path: String::new(), locales: RwLock::new(locales) }
    }

    #[test]
    fn falls_back_to_default_boom_when_unregistered() {
        let factory = ErrorFactory::empty();
        let api = factory.render("", &GatewayError::new(Reason::InternalError));
        assert_eq!(api.status, 500);
        assert_eq!(api.message, "Boom");
    }

    #[test]
    fn looks_up_plain_reason() {
        let mut templates = ErrorTemplateMap::new();
        templates.insert(
            "notFound".to_string(),
            ErrorTemplate { status: 404, message: "Not found".into(), ..Default::default() },
        );
        let factory = factory_with(templates);
        let api = factory.render("", &GatewayError::new(Reason::NotFound));
        assert_eq!(api.status, 404);
        assert_eq!(api.reason, "notFound");
    }

    #[test]
    fn prefers_param_count_keyed_template_and_substitutes_placeholders() {
        let mut templates = ErrorTemplateMap::new();
        templates.insert(
            "routerUnrecognized".to_string(),
            ErrorTemplate { status: 500, message: "Unknown backend".into(), ..Default::default() },
        );
        templates.insert(
            "routerUnrecognized|1".to_string(),
            ErrorTemplate { status: 502, message: "Unknown backend: {name}".into(), ..Default::default() },
        );
        let factory = factory_with(templates);
        let mut params = HashMap::new();
        params.insert("name".to_string(), json!("widgets"));
        let api = factory.render(
            "",
            &GatewayError::with_params(Reason::RouterUnrecognized, params),
        );
        assert_eq!(api.status, 502);
        assert_eq!(api.message, "Unknown backend: widgets");
    }
}
