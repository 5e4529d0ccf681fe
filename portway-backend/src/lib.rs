//! The Backend Dispatcher (§4.6): a named registry of backends (default key
//! `"http"`) plus the HTTP reverse-proxy backend that fulfills the
//! reference implementation's needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use portway_core::context::RequestContext;
use portway_core::entities::{Operation, Service};
use portway_core::error::{GatewayError, Reason};
use portway_observability::MetricsCollector;

const DEFAULT_BACKEND_NAME: &str = "http";

/// Request headers dropped entirely when copying to the upstream request,
/// per §4.6's "filtered set".
const FILTERED_HEADERS: &[&str] = &["content-length"];

/// Headers that replace rather than accumulate when copied in either
/// direction, per §4.6's Set-vs-Add rule.
const SINGLE_OCCURRENCE_HEADERS: &[&str] = &[
    "host",
    "server",
    "accept",
    "content-type",
    "user-agent",
    "connection",
    "cache-control",
    "origin",
    "accept-encoding",
    "accept-language",
];

fn is_single_occurrence(name: &str) -> bool {
    SINGLE_OCCURRENCE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn is_filtered(name: &str) -> bool {
    FILTERED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Fulfills the request against the resolved `config` (the backend
    /// reference's already-decoded properties), writing into `ctx.response`.
    async fn dispatch(&self, ctx: &mut RequestContext, config: &Value) -> Result<(), GatewayError>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }
}

/// The top-level Backend Dispatcher entry point: selects `operation.backend
/// ?: service.backend`, looks its name up in `registry`, and invokes it.
/// Invoked by the Filter Engine once the filter chain is exhausted.
pub async fn dispatch_to_backend(
    ctx: &mut RequestContext,
    service: &Service,
    operation: &Operation,
    registry: &BackendRegistry,
) -> Result<(), GatewayError> {
    let reference = operation
        .backend
        .as_ref()
        .or(service.backend.as_ref())
        .ok_or(Reason::RouterUnrecognized)?;

    let backend = registry
        .get(&reference.name)
        .ok_or(Reason::RouterUnrecognized)?;

    backend.dispatch(ctx, &reference.properties).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpBackendConfig {
    #[serde(default = "default_gateway_name")]
    pub gateway_name: String,
    /// Upstream request timeout. Reference default is 1 second (§4.6).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self { gateway_name: default_gateway_name(), timeout_ms: default_timeout_ms() }
    }
}

fn default_gateway_name() -> String {
    "portway".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Decodes a raw backend plugin config at snapshot-build time. Registered
/// under the `"http"` key in the snapshot's `DecoderRegistry`.
pub fn decode_http_backend_config(raw: &Value) -> anyhow::Result<Value> {
    let config: HttpBackendConfig = if raw.is_null() {
        HttpBackendConfig::default()
    } else {
        serde_json::from_value(raw.clone())?
    };
    Ok(serde_json::to_value(config)?)
}

/// The default HTTP reverse-proxy backend.
pub struct HttpBackend {
    client: reqwest::Client,
    metrics: Arc<MetricsCollector>,
}

impl HttpBackend {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { client: reqwest::Client::new(), metrics }
    }
}

fn target_url(ctx: &RequestContext) -> Result<String, GatewayError> {
    let host = ctx.service.hostnames.first().ok_or(Reason::RouterUnrecognized)?;
    let mut url = format!("{}://{}{}", ctx.service.scheme, host, ctx.request.path);
    if !ctx.request.query.is_empty() {
        url.push('?');
        url.push_str(&ctx.request.query);
    }
    Ok(url)
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        DEFAULT_BACKEND_NAME
    }

    async fn dispatch(&self, ctx: &mut RequestContext, config: &Value) -> Result<(), GatewayError> {
        let config: HttpBackendConfig =
            serde_json::from_value(config.clone()).unwrap_or_default();

        let url = target_url(ctx)?;
        ctx.upstream_addr = ctx.service.hostnames.first().cloned();
        let method = reqwest::Method::from_bytes(ctx.request.method.as_str().as_bytes())
            .map_err(|_| Reason::InternalError)?;

        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in &ctx.request.headers {
            if is_filtered(name) {
                continue;
            }
            let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) else {
                continue;
            };
            if is_single_occurrence(name.as_str()) {
                header_map.insert(name, value);
            } else {
                header_map.append(name, value);
            }
        }

        let builder = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(config.timeout_ms))
            .headers(header_map)
            .body(ctx.request.body.clone());

        let dispatched_at = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "upstream request failed");
            GatewayError::from(Reason::InternalError)
        })?;
        self.metrics.record_upstream(&ctx.service.id, dispatched_at.elapsed().as_secs_f64());

        ctx.response.status = response.status().as_u16();
        ctx.response.set_header("server", config.gateway_name.clone());

        for (name, value) in response.headers() {
            let name = name.as_str();
            let value = match value.to_str() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if is_filtered(name) {
                continue;
            }
            if is_single_occurrence(name) {
                ctx.response.set_header(name, value);
            } else {
                ctx.response.add_header(name, value);
            }
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, url = %url, "reading upstream response body failed");
            GatewayError::from(Reason::InternalError)
        })?;
        ctx.response.body = body.to_vec();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_occurrence_list_matches_spec() {
        assert!(is_single_occurrence("Host"));
        assert!(is_single_occurrence("ACCEPT"));
        assert!(!is_single_occurrence("x-request-id"));
    }

    #[test]
    fn content_length_is_filtered() {
        assert!(is_filtered("Content-Length"));
        assert!(!is_filtered("content-type"));
    }

    #[test]
    fn decode_defaults_when_properties_absent() {
        let decoded = decode_http_backend_config(&Value::Null).unwrap();
        let config: HttpBackendConfig = serde_json::from_value(decoded).unwrap();
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.gateway_name, "portway");
    }

    #[test]
    fn decode_honors_overrides() {
        let raw = serde_json::json!({ "gateway_name": "edge-1", "timeout_ms": 2500 });
        let decoded = decode_http_backend_config(&raw).unwrap();
        let config: HttpBackendConfig = serde_json::from_value(decoded).unwrap();
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.gateway_name, "edge-1");
    }
}
