//! An illustrative response-header filter bundle, combining CORS handling
//! and baseline security headers. Grounded on the teacher's
//! `ando-plugins/src/transform/cors.rs` and
//! `ando-plugins/src/traffic/security_headers.rs`, adapted from their
//! phase-based `PluginInstance` shape (separate `rewrite`/`header_filter`
//! hooks) to the cursor-based `Filter` contract: the preflight short-circuit
//! happens before `next()`, the header injection after it returns.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use portway_core::entities::HttpMethod;
use portway_core::error::GatewayError;

use crate::engine::FilterCtx;
use crate::filter::Filter;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityHeadersConfig {
    #[serde(default = "default_allow_origins")]
    pub allow_origins: String,
    #[serde(default = "default_allow_methods")]
    pub allow_methods: String,
    #[serde(default = "default_allow_headers")]
    pub allow_headers: String,
    #[serde(default)]
    pub expose_headers: String,
    #[serde(default = "default_max_age")]
    pub max_age: u64,
    #[serde(default)]
    pub allow_credentials: bool,

    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age: u64,
    #[serde(default = "default_true")]
    pub hsts_include_subdomains: bool,
    #[serde(default = "default_true")]
    pub hsts_preload: bool,
    #[serde(default = "default_frame_options")]
    pub x_frame_options: String,
    #[serde(default = "default_true")]
    pub x_content_type_options: bool,
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,
    #[serde(default)]
    pub content_security_policy: String,
    #[serde(default = "default_permissions_policy")]
    pub permissions_policy: String,
    #[serde(default)]
    pub no_store_cache: bool,
}

fn default_allow_origins() -> String {
    "*".to_string()
}
fn default_allow_methods() -> String {
    "GET,POST,PUT,DELETE,PATCH,HEAD,OPTIONS".to_string()
}
fn default_allow_headers() -> String {
    "Content-Type,Authorization,X-Requested-With".to_string()
}
fn default_max_age() -> u64 {
    5
}
fn default_hsts_max_age() -> u64 {
    31_536_000
}
fn default_true() -> bool {
    true
}
fn default_frame_options() -> String {
    "DENY".to_string()
}
fn default_referrer_policy() -> String {
    "no-referrer".to_string()
}
fn default_permissions_policy() -> String {
    "geolocation=(), microphone=(), camera=()".to_string()
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_allow_origins(),
            allow_methods: default_allow_methods(),
            allow_headers: default_allow_headers(),
            expose_headers: String::new(),
            max_age: default_max_age(),
            allow_credentials: false,
            hsts_max_age: default_hsts_max_age(),
            hsts_include_subdomains: true,
            hsts_preload: true,
            x_frame_options: default_frame_options(),
            x_content_type_options: true,
            referrer_policy: default_referrer_policy(),
            content_security_policy: String::new(),
            permissions_policy: default_permissions_policy(),
            no_store_cache: false,
        }
    }
}

/// Runs before most header-filter-phase plugins did in the teacher (priority
/// 3000/4000), so it still goes early but after the timing wrapper.
const PRIORITY: i32 = 100;

pub struct SecurityHeadersFilter;

impl SecurityHeadersFilter {
    fn apply_cors_headers(ctx: &mut FilterCtx<'_>, config: &SecurityHeadersConfig) {
        ctx.response.set_header("access-control-allow-origin", config.allow_origins.clone());
        if config.allow_credentials {
            ctx.response.set_header("access-control-allow-credentials", "true");
        }
        if !config.expose_headers.is_empty() {
            ctx.response.set_header("access-control-expose-headers", config.expose_headers.clone());
        }
    }

    fn apply_security_headers(ctx: &mut FilterCtx<'_>, config: &SecurityHeadersConfig) {
        let mut hsts = format!("max-age={}", config.hsts_max_age);
        if config.hsts_include_subdomains {
            hsts.push_str("; includeSubDomains");
        }
        if config.hsts_preload {
            hsts.push_str("; preload");
        }
        ctx.response.set_header("strict-transport-security", hsts);

        if !config.x_frame_options.is_empty() {
            ctx.response.set_header("x-frame-options", config.x_frame_options.clone());
        }
        if config.x_content_type_options {
            ctx.response.set_header("x-content-type-options", "nosniff");
        }
        ctx.response.set_header("referrer-policy", config.referrer_policy.clone());
        if !config.content_security_policy.is_empty() {
            ctx.response.set_header("content-security-policy", config.content_security_policy.clone());
        }
        if !config.permissions_policy.is_empty() {
            ctx.response.set_header("permissions-policy", config.permissions_policy.clone());
        }
        if config.no_store_cache {
            ctx.response.set_header("cache-control", "no-store, no-cache");
            ctx.response.set_header("pragma", "no-cache");
        }
    }
}

#[async_trait]
impl Filter for SecurityHeadersFilter {
    fn name(&self) -> &str {
        "security-headers"
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    async fn evaluate(&self, ctx: &mut FilterCtx<'_>, config: &Value) -> Result<(), GatewayError> {
        let config: SecurityHeadersConfig = serde_json::from_value(config.clone()).unwrap_or_default();

        if ctx.request.method == HttpMethod::Options {
            ctx.response.status = 204;
            Self::apply_cors_headers(ctx, &config);
            ctx.response.set_header("access-control-allow-methods", config.allow_methods.clone());
            ctx.response.set_header("access-control-allow-headers", config.allow_headers.clone());
            ctx.response.set_header("access-control-max-age", config.max_age.to_string());
            ctx.stop();
            return Ok(());
        }

        ctx.next().await;

        Self::apply_cors_headers(ctx, &config);
        Self::apply_security_headers(ctx, &config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_keeps_secure_defaults() {
        let config = SecurityHeadersConfig::default();
        assert_eq!(config.x_frame_options, "DENY");
        assert!(config.hsts_include_subdomains);
        assert!(config.x_content_type_options);
    }

    #[test]
    fn decodes_overrides_from_json() {
        let raw = serde_json::json!({ "allow_origins": "https://example.com", "no_store_cache": true });
        let config: SecurityHeadersConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.allow_origins, "https://example.com");
        assert!(config.no_store_cache);
        // Untouched fields keep their defaults.
        assert_eq!(config.x_frame_options, "DENY");
    }
}
