//! The process's own configuration — listen address, worker count, upstream
//! timeout bound, HMAC key file, error-template base path, observability
//! endpoints — distinct from the Config Snapshot document (SPEC_FULL.md
//! §4.1 [AMBIENT] "Process configuration"). Loaded once via a layered
//! `figment` stack, grounded directly on the teacher's `AndoConfig::load()`.

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Address the gateway's HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Tokio worker threads for the data-plane runtime. `0` selects the
    /// number of available cores, matching the teacher's `effective_workers`.
    #[serde(default)]
    pub workers: usize,

    /// Location of the gateway config document: a filesystem path or an
    /// `http(s)://` URL, consumed by `portway_store::document_source`.
    #[serde(default = "default_gateway_config")]
    pub gateway_config: String,

    /// Path to the HMAC key file backing JWT signature verification when a
    /// token's `cid` claim doesn't resolve to an issuing credential.
    pub jwt_fallback_key_file: Option<String>,

    /// Base path for locale-indexed error template files:
    /// `<base><locale>.yaml`, per §4.7.
    #[serde(default = "default_error_templates_base")]
    pub error_templates_base: String,

    /// Default bound on upstream HTTP dispatch; overridden per-backend by
    /// `HttpBackendConfig.timeout_ms` when the gateway config sets one.
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    /// Emit JSON-formatted log lines instead of compact text.
    #[serde(default)]
    pub json_logs: bool,
    /// Remote structured-log sink endpoint; absent disables shipping
    /// (access-log `tracing` events are always emitted regardless).
    pub log_sink_endpoint: Option<String>,
    #[serde(default = "default_log_batch_size")]
    pub log_batch_size: usize,
    #[serde(default = "default_log_flush_interval")]
    pub log_flush_interval_secs: u64,
    /// Serve Prometheus text exposition at this path on the gateway listener.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_gateway_config() -> String {
    "gateway.yaml".to_string()
}

fn default_error_templates_base() -> String {
    "config/errors/messages-".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    1000
}

fn default_log_batch_size() -> usize {
    200
}

fn default_log_flush_interval() -> u64 {
    5
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            workers: 0,
            gateway_config: default_gateway_config(),
            jwt_fallback_key_file: None,
            error_templates_base: default_error_templates_base(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProcessConfig {
    /// Loads from `path` (when given) or the first of a few conventional
    /// default locations, then merges `PORTWAY_`-prefixed environment
    /// variables over it — `PORTWAY_OBSERVABILITY__JSON_LOGS=true`, etc.
    /// Matches the teacher's `AndoConfig::load` merge order exactly.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        } else {
            for default_path in &["portway.yaml", "/etc/portway/portway.yaml", "config/portway.yaml"] {
                if std::path::Path::new(default_path).exists() {
                    figment = figment.merge(Yaml::file(default_path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("PORTWAY_").split("__"));
        Ok(figment.extract()?)
    }

    /// Resolves `workers == 0` to the number of available cores, with a
    /// floor of one — matching the teacher's `effective_workers`.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ProcessConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.upstream_timeout_ms, 1000);
    }

    #[test]
    fn effective_workers_floors_at_one() {
        let config = ProcessConfig { workers: 0, ..ProcessConfig::default() };
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn effective_workers_honors_explicit_count() {
        let config = ProcessConfig { workers: 4, ..ProcessConfig::default() };
        assert_eq!(config.effective_workers(), 4);
    }
}
