//! The ambient observability stack (§4.8): structured logging init and a
//! Prometheus metrics collector, grounded on the teacher's
//! `ando-observability` crate and trimmed down to the gateway core's own
//! concerns — no Lua VM pool gauges, no bandwidth counters for plugin
//! phases this codebase doesn't have.

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::AccessLogEntry;
pub use metrics::MetricsCollector;
