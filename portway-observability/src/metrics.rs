//! A Prometheus-backed [`MetricsCollector`], grounded on the teacher's
//! `ando-observability::metrics::MetricsCollector` — same registry/counter/
//! histogram shape, trimmed of the Lua VM pool gauges and per-plugin-phase
//! bandwidth counters that have no counterpart in this gateway's design.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct MetricsCollector {
    registry: Registry,

    /// Total HTTP requests by service, method, status.
    pub http_requests_total: IntCounterVec,
    /// Request latency histogram by service.
    pub http_request_duration: HistogramVec,
    /// In-flight request gauge.
    pub active_connections: IntGauge,
    /// Upstream (backend dispatch) latency histogram.
    pub upstream_latency: HistogramVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("portway_http_requests_total", "Total HTTP requests").namespace("portway"),
            &["service", "method", "status"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("portway_http_request_duration_seconds", "Request latency")
                .namespace("portway")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["service"],
        )?;

        let active_connections =
            IntGauge::new("portway_active_connections", "Number of active connections")?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new("portway_upstream_latency_seconds", "Backend dispatch response time")
                .namespace("portway")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["service"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;

        Ok(Self { registry, http_requests_total, http_request_duration, active_connections, upstream_latency })
    }

    /// Records a completed request. `service` is the matched service id, or
    /// `"-"` when routing failed before a service was resolved.
    pub fn record_request(&self, service: &str, method: &str, status: u16, duration_secs: f64) {
        self.http_requests_total.with_label_values(&[service, method, &status.to_string()]).inc();
        self.http_request_duration.with_label_values(&[service]).observe(duration_secs);
    }

    pub fn record_upstream(&self, service: &str, duration_secs: f64) {
        self.upstream_latency.with_label_values(&[service]).observe(duration_secs);
    }

    /// Increments `active_connections` for the lifetime of the returned
    /// guard; the caller holds it for as long as the connection is open.
    pub fn track_connection(&self) -> ConnectionGuard<'_> {
        self.active_connections.inc();
        ConnectionGuard { gauge: &self.active_connections }
    }

    /// Prometheus text exposition, served by the `/metrics` endpoint.
    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer).unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("static metric descriptors never fail to register")
    }
}

/// RAII handle that decrements `active_connections` on drop, so every exit
/// path out of a connection's handler loop — including an early return on a
/// read error — releases the gauge.
pub struct ConnectionGuard<'a> {
    gauge: &'a IntGauge,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_request_increments_the_counter() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_request("svc-a", "GET", 200, 0.01);
        let text = collector.gather_text();
        assert!(text.contains("portway_http_requests_total"));
    }

    #[test]
    fn gather_text_is_valid_prometheus_exposition() {
        let collector = MetricsCollector::default();
        collector.active_connections.set(3);
        let text = collector.gather_text();
        assert!(text.contains("portway_active_connections 3"));
    }

    #[test]
    fn track_connection_increments_then_decrements_on_drop() {
        let collector = MetricsCollector::new().unwrap();
        assert_eq!(collector.active_connections.get(), 0);
        {
            let _guard = collector.track_connection();
            assert_eq!(collector.active_connections.get(), 1);
        }
        assert_eq!(collector.active_connections.get(), 0);
    }
}
