//! Per-request access logging: a structured `tracing` event on the hot
//! path, plus an optional batching exporter that ships the same entries to
//! a remote log sink. Grounded on the teacher's `VictoriaLogsExporter`: a
//! true no-op when disabled (no channel, no task), `try_send` on the hot
//! path so a slow or down sink never blocks a request, and a
//! tick-or-batch-full flush loop.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct AccessLogEntry {
    pub service: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: f64,
    pub client_ip: String,
    pub upstream_addr: Option<String>,
}

impl AccessLogEntry {
    fn to_json(&self) -> Value {
        json!({
            "_msg": format!("{} {} {} {} {:.2}ms", self.method, self.path, self.status, self.client_ip, self.latency_ms),
            "_time": Utc::now().to_rfc3339(),
            "level": "info",
            "type": "access",
            "service": self.service,
            "method": self.method,
            "path": self.path,
            "status": self.status,
            "latency_ms": self.latency_ms,
            "client_ip": self.client_ip,
            "upstream_addr": self.upstream_addr,
        })
    }
}

/// Emits the request's `tracing::info!` access log event — always on,
/// regardless of whether a remote sink is configured.
pub fn emit(entry: &AccessLogEntry) {
    tracing::info!(
        service = %entry.service,
        method = %entry.method,
        path = %entry.path,
        status = entry.status,
        latency_ms = entry.latency_ms,
        client_ip = %entry.client_ip,
        upstream_addr = entry.upstream_addr.as_deref().unwrap_or("-"),
        "access"
    );
}

pub struct RemoteLogSinkConfig {
    pub endpoint: String,
    pub batch_size: usize,
    pub flush_interval_secs: u64,
}

/// Ships [`AccessLogEntry`] records to `endpoint` as newline-delimited JSON,
/// batched by size or time. `disabled()` builds a sink with no channel and
/// no background task — `record()` becomes a branch-predicted no-op.
pub struct RemoteLogSink {
    sender: Option<mpsc::Sender<Value>>,
}

impl RemoteLogSink {
    pub fn new(config: RemoteLogSinkConfig) -> Self {
        let (tx, rx) = mpsc::channel(10_000);
        tokio::spawn(Self::flush_loop(config, rx));
        Self { sender: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    #[inline]
    pub fn record(&self, entry: &AccessLogEntry) {
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(entry.to_json());
        }
    }

    async fn flush_loop(config: RemoteLogSinkConfig, mut rx: mpsc::Receiver<Value>) {
        let client = reqwest_client();
        let mut batch: Vec<Value> = Vec::with_capacity(config.batch_size);
        let mut tick = interval(Duration::from_secs(config.flush_interval_secs));

        loop {
            tokio::select! {
                Some(entry) = rx.recv() => {
                    batch.push(entry);
                    if batch.len() >= config.batch_size {
                        Self::flush(&client, &config.endpoint, &mut batch).await;
                    }
                }
                _ = tick.tick() => {
                    if !batch.is_empty() {
                        Self::flush(&client, &config.endpoint, &mut batch).await;
                    }
                }
            }
        }
    }

    async fn flush(client: &reqwest::Client, endpoint: &str, batch: &mut Vec<Value>) {
        let mut body = String::new();
        for entry in batch.iter() {
            body.push_str(&serde_json::to_string(entry).unwrap_or_default());
            body.push('\n');
        }
        let count = batch.len();
        match client.post(endpoint).header("content-type", "application/stream+json").body(body).send().await {
            Ok(resp) if resp.status().is_success() => tracing::debug!(count, "flushed access logs"),
            Ok(resp) => tracing::error!(status = %resp.status(), "access log flush rejected"),
            Err(e) => tracing::error!(error = %e, "access log flush failed"),
        }
        batch.clear();
    }
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}
