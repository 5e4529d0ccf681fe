//! Portway's process entry point: CLI parsing, logging/metrics init,
//! initial snapshot build, registry wiring, listener spawn, graceful
//! shutdown. Grounded on `ando-server/src/main.rs`'s top-to-bottom startup
//! sequence, adapted from its monoio thread-per-core model to tokio's
//! standard multi-threaded runtime — see DESIGN.md for why: the dependency
//! stack this gateway settled on carries `tokio`, not `monoio`/`socket2`, so
//! the worker model keeps the teacher's *pattern* (no locks on the read
//! path, one shared `ArcSwap`-backed router, one task per connection)
//! without the literal SO_REUSEPORT-per-core mechanism.

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use portway_core::error::ErrorFactory;
use portway_core::snapshot::SnapshotHandle;
use portway_server::config::ProcessConfig;
use portway_server::pipeline::PipelineDeps;
use portway_server::{http, oauth2_endpoint, reload, shutdown, wiring};
use portway_store::command::CommandBus;
use portway_store::identity::SimpleIdentifier;
use portway_store::token_store::InMemoryTokenStore;

#[derive(Parser, Debug)]
#[command(name = "portway", version, about = "Portway API gateway core")]
struct Cli {
    /// Path to the process configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` isn't set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let process_config = ProcessConfig::load(cli.config.as_ref().and_then(|p| p.to_str()))?;

    portway_observability::logging::init(&cli.log_level, process_config.observability.json_logs);

    let workers = process_config.effective_workers();
    tracing::info!(workers, "starting portway");

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?
        .block_on(run(process_config))
}

async fn run(process_config: ProcessConfig) -> anyhow::Result<()> {
    let decoder_registry = Arc::new(wiring::decoder_registry());

    let initial_snapshot =
        reload::build_snapshot(&process_config.gateway_config, &decoder_registry, 1).await?;
    let snapshots = Arc::new(SnapshotHandle::new(initial_snapshot));

    let token_store: Arc<dyn portway_auth::token_store::TokenStore> =
        Arc::new(InMemoryTokenStore::new());
    let identifier: Arc<dyn portway_auth::identity::Identifier> = Arc::new(SimpleIdentifier);

    let fallback_key = load_fallback_key(process_config.jwt_fallback_key_file.as_deref())?;

    let authenticators = wiring::authenticators(
        Arc::clone(&token_store),
        Arc::clone(&identifier),
        fallback_key.clone(),
    );

    let error_factory = if PathBuf::from(format!("{}.yaml", process_config.error_templates_base)).exists() {
        ErrorFactory::load(&process_config.error_templates_base)?
    } else {
        ErrorFactory::empty()
    };

    let metrics = Arc::new(portway_observability::MetricsCollector::new()?);

    let log_sink = Arc::new(build_log_sink(&process_config.observability));

    let pipeline_deps = Arc::new(PipelineDeps {
        authenticators,
        filter_registry: wiring::filter_registry(),
        backend_registry: wiring::backend_registry(Arc::clone(&metrics)),
        error_factory,
        metrics: Arc::clone(&metrics),
        log_sink,
        metrics_path: process_config.observability.metrics_path.clone(),
    });

    let oauth2_deps = Arc::new(oauth2_endpoint::Oauth2Deps {
        snapshots: Arc::clone(&snapshots),
        token_store: Arc::clone(&token_store),
        fallback_key,
    });

    let command_bus = Arc::new(CommandBus::new());
    reload::spawn_reload_driver(
        &command_bus,
        Arc::clone(&snapshots),
        Arc::clone(&decoder_registry),
        process_config.gateway_config.clone(),
    );
    spawn_reload_on_sighup(Arc::clone(&command_bus));

    let listener = TcpListener::bind(&process_config.listen_addr).await?;
    tracing::info!(addr = %process_config.listen_addr, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let snapshots = Arc::clone(&snapshots);
                let pipeline_deps = Arc::clone(&pipeline_deps);
                let oauth2_deps = Arc::clone(&oauth2_deps);
                tokio::spawn(async move {
                    http::handle_connection(stream, peer_addr, snapshots, pipeline_deps, oauth2_deps).await;
                });
            }
            _ = shutdown::wait_for_signal() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}

fn load_fallback_key(path: Option<&str>) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => Ok(std::fs::read(path)?),
        None => Ok(Vec::new()),
    }
}

/// Builds the remote access-log sink from `[observability].log_sink_endpoint`,
/// or a true no-op sink when unset — the access-log `tracing` event keeps
/// firing either way.
fn build_log_sink(
    config: &portway_server::config::ObservabilityConfig,
) -> portway_observability::access_log::RemoteLogSink {
    match &config.log_sink_endpoint {
        Some(endpoint) => portway_observability::access_log::RemoteLogSink::new(
            portway_observability::access_log::RemoteLogSinkConfig {
                endpoint: endpoint.clone(),
                batch_size: config.log_batch_size,
                flush_interval_secs: config.log_flush_interval_secs,
            },
        ),
        None => portway_observability::access_log::RemoteLogSink::disabled(),
    }
}

/// Reloading via `SIGHUP` mirrors the teacher's config-watch convention
/// without requiring the admin REST API this gateway's Non-goals exclude.
fn spawn_reload_on_sighup(bus: Arc<CommandBus>) {
    tokio::spawn(async move {
        let Ok(mut sighup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        else {
            return;
        };
        while sighup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading config");
            bus.notify("reload", Default::default());
        }
    });
}
