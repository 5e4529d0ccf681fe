//! Builds the initial snapshot and wires a `"reload"` command-bus listener
//! that rebuilds and swaps it. Grounded on `portway_store::command::CommandBus`
//! (synchronous, fire-and-forget listeners) bridged to the async fetch-and-
//! build work via a bounded channel and a dedicated driver task — the bus
//! itself stays exactly as simple as the teacher's `command/command.go`.

use std::sync::Arc;

use portway_core::snapshot::{ConfigSnapshot, DecoderRegistry, SnapshotHandle};
use portway_store::command::{CommandBus, Params};

/// Fetches `location`, builds a snapshot against `registry`, and returns it.
/// Callers decide what to do with a build failure — the caller's existing
/// snapshot is always left untouched until a replacement is ready.
pub async fn build_snapshot(
    location: &str,
    registry: &DecoderRegistry,
    version: u64,
) -> anyhow::Result<ConfigSnapshot> {
    let doc = portway_store::document_source::load(location).await?;
    let snapshot = ConfigSnapshot::build(&doc, registry, version)?;
    Ok(snapshot)
}

/// Registers the `"reload"` listener on `bus`. The listener itself is
/// synchronous (the bus's contract), so it only enqueues a wakeup on
/// `trigger`; the actual fetch-and-swap runs on the task spawned alongside
/// it, which is where `document_source::load`'s async work actually happens.
pub fn spawn_reload_driver(
    bus: &CommandBus,
    snapshots: Arc<SnapshotHandle>,
    registry: Arc<DecoderRegistry>,
    location: String,
) {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);

    bus.add_listener(
        "reload",
        Box::new(move |_params: &Params| {
            // `try_send` rather than `send`: a reload already queued covers
            // any reload requested while it's in flight, so coalescing is
            // correct, not lossy.
            let _ = tx.try_send(());
        }),
    );

    tokio::spawn(async move {
        let mut version = snapshots.load().version;
        while rx.recv().await.is_some() {
            version += 1;
            match build_snapshot(&location, &registry, version).await {
                Ok(snapshot) => {
                    tracing::info!(version, "config reload succeeded");
                    snapshots.swap(snapshot);
                }
                Err(err) => {
                    tracing::error!(error = %err, "config reload failed, keeping previous snapshot");
                    version -= 1;
                }
            }
        }
    });
}
