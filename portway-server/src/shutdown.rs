//! Graceful shutdown, grounded on the teacher's `ando-server` SIGTERM/SIGINT
//! handling but expressed with `tokio::signal` rather than a raw
//! `libc::signal` handler plus a busy-poll loop on an `AtomicBool` — the
//! runtime we adapted the worker model to already gives us an async-safe
//! signal future, so there's no reason to reach past it for this.

use tokio::signal::unix::{signal, SignalKind};

/// Resolves once either SIGTERM or SIGINT arrives.
pub async fn wait_for_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
}
