//! Process-wide `tracing` initialization, grounded on the teacher's use of
//! `tracing_subscriber::fmt()` gated by an `EnvFilter`.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `json` selects the structured JSON
/// formatter (for shipping to a log aggregator); otherwise a compact,
/// human-readable line format is used. `default_level` seeds the
/// `EnvFilter` when `RUST_LOG` isn't set.
pub fn init(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}
