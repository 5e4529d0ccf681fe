//! A process-wide command bus, grounded directly on the original
//! `command/command.go`: listeners register under a command name, and
//! `notify` fans a payload out to every listener registered for it,
//! warning (rather than failing) when nobody's listening. `portway-server`
//! registers a `"reload"` listener that rebuilds and swaps the config
//! snapshot; an operator-facing signal handler or admin endpoint calls
//! `notify("reload", ...)` to trigger it.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

pub type Params = HashMap<String, Value>;
pub type Listener = Box<dyn Fn(&Params) + Send + Sync>;

#[derive(Default)]
pub struct CommandBus {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, command: &str, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(command.to_string())
            .or_default()
            .push(listener);
    }

    /// Invokes every listener registered for `command`. Unknown commands
    /// are logged and otherwise ignored, matching the original's warning.
    pub fn notify(&self, command: &str, payload: Params) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        match listeners.get(command) {
            Some(fns) if !fns.is_empty() => {
                for f in fns {
                    f(&payload);
                }
            }
            _ => {
                tracing::warn!(command, "no listener registered for command");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notify_invokes_all_registered_listeners() {
        let bus = CommandBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        bus.add_listener("reload", Box::new(move |_| { c1.fetch_add(1, Ordering::SeqCst); }));
        bus.add_listener("reload", Box::new(move |_| { c2.fetch_add(1, Ordering::SeqCst); }));
        bus.notify("reload", Params::new());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notify_on_unknown_command_does_not_panic() {
        let bus = CommandBus::new();
        bus.notify("nonexistent", Params::new());
    }

    #[test]
    fn listeners_for_different_commands_are_isolated() {
        let bus = CommandBus::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        bus.add_listener("reload", Box::new(move |_| { f.fetch_add(1, Ordering::SeqCst); }));
        bus.notify("other", Params::new());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
