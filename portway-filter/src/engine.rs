//! The Filter Engine (§4.5): a cursor-based, re-entrant middleware chain
//! terminating in the Backend Dispatcher. Driven by a loop rather than
//! recursive invocation, per the design note on middleware re-entrancy —
//! `next()` only recurses one level per filter that actually wraps the
//! downstream chain, not once per untouched filter ahead of the cursor.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde_json::Value;

use portway_backend::{dispatch_to_backend, BackendRegistry};
use portway_core::context::RequestContext;
use portway_core::error::GatewayError;

use crate::filter::Filter;

/// A filter bound to its resolved (possibly combined) configuration,
/// produced by [`crate::collect::collect_filter_chain`].
#[derive(Clone)]
pub struct FilterSlot {
    pub filter: Arc<dyn Filter>,
    pub config: Value,
}

/// The view a `Filter::evaluate` gets of the in-flight request: the
/// `RequestContext` (via `Deref`/`DerefMut`) plus the three control-flow
/// primitives from §4.5.
pub struct FilterCtx<'a> {
    req: &'a mut RequestContext,
    filters: &'a [FilterSlot],
    cursor: &'a mut usize,
    stopped: &'a mut bool,
    backend_registry: &'a BackendRegistry,
    next_called: bool,
}

impl<'a> Deref for FilterCtx<'a> {
    type Target = RequestContext;
    fn deref(&self) -> &RequestContext {
        self.req
    }
}

impl<'a> DerefMut for FilterCtx<'a> {
    fn deref_mut(&mut self) -> &mut RequestContext {
        self.req
    }
}

impl<'a> FilterCtx<'a> {
    /// Runs the rest of the chain (and, if reached, the Backend Dispatcher),
    /// then returns control to the caller so it can observe the result —
    /// e.g. to capture an end time for a wrapping duration filter. A second
    /// call within the same `evaluate` invocation is a no-op, per the
    /// idempotence law in §8.
    pub async fn next(&mut self) {
        if self.next_called || *self.stopped {
            return;
        }
        self.next_called = true;
        drive(&mut *self.req, self.filters, &mut *self.cursor, &mut *self.stopped, self.backend_registry).await;
    }

    /// Terminates the chain without an error (e.g. a CORS preflight short
    /// circuit that already wrote its own response).
    pub fn stop(&mut self) {
        *self.stopped = true;
    }

    /// Terminates the chain and records the terminal error.
    pub fn set_error(&mut self, err: GatewayError) {
        *self.stopped = true;
        self.req.error = Some(err);
    }
}

/// Drives `filters` from `*cursor` to exhaustion and then to the Backend
/// Dispatcher, sharing `cursor`/`stopped` with any nested `next()` calls so
/// a filter further down the chain observes the same cursor the outer loop
/// does. `Filter::evaluate` is async-trait (boxed), so this recursion never
/// grows an unboxed future — only one stack frame per filter that actually
/// calls `next()`.
async fn drive(
    req: &mut RequestContext,
    filters: &[FilterSlot],
    cursor: &mut usize,
    stopped: &mut bool,
    backend_registry: &BackendRegistry,
) {
    while !*stopped {
        if *cursor < filters.len() {
            let slot = &filters[*cursor];
            *cursor += 1;
            let mut fctx = FilterCtx {
                req: &mut *req,
                filters,
                cursor: &mut *cursor,
                stopped: &mut *stopped,
                backend_registry,
                next_called: false,
            };
            if let Err(err) = slot.filter.evaluate(&mut fctx, &slot.config).await {
                fctx.set_error(err);
            }
        } else {
            *stopped = true;
            let service = req.service.clone();
            let operation = req.operation.clone();
            if let Err(err) = dispatch_to_backend(req, &service, &operation, backend_registry).await {
                req.error = Some(err);
            }
        }
    }
}

/// Runs the full, already-collected-and-sorted filter chain for one request,
/// invoking the Backend Dispatcher once the chain is exhausted. This is the
/// engine's single entry point — there is no separate "step" API, matching
/// §4.5's `execute(ctx)` driven entirely by the loop above and by filters'
/// own `next()` calls.
pub async fn run(req: &mut RequestContext, filters: &[FilterSlot], backend_registry: &BackendRegistry) {
    let mut cursor = 0usize;
    let mut stopped = false;
    drive(req, filters, &mut cursor, &mut stopped, backend_registry).await;
}
