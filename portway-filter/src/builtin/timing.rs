//! An illustrative timing/logger filter, grounded on the teacher/original
//! pack's `filter/logger/logger.go` and `filter/timer/timer.go`: wraps the
//! entire downstream chain via `next()` and logs the elapsed time once it
//! returns, demonstrating the "defer-style end-time capture" pattern named
//! in §4.5.

use async_trait::async_trait;
use serde_json::Value;

use portway_core::error::GatewayError;

use crate::engine::FilterCtx;
use crate::filter::Filter;

/// Runs first in the chain (a very low priority) so its wrap-around timing
/// covers every other filter plus the backend dispatch.
const PRIORITY: i32 = -1000;

pub struct TimingLoggerFilter;

#[async_trait]
impl Filter for TimingLoggerFilter {
    fn name(&self) -> &str {
        "timing-logger"
    }

    fn priority(&self) -> i32 {
        PRIORITY
    }

    async fn evaluate(&self, ctx: &mut FilterCtx<'_>, _config: &Value) -> Result<(), GatewayError> {
        ctx.next().await;

        tracing::info!(
            request_id = %ctx.request_id,
            method = ctx.request.method.as_str(),
            path = %ctx.request.path,
            status = ctx.response.status,
            elapsed_ms = ctx.elapsed_ms(),
            "request completed",
        );

        Ok(())
    }
}
