//! The `Filter` trait (§4.5): a named, priority-ordered interceptor.

use async_trait::async_trait;
use serde_json::Value;

use portway_core::error::GatewayError;

use crate::engine::FilterCtx;

#[async_trait]
pub trait Filter: Send + Sync {
    /// The filter's canonical name — used for registry lookup and for
    /// grouping same-named config entries collected from consumer/service/
    /// operation, never the raw name string from a single config entry
    /// (§9 Open Question #5).
    fn name(&self) -> &str;

    /// Execution priority; groups are sorted ascending, ties preserve
    /// collection order (consumer, service, operation).
    fn priority(&self) -> i32 {
        0
    }

    /// Combines multiple config entries collected for this filter's name
    /// into the single config `evaluate` will run with. The capability is
    /// optional: filters that don't override this get the first entry,
    /// matching §4.5's "otherwise use the first config" fallback.
    fn combine(&self, configs: &[Value]) -> Value {
        configs.first().cloned().unwrap_or(Value::Null)
    }

    async fn evaluate(&self, ctx: &mut FilterCtx<'_>, config: &Value) -> Result<(), GatewayError>;
}
