//! Wires the per-request stages together in the order §4 lays them out:
//! route match, authentication, authorization, filter collection, filter
//! chain (which itself invokes the Backend Dispatcher), then error
//! rendering for whatever `ctx.error` holds when the chain stops. Grounded
//! on the teacher's `ando-proxy/src/proxy.rs` request handler, which drives
//! the same phase sequence over its own `Plugin` trait.

use std::sync::Arc;
use std::time::Instant;

use portway_auth::authenticator::{run_authentication_pipeline, Authenticator};
use portway_auth::authorization::run_authorization;
use portway_backend::BackendRegistry;
use portway_core::context::{Request, RequestContext, Response};
use portway_core::entity_writer::write_entity;
use portway_core::error::{ApiError, ErrorFactory, GatewayError, Reason};
use portway_core::snapshot::ConfigSnapshot;
use portway_filter::collect::{collect_filter_chain, FilterRegistry};
use portway_filter::engine;
use portway_observability::access_log::RemoteLogSink;
use portway_observability::{AccessLogEntry, MetricsCollector};

/// Everything the pipeline needs that outlives any one request, assembled
/// once in `wiring` and shared across every connection.
pub struct PipelineDeps {
    pub authenticators: Vec<Arc<dyn Authenticator>>,
    pub filter_registry: FilterRegistry,
    pub backend_registry: BackendRegistry,
    pub error_factory: ErrorFactory,
    pub metrics: Arc<MetricsCollector>,
    pub log_sink: Arc<RemoteLogSink>,
    /// Path the gateway listener serves Prometheus text exposition on,
    /// checked ahead of routing in `http::handle_connection`.
    pub metrics_path: String,
}

/// Runs the full pipeline for one already-parsed `request` against `snapshot`,
/// returning the response that should go back over the wire. Never panics on
/// a malformed or unroutable request — every failure path renders through
/// `ErrorFactory` instead.
pub async fn handle_request(
    request: Request,
    snapshot: Arc<ConfigSnapshot>,
    deps: &PipelineDeps,
) -> Response {
    let start = Instant::now();
    let client_ip = request.client_ip.clone();
    let method = request.method.as_str().to_string();
    let path = request.path.clone();
    let accept = request.header("accept").map(str::to_string);
    let host = request.header("host").unwrap_or("").to_string();

    let route = snapshot.router.match_route(request.method, &host, &path);

    let (mut ctx, service_id) = match route {
        Ok(m) => {
            let service_id = m.service.id.clone();
            let ctx = RequestContext::new(request, Arc::clone(&snapshot), m.service, m.operation, m.params);
            (ctx, service_id)
        }
        Err(err) => {
            let response = render_error(&deps.error_factory, accept.as_deref(), err);
            record(deps, "-", &method, response.status, start, &client_ip, &path, None);
            return response;
        }
    };

    run_stages(&mut ctx, deps).await;

    let status = if let Some(err) = ctx.error.take() {
        let rendered = render_error(&deps.error_factory, accept.as_deref(), err);
        ctx.response = rendered;
        ctx.response.status
    } else {
        ctx.response.status
    };

    record(deps, &service_id, &method, status, start, &client_ip, &path, ctx.upstream_addr.clone());
    ctx.response
}

async fn run_stages(ctx: &mut RequestContext, deps: &PipelineDeps) {
    if let Err(err) = run_authentication_pipeline(ctx, &deps.authenticators).await {
        ctx.error = Some(err);
        return;
    }

    run_authorization(ctx);

    let consumer = ctx.consumer.clone();
    let operation = Arc::clone(&ctx.operation);
    let service = Arc::clone(&ctx.service);

    let slots = match collect_filter_chain(
        &deps.filter_registry,
        consumer.as_ref(),
        &service,
        Some(&operation),
    ) {
        Ok(slots) => slots,
        Err(err) => {
            ctx.error = Some(err);
            return;
        }
    };

    engine::run(ctx, &slots, &deps.backend_registry).await;
}

fn render_error(factory: &ErrorFactory, accept: Option<&str>, err: GatewayError) -> Response {
    let api_error = factory.render("", &err);
    write_api_error(accept, api_error)
}

fn write_api_error(accept: Option<&str>, api_error: ApiError) -> Response {
    let status = api_error.status;
    let (content_type, body) = match write_entity(accept, &api_error) {
        Ok(rendered) => rendered,
        Err(_) => (
            "application/json",
            br#"{"reason":"internalError","message":"Boom"}"#.to_vec(),
        ),
    };
    let mut response = Response { status, headers: Vec::new(), body };
    response.set_header("content-type", content_type);
    response
}

#[allow(clippy::too_many_arguments)]
fn record(
    deps: &PipelineDeps,
    service: &str,
    method: &str,
    status: u16,
    start: Instant,
    client_ip: &str,
    path: &str,
    upstream_addr: Option<String>,
) {
    let elapsed = start.elapsed().as_secs_f64();
    deps.metrics.record_request(service, method, status, elapsed);
    let entry = AccessLogEntry {
        service: service.to_string(),
        method: method.to_string(),
        path: path.to_string(),
        status,
        latency_ms: elapsed * 1000.0,
        client_ip: client_ip.to_string(),
        upstream_addr,
    };
    portway_observability::access_log::emit(&entry);
    deps.log_sink.record(&entry);
}
