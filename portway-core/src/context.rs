//! The abstract Request/Response model and the per-request `RequestContext`
//! bag (data model §3, design note "request context as bundle of optional
//! fields"). Concrete HTTP parsing/serialization is an adapter-shim concern
//! left to the server crate — this module only knows about already-parsed
//! method/path/headers/body.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use crate::entities::{Consumer, HttpMethod, Identity, OAuth2Credential, Operation, Plan, Service, SubjectType};
use crate::error::GatewayError;
use crate::snapshot::ConfigSnapshot;

/// An already-parsed inbound request. Headers preserve insertion order and
/// may repeat a name (multi-value), matching HTTP semantics; lookups are
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub client_ip: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An outbound response under construction. Headers use the same
/// multi-value-with-order model as `Request`.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Replaces every existing occurrence of `name` with a single value —
    /// the "single-occurrence" header-copy rule from §4.6.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Appends a new occurrence of `name` without disturbing existing ones —
    /// the "multi-value" header-copy rule from §4.6.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }
}

/// A tagged-variant credential, per the design note that the source's
/// "is-a Credential" relationship is really common-fields-plus-specialization.
/// OAuth2 is the only credential type the spec names; the variant shape
/// leaves room for others without touching call sites.
#[derive(Debug, Clone)]
pub enum Credential {
    OAuth2(Arc<OAuth2Credential>),
}

impl Credential {
    pub fn subject_type(&self) -> SubjectType {
        match self {
            Credential::OAuth2(c) => c.common.subject_type.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Credential::OAuth2(c) => c.common.enabled,
        }
    }

    pub fn subject_id(&self) -> &str {
        match self {
            Credential::OAuth2(c) => &c.common.subject_id,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Credential::OAuth2(c) => &c.common.id,
        }
    }
}

/// The per-request mutable bag that ties every pipeline stage together.
/// Bound to exactly one `ConfigSnapshot` for its entire lifetime — never
/// promoted across requests (data model §3 ownership rule).
pub struct RequestContext {
    pub request_id: Uuid,
    pub request: Request,
    pub response: Response,
    pub snapshot: Arc<ConfigSnapshot>,

    pub service: Arc<Service>,
    pub operation: Arc<Operation>,
    pub route_params: Vec<(String, String)>,

    pub credential: Option<Credential>,
    pub identity: Option<Identity>,
    pub consumer: Option<Consumer>,
    pub plan: Option<Plan>,

    pub claims: Value,
    pub error: Option<GatewayError>,

    pub upstream_addr: Option<String>,
    pub(crate) start: Instant,
}

impl RequestContext {
    pub fn new(
        request: Request,
        snapshot: Arc<ConfigSnapshot>,
        service: Arc<Service>,
        operation: Arc<Operation>,
        route_params: Vec<(String, String)>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            response: Response::default(),
            snapshot,
            service,
            operation,
            route_params,
            credential: None,
            identity: None,
            consumer: None,
            plan: None,
            claims: Value::Null,
            error: None,
            upstream_addr: None,
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}
