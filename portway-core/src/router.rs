//! The Router: maps (method, host, path) to an Operation within a Service,
//! materialized once per snapshot build (§4.2). Grounded on the teacher's
//! trie-based `matchit` router with host-constraint pre-compilation; adapted
//! here to be owned by `ConfigSnapshot` (built and swapped together, so a
//! route match and the snapshot it resolves against are always consistent).

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::entities::{HttpMethod, Operation, Service};
use crate::error::{GatewayError, Reason};

#[derive(Debug, Clone)]
struct HostConstraint {
    exact: Vec<String>,
    wildcard_suffixes: Vec<String>,
}

impl HostConstraint {
    fn from_hostnames(hostnames: &[String]) -> Self {
        let mut exact = Vec::new();
        let mut wildcard_suffixes = Vec::new();
        for host in hostnames {
            if let Some(suffix) = host.strip_prefix("*.") {
                wildcard_suffixes.push(suffix.to_string());
            } else {
                exact.push(host.to_lowercase());
            }
        }
        Self { exact, wildcard_suffixes }
    }

    fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard_suffixes.is_empty()
    }

    fn matches(&self, host: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        let host = host.to_lowercase();
        let host = host.split(':').next().unwrap_or(&host);
        if self.exact.iter().any(|h| h == host) {
            return true;
        }
        self.wildcard_suffixes
            .iter()
            .any(|suffix| host.ends_with(suffix.as_str()) && host.len() > suffix.len())
    }
}

/// A resolved route: the owning Service/Operation and any named path
/// parameters extracted by the trie match.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub service: Arc<Service>,
    pub operation: Arc<Operation>,
    pub params: Vec<(String, String)>,
}

#[derive(Clone)]
struct RouteTarget {
    service: Arc<Service>,
    operation: Arc<Operation>,
}

/// The compiled, read-only router for one snapshot. Never mutated after
/// construction — a reload builds a brand new one.
pub struct CompiledRouter {
    method_routers: HashMap<&'static str, MatchitRouter<RouteTarget>>,
    any_method_router: MatchitRouter<Vec<RouteTarget>>,
    host_constraints: HashMap<String, HostConstraint>,
}

fn full_pattern(service: &Service, operation: &Operation) -> String {
    let prefix = service.uri_prefix.as_deref().unwrap_or("");
    format!("{prefix}{}", operation.uri_pattern)
}

impl CompiledRouter {
    /// Builds the router from a snapshot's decoded services. Matching path
    /// is `service.uriPrefix? + operation.uriPattern`, exactly as §4.2
    /// defines; route registration is keyed by (method, pattern).
    pub fn build(services: &[Arc<Service>]) -> Self {
        let mut by_method: HashMap<&'static str, MatchitRouter<RouteTarget>> = HashMap::new();
        let mut any_method: MatchitRouter<Vec<RouteTarget>> = MatchitRouter::new();
        let mut host_constraints = HashMap::new();

        // matchit requires one insert per exact pattern; collect any-method
        // targets per pattern first so repeated patterns across services
        // (different hosts) still produce a single trie entry.
        let mut any_method_targets: HashMap<String, Vec<RouteTarget>> = HashMap::new();

        for service in services {
            let constraint = HostConstraint::from_hostnames(&service.hostnames);
            if !constraint.is_empty() {
                host_constraints.insert(route_key_prefix(service), constraint);
            }

            for operation in &service.operations {
                let pattern = full_pattern(service, operation);
                let target = RouteTarget { service: Arc::clone(service), operation: Arc::clone(operation) };

                let router = by_method.entry(operation.method.as_str()).or_default();
                // First registration for an identical (method, pattern) wins,
                // matching the source's map-keyed `Register` semantics where
                // later inserts under the same key would just overwrite.
                let _ = router.insert(pattern.clone(), target.clone());

                any_method_targets.entry(pattern).or_default().push(target);
            }
        }

        for (pattern, targets) in any_method_targets {
            let _ = any_method.insert(pattern, targets);
        }

        Self { method_routers: by_method, any_method_router: any_method, host_constraints }
    }

    /// Matches a request. `notFound` when no pattern matches at all;
    /// `methodNotAllowed` when the path matches under a different method.
    pub fn match_route(&self, method: HttpMethod, host: &str, path: &str) -> Result<RouteMatch, GatewayError> {
        if let Some(router) = self.method_routers.get(method.as_str()) {
            if let Ok(matched) = router.at(path) {
                if self.host_allowed(&matched.value.service, host) {
                    let params = matched
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    return Ok(RouteMatch {
                        service: Arc::clone(&matched.value.service),
                        operation: Arc::clone(&matched.value.operation),
                        params,
                    });
                }
            }
        }

        if self.any_method_router.at(path).is_ok() {
            return Err(Reason::MethodNotAllowed.into());
        }

        Err(Reason::NotFound.into())
    }

    fn host_allowed(&self, service: &Service, host: &str) -> bool {
        match self.host_constraints.get(&route_key_prefix(service)) {
            Some(constraint) => constraint.matches(host),
            None => true,
        }
    }

}

fn route_key_prefix(service: &Service) -> String {
    service.id.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::AuthenticationType;

    fn service(id: &str, hostnames: &[&str], ops: Vec<Operation>) -> Arc<Service> {
        Arc::new(Service {
            id: id.to_string(),
            hostnames: hostnames.iter().map(|s| s.to_string()).collect(),
            uri_prefix: None,
            context_root: None,
            default_version: None,
            scheme: "http".into(),
            authentication_type: AuthenticationType::None,
            operations: ops,
            filters: vec![],
            backend: None,
        })
    }

    fn op(name: &str, method: HttpMethod, pattern: &str) -> Operation {
        Operation {
            name: name.to_string(),
            method,
            uri_pattern: pattern.to_string(),
            permission_ids: vec![],
            claims: vec![],
            filters: vec![],
            backend: None,
        }
    }

    #[test]
    fn matches_exact_path() {
        let svc = service("svc", &[], vec![op("get-x", HttpMethod::Get, "/x")]);
        let router = CompiledRouter::build(&[svc]);
        let m = router.match_route(HttpMethod::Get, "any", "/x").unwrap();
        assert_eq!(m.operation.name, "get-x");
    }

    #[test]
    fn matches_named_parameters() {
        let svc = service("svc", &[], vec![op("get-item", HttpMethod::Get, "/items/{id}")]);
        let router = CompiledRouter::build(&[svc]);
        let m = router.match_route(HttpMethod::Get, "any", "/items/42").unwrap();
        assert_eq!(m.params, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn wrong_method_is_method_not_allowed() {
        let svc = service("svc", &[], vec![op("get-x", HttpMethod::Get, "/x")]);
        let router = CompiledRouter::build(&[svc]);
        let err = router.match_route(HttpMethod::Post, "any", "/x").unwrap_err();
        assert_eq!(err.reason, Reason::MethodNotAllowed);
    }

    #[test]
    fn unmatched_path_is_not_found() {
        let svc = service("svc", &[], vec![op("get-x", HttpMethod::Get, "/x")]);
        let router = CompiledRouter::build(&[svc]);
        let err = router.match_route(HttpMethod::Get, "any", "/y").unwrap_err();
        assert_eq!(err.reason, Reason::NotFound);
    }

    #[test]
    fn wildcard_host_matches_subdomain() {
        let svc = service("svc", &["*.example.com"], vec![op("get-x", HttpMethod::Get, "/x")]);
        let router = CompiledRouter::build(&[svc]);
        assert!(router.match_route(HttpMethod::Get, "api.example.com", "/x").is_ok());
        assert!(router.match_route(HttpMethod::Get, "example.com", "/x").is_err());
    }

    #[test]
    fn exact_host_rejects_other_hosts() {
        let svc = service("svc", &["example.com"], vec![op("get-x", HttpMethod::Get, "/x")]);
        let router = CompiledRouter::build(&[svc]);
        assert!(router.match_route(HttpMethod::Get, "example.com", "/x").is_ok());
        assert!(router.match_route(HttpMethod::Get, "other.com", "/x").is_err());
    }
}
