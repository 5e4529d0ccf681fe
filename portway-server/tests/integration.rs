//! End-to-end pipeline scenarios, driving `portway_server::pipeline::handle_request`
//! and `portway_server::wiring` directly against an in-memory config snapshot —
//! no socket, no real upstream. Mirrors the eight request-lifecycle scenarios
//! the authentication/authorization/filter/reload design notes call out.

use std::collections::HashMap;
use std::sync::Arc;

use portway_auth::authenticator::AuthDeps;
use portway_auth::bearer::BearerAuthenticator;
use portway_auth::jwt::JwtAuthenticator;
use portway_core::context::{Request, Response};
use portway_core::entities::{
    AuthenticationType, Consumer, CredentialCommon, GrantSettings, HttpMethod, Lifespan, OAuth2Credential,
    Operation, Permission, PermissionScope, PermissionType, PluginRef, Service, SubjectType, Token,
};
use portway_core::error::ErrorFactory;
use portway_core::snapshot::{ConfigSnapshot, DecoderRegistry, RawConfigDocument, RawCredential};
use portway_filter::collect::FilterRegistry;
use portway_filter::builtin::TimingLoggerFilter;
use portway_observability::MetricsCollector;
use portway_server::pipeline::{handle_request, PipelineDeps};
use portway_server::wiring;
use portway_store::identity::SimpleIdentifier;
use portway_store::token_store::InMemoryTokenStore;

fn backend_ref() -> PluginRef {
    PluginRef { name: "http".into(), properties: serde_json::json!({}) }
}

fn base_service(auth: AuthenticationType, operations: Vec<Operation>) -> Service {
    Service {
        id: "svc-1".into(),
        hostnames: vec!["example.com".into()],
        uri_prefix: None,
        context_root: None,
        default_version: None,
        scheme: "http".into(),
        authentication_type: auth,
        operations,
        filters: vec![],
        backend: Some(backend_ref()),
    }
}

fn get_op(pattern: &str, permission_ids: Vec<String>) -> Operation {
    Operation {
        name: "op".into(),
        method: HttpMethod::Get,
        uri_pattern: pattern.into(),
        permission_ids,
        claims: vec![],
        filters: vec![],
        backend: None,
    }
}

fn get_request(path: &str, bearer: Option<&str>) -> Request {
    let mut headers = vec![("host".to_string(), "example.com".to_string())];
    if let Some(token) = bearer {
        headers.push(("authorization".to_string(), format!("Bearer {token}")));
    }
    Request {
        method: HttpMethod::Get,
        path: path.to_string(),
        query: String::new(),
        headers,
        body: Vec::new(),
        client_ip: "127.0.0.1".to_string(),
    }
}

fn build_snapshot(doc: RawConfigDocument, registry: &DecoderRegistry) -> Arc<ConfigSnapshot> {
    Arc::new(ConfigSnapshot::build(&doc, registry, 1).expect("snapshot builds"))
}

fn pipeline_deps(authenticators: Vec<Arc<dyn portway_auth::authenticator::Authenticator>>) -> PipelineDeps {
    let metrics = Arc::new(MetricsCollector::new().expect("metrics collector builds"));
    PipelineDeps {
        authenticators,
        filter_registry: wiring::filter_registry(),
        backend_registry: wiring::backend_registry(Arc::clone(&metrics)),
        error_factory: ErrorFactory::empty(),
        metrics,
        log_sink: Arc::new(portway_observability::access_log::RemoteLogSink::disabled()),
        metrics_path: "/metrics".to_string(),
    }
}

fn oauth2_credential(id: &str, client_id: &str, subject_id: &str) -> RawCredential {
    RawCredential {
        id: id.to_string(),
        kind: "oauth2".to_string(),
        properties: serde_json::to_value(OAuth2Credential {
            common: CredentialCommon {
                id: id.to_string(),
                kind: "oauth2".to_string(),
                subject_type: SubjectType::Consumer,
                subject_id: subject_id.to_string(),
                enabled: true,
            },
            client_id: client_id.to_string(),
            client_secret: "shh".to_string(),
            grant_settings: HashMap::new(),
            permission_ids: vec![],
        })
        .unwrap(),
    }
}

fn disabled_oauth2_credential(id: &str, client_id: &str, subject_id: &str) -> RawCredential {
    RawCredential {
        id: id.to_string(),
        kind: "oauth2".to_string(),
        properties: serde_json::to_value(OAuth2Credential {
            common: CredentialCommon {
                id: id.to_string(),
                kind: "oauth2".to_string(),
                subject_type: SubjectType::Consumer,
                subject_id: subject_id.to_string(),
                enabled: false,
            },
            client_id: client_id.to_string(),
            client_secret: "shh".to_string(),
            grant_settings: HashMap::new(),
            permission_ids: vec![],
        })
        .unwrap(),
    }
}

/// Scenario: an opaque bearer token resolves to an enabled consumer
/// credential and the request reaches the backend dispatcher (which, absent
/// a real upstream, surfaces as an internal error rather than a 401/403 —
/// the point is the auth/authorization stages let it through).
#[tokio::test]
async fn happy_path_opaque_bearer_resolves_consumer_and_reaches_dispatch() {
    let registry = wiring::decoder_registry();
    let token_store = Arc::new(InMemoryTokenStore::new());
    token_store
        .create(Token {
            id: "tok-1".into(),
            credential_id: "cred-1".into(),
            grant_type: "client_credentials".into(),
            token_type: "bearer".into(),
            subject: None,
            expiry: 0,
            lifespan: Lifespan::Session,
            permission_ids: vec![],
            claims: HashMap::new(),
            from_token: None,
        })
        .await
        .unwrap();

    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::TwoLegged, vec![get_op("/widgets", vec![])])],
        consumers: vec![Consumer { id: "cons-1".into(), permission_ids: vec![], filters: vec![], plan_id: None }],
        credentials: vec![oauth2_credential("cred-1", "cli-1", "cons-1")],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);

    let deps = AuthDeps { token_store: token_store.clone(), identifier: Arc::new(SimpleIdentifier) };
    let authenticators: Vec<Arc<dyn portway_auth::authenticator::Authenticator>> =
        vec![Arc::new(BearerAuthenticator::new(deps))];
    let pdeps = pipeline_deps(authenticators);

    let response = handle_request(get_request("/widgets", Some("tok-1")), snapshot, &pdeps).await;
    // No real upstream is listening — dispatch fails, but that's past auth/authz.
    assert_ne!(response.status, 401);
    assert_ne!(response.status, 403);
}

/// Scenario: a two-legged service with no presented credential at all is
/// `notAuthenticated`.
#[tokio::test]
async fn missing_credential_on_two_legged_service_is_not_authenticated() {
    let registry = wiring::decoder_registry();
    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::TwoLegged, vec![get_op("/widgets", vec![])])],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);

    let deps = AuthDeps {
        token_store: Arc::new(InMemoryTokenStore::new()),
        identifier: Arc::new(SimpleIdentifier),
    };
    let authenticators: Vec<Arc<dyn portway_auth::authenticator::Authenticator>> =
        vec![Arc::new(BearerAuthenticator::new(deps))];
    let pdeps = pipeline_deps(authenticators);

    let response = handle_request(get_request("/widgets", None), snapshot, &pdeps).await;
    assert_eq!(response.status, 500); // ErrorFactory::empty() has no notAuthenticated template
    let body = String::from_utf8(response.body).unwrap();
    assert!(body.contains("Boom"));
}

/// Scenario: a disabled credential is rejected even though the token itself
/// resolves.
#[tokio::test]
async fn disabled_credential_is_rejected() {
    let registry = wiring::decoder_registry();
    let token_store = Arc::new(InMemoryTokenStore::new());
    token_store
        .create(Token {
            id: "tok-1".into(),
            credential_id: "cred-1".into(),
            grant_type: "client_credentials".into(),
            token_type: "bearer".into(),
            subject: None,
            expiry: 0,
            lifespan: Lifespan::Session,
            permission_ids: vec![],
            claims: HashMap::new(),
            from_token: None,
        })
        .await
        .unwrap();

    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::TwoLegged, vec![get_op("/widgets", vec![])])],
        consumers: vec![Consumer { id: "cons-1".into(), permission_ids: vec![], filters: vec![], plan_id: None }],
        credentials: vec![disabled_oauth2_credential("cred-1", "cli-1", "cons-1")],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);

    let deps = AuthDeps { token_store, identifier: Arc::new(SimpleIdentifier) };
    let authenticators: Vec<Arc<dyn portway_auth::authenticator::Authenticator>> =
        vec![Arc::new(BearerAuthenticator::new(deps))];
    let pdeps = pipeline_deps(authenticators);

    let response = handle_request(get_request("/widgets", Some("tok-1")), snapshot, &pdeps).await;
    assert_eq!(response.status, 500); // credentialDisabled, rendered with no template
}

/// Scenario: an expired JWT is rejected by the JWT authenticator's own
/// signature/claims validation before reaching authorization.
#[tokio::test]
async fn expired_jwt_is_rejected() {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let registry = wiring::decoder_registry();
    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::TwoLegged, vec![get_op("/widgets", vec![])])],
        consumers: vec![Consumer { id: "cons-1".into(), permission_ids: vec![], filters: vec![], plan_id: None }],
        credentials: vec![oauth2_credential("cred-1", "cli-1", "cons-1")],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);

    let mut claims = HashMap::new();
    claims.insert("cid".to_string(), serde_json::json!("cred-1"));
    claims.insert("exp".to_string(), serde_json::json!(1));
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"shh")).unwrap();

    let deps = AuthDeps {
        token_store: Arc::new(InMemoryTokenStore::new()),
        identifier: Arc::new(SimpleIdentifier),
    };
    let authenticators: Vec<Arc<dyn portway_auth::authenticator::Authenticator>> =
        vec![Arc::new(JwtAuthenticator::new(deps, Vec::new()))];
    let pdeps = pipeline_deps(authenticators);

    let response = handle_request(get_request("/widgets", Some(&token)), snapshot, &pdeps).await;
    assert_eq!(response.status, 500); // tokenExpired, rendered with no template
}

/// Scenario: an unroutable path renders `notFound` rather than panicking.
#[tokio::test]
async fn unroutable_path_renders_not_found() {
    let registry = wiring::decoder_registry();
    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::None, vec![get_op("/widgets", vec![])])],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);
    let pdeps = pipeline_deps(vec![]);

    let response = handle_request(get_request("/nonexistent", None), snapshot, &pdeps).await;
    assert_eq!(response.status, 500); // notFound, rendered with no template
}

/// Scenario: an unauthenticated service (authenticationType none) reaches
/// dispatch with no credential at all.
#[tokio::test]
async fn unauthenticated_service_allows_request_through() {
    let registry = wiring::decoder_registry();
    let doc = RawConfigDocument {
        services: vec![base_service(AuthenticationType::None, vec![get_op("/widgets", vec![])])],
        ..Default::default()
    };
    let snapshot = build_snapshot(doc, &registry);
    let pdeps = pipeline_deps(vec![]);

    let response = handle_request(get_request("/widgets", None), snapshot, &pdeps).await;
    // Reaches the backend dispatcher (no upstream, so not a 401).
    assert_ne!(response.status, 401);
}

/// Scenario: the filter chain runs in priority order (timing-logger has a
/// very low priority and wraps the whole chain via `next()`), verified
/// indirectly by confirming a request with the timing filter registered on
/// the service still completes without error once the chain is exhausted.
#[tokio::test]
async fn filter_chain_runs_and_terminates_in_backend_dispatch() {
    let registry = wiring::decoder_registry();
    let mut doc_service = base_service(AuthenticationType::None, vec![get_op("/widgets", vec![])]);
    doc_service.filters = vec![PluginRef { name: "timing-logger".into(), properties: serde_json::Value::Null }];
    let doc = RawConfigDocument { services: vec![doc_service], ..Default::default() };
    let snapshot = build_snapshot(doc, &registry);

    let mut filter_registry = FilterRegistry::new();
    filter_registry.register(Arc::new(TimingLoggerFilter));
    let mut pdeps = pipeline_deps(vec![]);
    pdeps.filter_registry = filter_registry;

    let response = handle_request(get_request("/widgets", None), snapshot, &pdeps).await;
    assert_ne!(response.status, 401);
}

/// Scenario: authorization intersects consumer and identity permission sets
/// for an Entity-kind, Both-scoped permission, writing the intersection into
/// claims — exercised directly against `run_authorization` rather than the
/// full pipeline, since claims aren't observable from the rendered response.
#[tokio::test]
async fn authorization_intersects_consumer_and_identity_actions() {
    use portway_auth::authorization::run_authorization;
    use portway_core::context::RequestContext;
    use portway_core::entities::Identity;
    use portway_core::router::CompiledRouter;

    let permission = Permission {
        id: "perm-1".into(),
        kind: PermissionType::Entity,
        scope: PermissionScope::Both,
        claim_path: vec!["resource".into(), "actions".into()],
        claim_value: serde_json::Value::Null,
    };
    let doc = RawConfigDocument { permissions: vec![permission], ..Default::default() };
    let registry = DecoderRegistry::new();
    let snapshot = Arc::new(ConfigSnapshot::build(&doc, &registry, 1).unwrap());

    let service = Arc::new(base_service(AuthenticationType::None, vec![]));
    let operation = Arc::new(get_op("/x", vec![]));
    let mut ctx = RequestContext::new(
        get_request("/x", None),
        Arc::clone(&snapshot),
        Arc::clone(&service),
        operation,
        vec![],
    );
    ctx.consumer = Some(Consumer {
        id: "cons-1".into(),
        permission_ids: vec!["perm-1:read".into(), "perm-1:write".into()],
        filters: vec![],
        plan_id: None,
    });
    ctx.identity = Some(Identity {
        id: "user-1".into(),
        name: "user-1".into(),
        permission_ids: vec!["perm-1:read".into()],
        claims: HashMap::new(),
    });

    run_authorization(&mut ctx);

    let actions = ctx.claims["resource"]["actions"].clone();
    assert_eq!(actions, serde_json::json!("read"));
}

/// Scenario: the OAuth2 `client_credentials` grant issues a signed JWT when
/// the grant is configured for jwt/finite/access-timeout, and a refresh
/// token is issued for a non-session lifespan with `refresh_token_timeout`
/// set.
#[tokio::test]
async fn oauth2_client_credentials_issues_jwt_with_refresh_token() {
    use portway_auth::oauth2::{handle_token_request, TokenRequest};

    let mut grant_settings = HashMap::new();
    grant_settings.insert(
        "client_credentials".to_string(),
        GrantSettings {
            enabled: true,
            access_token_timeout: Some(3600),
            refresh_token_timeout: Some(7200),
            lifespan: Lifespan::Finite,
            token_type: "jwt".to_string(),
            permission_ids: vec![],
            claims: HashMap::new(),
        },
    );

    let doc = RawConfigDocument {
        credentials: vec![RawCredential {
            id: "cred-1".into(),
            kind: "oauth2".into(),
            properties: serde_json::to_value(OAuth2Credential {
                common: CredentialCommon {
                    id: "cred-1".into(),
                    kind: "oauth2".into(),
                    subject_type: SubjectType::Consumer,
                    subject_id: "cons-1".into(),
                    enabled: true,
                },
                client_id: "cli-1".into(),
                client_secret: "topsecret".into(),
                grant_settings,
                permission_ids: vec![],
            })
            .unwrap(),
        }],
        ..Default::default()
    };
    let registry = wiring::decoder_registry();
    let snapshot = ConfigSnapshot::build(&doc, &registry, 1).unwrap();
    let token_store = InMemoryTokenStore::new();

    let req = TokenRequest {
        grant_type: "client_credentials",
        basic_auth_header: None,
        form_client_id: Some("cli-1"),
        form_client_secret: Some("topsecret"),
        now: 1_000,
    };

    let response = handle_token_request(&snapshot, &token_store, &[], req).await.unwrap();
    assert_eq!(response.token_type, "jwt");
    assert_eq!(response.expires_in, Some(3600));
    assert!(response.refresh_token.is_some());
    assert!(response.access_token.contains('.')); // signed JWT, not an opaque id
}

/// Scenario: a reload that fails to build leaves the previously active
/// snapshot untouched — `reload::build_snapshot` returning `Err` (bad config
/// path here) must never be swapped in by a caller.
#[tokio::test]
async fn failed_reload_build_does_not_affect_caller_decision_to_swap() {
    let result = portway_server::reload::build_snapshot(
        "/nonexistent/path/to/config.yaml",
        &wiring::decoder_registry(),
        2,
    )
    .await;
    assert!(result.is_err());
}

/// Sanity check that `Response::set_header`'s single-occurrence rule — used
/// throughout the pipeline's error rendering — actually replaces rather than
/// accumulates.
#[test]
fn response_set_header_replaces_not_accumulates() {
    let mut response = Response::default();
    response.set_header("content-type", "text/plain");
    response.set_header("content-type", "application/json");
    assert_eq!(response.headers.len(), 1);
    assert_eq!(response.headers[0].1, "application/json");
}
