//! Wires `portway_auth::oauth2`'s grant handler to the HTTP adapter as the
//! special-cased `POST /oauth2/token` route (§4.3 [SUPPLEMENT]) — this
//! endpoint speaks the OAuth2 token-error wire shape, not `ApiError`, so it
//! never goes through the ordinary router/pipeline.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use portway_auth::oauth2::{handle_token_request, TokenEndpointError, TokenRequest};
use portway_auth::token_store::TokenStore;
use portway_core::context::Response;
use portway_core::snapshot::SnapshotHandle;

pub struct Oauth2Deps {
    pub snapshots: Arc<SnapshotHandle>,
    pub token_store: Arc<dyn TokenStore>,
    pub fallback_key: Vec<u8>,
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

/// Parses `application/x-www-form-urlencoded` bodies well enough for the
/// three fields this endpoint reads — no query-string library is warranted
/// for a three-key form.
fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    let body = String::from_utf8_lossy(body);
    body.split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((url_decode(k), url_decode(v)))
        })
        .collect()
}

fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn error_response(err: TokenEndpointError) -> Response {
    let mut response = Response {
        status: err.status(),
        headers: Vec::new(),
        body: serde_json::to_vec(&json!({ "error": err.code() })).unwrap_or_default(),
    };
    response.set_header("content-type", "application/json");
    response
}

pub async fn handle(headers: &[(String, String)], body: &[u8], deps: &Oauth2Deps) -> Response {
    let form = parse_form(body);
    let form_get = |key: &str| form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

    let grant_type = form_get("grant_type").unwrap_or("");
    let snapshot = deps.snapshots.load();

    let request = TokenRequest {
        grant_type,
        basic_auth_header: header(headers, "authorization"),
        form_client_id: form_get("client_id"),
        form_client_secret: form_get("client_secret"),
        now: now_secs(),
    };

    match handle_token_request(&snapshot, deps.token_store.as_ref(), &deps.fallback_key, request).await {
        Ok(token) => {
            let mut response = Response {
                status: 200,
                headers: Vec::new(),
                body: serde_json::to_vec(&token).unwrap_or_default(),
            };
            response.set_header("content-type", "application/json");
            response
        }
        Err(err) => error_response(err),
    }
}
