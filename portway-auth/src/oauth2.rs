//! The OAuth2 `client_credentials` grant handler bound to `POST /oauth2/token`
//! (§4.3 [SUPPLEMENT]). A distinct wire contract from the gateway's own
//! `ApiError` — this speaks the standard OAuth2 token-error shape instead.

use std::collections::HashMap as StdHashMap;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use portway_core::context::Credential;
use portway_core::entities::{GrantSettings, Lifespan, Token};
use portway_core::snapshot::ConfigSnapshot;

use crate::basic::parse_basic_auth;
use crate::token_store::TokenStore;

const GRANT_CLIENT_CREDENTIALS: &str = "client_credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEndpointError {
    /// 400 — `grant_type` absent or not `client_credentials`.
    UnsupportedGrantType,
    /// 401 — client credentials missing, unknown, disabled, or the grant
    /// isn't enabled for this client.
    UnauthorizedClient,
}

impl TokenEndpointError {
    pub fn status(&self) -> u16 {
        match self {
            TokenEndpointError::UnsupportedGrantType => 400,
            TokenEndpointError::UnauthorizedClient => 401,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TokenEndpointError::UnsupportedGrantType => "unsupported_grant_type",
            TokenEndpointError::UnauthorizedClient => "unauthorized_client",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Everything the handler needs out of an already-parsed token request: the
/// requested grant, the client credentials (wherever they came from — Basic
/// header takes precedence over form fields, per convention), and `now` for
/// expiry math (passed in so this stays free of wall-clock calls).
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub basic_auth_header: Option<&'a str>,
    pub form_client_id: Option<&'a str>,
    pub form_client_secret: Option<&'a str>,
    pub now: i64,
}

fn resolve_client_credentials(req: &TokenRequest<'_>) -> Option<(String, String)> {
    if let Some(header) = req.basic_auth_header {
        if let Some(pair) = parse_basic_auth(header) {
            return Some(pair);
        }
    }
    match (req.form_client_id, req.form_client_secret) {
        (Some(id), Some(secret)) => Some((id.to_string(), secret.to_string())),
        _ => None,
    }
}

pub async fn handle_token_request(
    snapshot: &ConfigSnapshot,
    token_store: &dyn TokenStore,
    fallback_key: &[u8],
    req: TokenRequest<'_>,
) -> Result<TokenResponse, TokenEndpointError> {
    if req.grant_type != GRANT_CLIENT_CREDENTIALS {
        return Err(TokenEndpointError::UnsupportedGrantType);
    }

    let (client_id, client_secret) =
        resolve_client_credentials(&req).ok_or(TokenEndpointError::UnauthorizedClient)?;

    let Credential::OAuth2(credential) = snapshot
        .oauth2_credential_by_client_id(&client_id)
        .ok_or(TokenEndpointError::UnauthorizedClient)?;

    if !credential.common.enabled || credential.client_secret != client_secret {
        return Err(TokenEndpointError::UnauthorizedClient);
    }

    let grant: &GrantSettings = credential
        .grant_settings
        .get(GRANT_CLIENT_CREDENTIALS)
        .filter(|g| g.enabled)
        .ok_or(TokenEndpointError::UnauthorizedClient)?;

    let _ = fallback_key; // client_credentials tokens are always signed/scoped to the issuing client

    let expires_in = grant.access_token_timeout;
    let expiry = expires_in.map(|t| req.now + t as i64).unwrap_or(req.now);

    let issue_jwt = grant.token_type.eq_ignore_ascii_case("jwt")
        && grant.lifespan == Lifespan::Finite
        && grant.access_token_timeout.is_some();

    let access_token = if issue_jwt {
        encode_access_jwt(&credential.client_secret, &credential.common.id, grant, req.now, expiry)
    } else {
        let id = Uuid::new_v4().to_string();
        let token = Token {
            id: id.clone(),
            credential_id: credential.common.id.clone(),
            grant_type: GRANT_CLIENT_CREDENTIALS.to_string(),
            token_type: grant.token_type.clone(),
            subject: None,
            expiry,
            lifespan: grant.lifespan,
            permission_ids: grant.permission_ids.clone(),
            claims: grant.claims.clone(),
            from_token: None,
        };
        token_store
            .create(token)
            .await
            .map_err(|_| TokenEndpointError::UnauthorizedClient)?;
        id
    };

    let refresh_token = if let Some(refresh_timeout) = grant.refresh_token_timeout {
        if grant.lifespan != Lifespan::Session {
            let refresh_id = Uuid::new_v4().to_string();
            let refresh = Token {
                id: refresh_id.clone(),
                credential_id: credential.common.id.clone(),
                grant_type: GRANT_CLIENT_CREDENTIALS.to_string(),
                token_type: "refresh".to_string(),
                subject: None,
                expiry: req.now + refresh_timeout as i64,
                lifespan: grant.lifespan,
                permission_ids: Vec::new(),
                claims: StdHashMap::new(),
                from_token: Some(access_token.clone()),
            };
            token_store
                .create(refresh)
                .await
                .map_err(|_| TokenEndpointError::UnauthorizedClient)?;
            Some(refresh_id)
        } else {
            None
        }
    } else {
        None
    };

    Ok(TokenResponse {
        access_token,
        token_type: grant.token_type.clone(),
        expires_in,
        refresh_token,
    })
}

fn encode_access_jwt(
    client_secret: &str,
    credential_id: &str,
    grant: &GrantSettings,
    now: i64,
    expiry: i64,
) -> String {
    let mut claims: StdHashMap<String, Value> = grant.claims.clone();
    claims.insert("jti".to_string(), Value::String(Uuid::new_v4().to_string()));
    claims.insert("iat".to_string(), Value::from(now));
    claims.insert("exp".to_string(), Value::from(expiry));
    claims.insert("cid".to_string(), Value::String(credential_id.to_string()));

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(client_secret.as_bytes()),
    )
    .expect("HS256 encoding of a plain claims map never fails")
}
