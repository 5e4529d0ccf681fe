//! The JWT `Authenticator` (§4.3 "JWT authenticator"). Handles
//! `Authorization: Bearer <token>` values that contain a `.`; opaque values
//! are left for the bearer authenticator.
//!
//! Resolves §9 Open Question #3/#4: key selection reads the `cid` claim by
//! name (not a hardcoded field), and the decode error is checked before any
//! claims are trusted.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;

use portway_core::context::{Credential, RequestContext};
use portway_core::error::{GatewayError, Reason};

use crate::authenticator::{bearer_token_from_header, AuthDeps, AuthOutcome, Authenticator};

type Claims = HashMap<String, Value>;

pub struct JwtAuthenticator {
    deps: AuthDeps,
    /// Fallback HMAC key used when a token's `cid` claim doesn't resolve to
    /// a known credential, per §4.3: "falling back to a globally configured
    /// HMAC key".
    fallback_key: Vec<u8>,
}

impl JwtAuthenticator {
    pub fn new(deps: AuthDeps, fallback_key: Vec<u8>) -> Self {
        Self { deps, fallback_key }
    }
}

fn bearer_token(ctx: &RequestContext) -> Option<&str> {
    bearer_token_from_header(ctx.request.header("authorization"))
}

/// Reads `key` out of an already-decoded claims map. Resolves §9 Open
/// Question #3 — the source hardcodes `"cid"` regardless of the requested
/// key; this honors the argument.
fn get_claim_string(claims: &Claims, key: &str) -> Option<String> {
    claims.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Decodes the claims segment without verifying the signature, solely to
/// read `cid` for key selection. A malformed payload here is reported as
/// `tokenMalformed` by the caller, not silently ignored.
fn peek_claims(token: &str) -> Result<Claims, GatewayError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims.clear();
    let data = decode::<Claims>(token, &DecodingKey::from_secret(b""), &validation)
        .map_err(|_| GatewayError::from(Reason::TokenMalformed))?;
    Ok(data.claims)
}

fn classify_jwt_error(err: &jsonwebtoken::errors::Error) -> Reason {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => Reason::TokenExpired,
        ErrorKind::ImmatureSignature => Reason::TokenNotYetActive,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            Reason::TokenMalformed
        }
        _ => Reason::InvalidCredential,
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn name(&self) -> &str {
        "jwt"
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthOutcome, GatewayError> {
        let Some(token) = bearer_token(ctx) else {
            return Ok(AuthOutcome::Decline);
        };
        let token = token.trim();
        if !token.contains('.') {
            // Opaque — not ours.
            return Ok(AuthOutcome::Decline);
        }

        let peeked = peek_claims(token)?;
        let cid = get_claim_string(&peeked, "cid");

        let (decoding_key, credential): (DecodingKey, Option<Credential>) = match cid
            .as_deref()
            .and_then(|cid| ctx.snapshot.credential_by_id(cid))
        {
            Some(Credential::OAuth2(oauth2)) => {
                let key = DecodingKey::from_secret(oauth2.client_secret.as_bytes());
                (key, Some(Credential::OAuth2(oauth2)))
            }
            None => (DecodingKey::from_secret(&self.fallback_key), None),
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| GatewayError::from(classify_jwt_error(&e)))?;

        let credential = match credential {
            Some(c) => c,
            None => {
                // No `cid` resolved to a credential even though the signature
                // verified against the fallback key — the caller must still
                // be tied to a consumer, which an unresolved credential can't
                // provide.
                return Err(Reason::InvalidCredential.into());
            }
        };

        let identity = match get_claim_string(&data.claims, "sub") {
            Some(sub) => self
                .deps
                .identifier
                .resolve(&sub)
                .await
                .map_err(|_| GatewayError::from(Reason::InternalError))?,
            None => None,
        };

        Ok(AuthOutcome::Success { credential, identity })
    }
}
