//! The opaque-token `Authenticator` (§4.3 "Bearer authenticator"). Handles
//! `Authorization: Bearer <token>` values that lack a `.` — dotted values
//! are left for the JWT authenticator, per the boundary case in §8.

use async_trait::async_trait;

use portway_core::context::RequestContext;
use portway_core::entities::Lifespan;
use portway_core::error::{GatewayError, Reason};

use crate::authenticator::{bearer_token_from_header, AuthDeps, AuthOutcome, Authenticator};

pub struct BearerAuthenticator {
    deps: AuthDeps,
}

impl BearerAuthenticator {
    pub fn new(deps: AuthDeps) -> Self {
        Self { deps }
    }
}

fn bearer_token(ctx: &RequestContext) -> Option<&str> {
    bearer_token_from_header(ctx.request.header("authorization"))
}

#[async_trait]
impl Authenticator for BearerAuthenticator {
    fn name(&self) -> &str {
        "bearer"
    }

    async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthOutcome, GatewayError> {
        let Some(token_id) = bearer_token(ctx) else {
            return Ok(AuthOutcome::Decline);
        };
        let token_id = token_id.trim();
        if token_id.contains('.') {
            // JWT-shaped — not ours.
            return Ok(AuthOutcome::Decline);
        }

        let token = self
            .deps
            .token_store
            .get(token_id)
            .await
            .map_err(|_| GatewayError::from(Reason::InternalError))?
            .ok_or(Reason::InvalidToken)?;

        let credential = ctx
            .snapshot
            .credential_by_id(&token.credential_id)
            .ok_or(Reason::InvalidCredential)?;

        let identity = match &token.subject {
            Some(subject) => self
                .deps
                .identifier
                .resolve(subject)
                .await
                .map_err(|_| GatewayError::from(Reason::InternalError))?,
            None => None,
        };

        if token.lifespan == Lifespan::Session {
            self.deps
                .token_store
                .touch(&token.id)
                .await
                .map_err(|_| GatewayError::from(Reason::InternalError))?;
        }

        Ok(AuthOutcome::Success { credential, identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_bearer_header() {
        assert_eq!(bearer_token_from_header(Some("Bearer tok-123")), Some("tok-123"));
    }

    #[test]
    fn accepts_lowercase_scheme() {
        assert_eq!(bearer_token_from_header(Some("bearer tok-123")), Some("tok-123"));
    }

    #[test]
    fn missing_header_yields_none() {
        assert_eq!(bearer_token_from_header(None), None);
    }

    #[test]
    fn wrong_scheme_yields_none() {
        assert_eq!(bearer_token_from_header(Some("Basic dXNlcjpwYXNz")), None);
    }

    #[test]
    fn dotted_value_is_left_for_jwt_authenticator() {
        let token = bearer_token_from_header(Some("Bearer a.b.c")).unwrap();
        assert!(token.contains('.'));
    }
}
