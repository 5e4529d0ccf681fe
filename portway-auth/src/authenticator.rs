//! The Authentication Pipeline (§4.3): an ordered list of `Authenticator`s,
//! the first non-declining one wins. Grounded on the teacher's `Plugin`
//! access-phase contract, narrowed to the one decision this stage makes.

use async_trait::async_trait;
use std::sync::Arc;

use portway_core::context::{Credential, RequestContext};
use portway_core::entities::{AuthenticationType, SubjectType};
use portway_core::error::{GatewayError, Reason};

use crate::identity::Identifier;
use crate::token_store::TokenStore;

/// What an `Authenticator` found for this request.
pub enum AuthOutcome {
    /// No applicable credential material present; try the next authenticator.
    Decline,
    /// A credential (and, for three-legged flows, an identity) was found.
    Success { credential: Credential, identity: Option<portway_core::entities::Identity> },
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Inspects the request and returns `Decline`, `Success`, or propagates
    /// an error that aborts the pipeline outright (e.g. a malformed token
    /// that *did* present credential material, just invalid).
    async fn authenticate(&self, ctx: &RequestContext) -> Result<AuthOutcome, GatewayError>;
}

/// Runs the ordered authenticator list against `ctx`, installing credential/
/// identity/consumer/plan on the first success, per §4.3's full algorithm
/// (including the three-legged identity requirement).
pub async fn run_authentication_pipeline(
    ctx: &mut RequestContext,
    authenticators: &[Arc<dyn Authenticator>],
) -> Result<(), GatewayError> {
    let mut produced = false;

    for authenticator in authenticators {
        match authenticator.authenticate(ctx).await? {
            AuthOutcome::Decline => continue,
            AuthOutcome::Success { credential, identity } => {
                if credential.subject_type() != SubjectType::Consumer {
                    return Err(Reason::InvalidCredential.into());
                }
                if !credential.enabled() {
                    return Err(Reason::CredentialDisabled.into());
                }
                let consumer = ctx
                    .snapshot
                    .consumer(credential.subject_id())
                    .ok_or(Reason::InvalidCredential)?;
                let plan = match &consumer.plan_id {
                    Some(plan_id) => Some(
                        ctx.snapshot
                            .plan(plan_id)
                            .ok_or(Reason::InternalError)?,
                    ),
                    None => None,
                };

                ctx.identity = identity;
                ctx.consumer = Some((*consumer).clone());
                ctx.plan = plan.map(|p| (*p).clone());
                ctx.credential = Some(credential);
                produced = true;
                break;
            }
        }
    }

    if !produced {
        if ctx.service.authentication_type != AuthenticationType::None {
            return Err(Reason::NotAuthenticated.into());
        }
        return Ok(());
    }

    if ctx.service.authentication_type == AuthenticationType::ThreeLegged && ctx.identity.is_none() {
        return Err(Reason::NotAuthenticated.into());
    }

    Ok(())
}

/// Extracts the raw bearer value from an `Authorization` header, shared by
/// the bearer and JWT authenticators — they differ only in what they do
/// with the value once extracted.
pub(crate) fn bearer_token_from_header(header: Option<&str>) -> Option<&str> {
    let header = header?;
    header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))
}

/// Shared dependencies every bundled `Authenticator` needs — the bearer and
/// JWT authenticators both read tokens and resolve identities, so the
/// registrations in `portway-server` build this once and clone the `Arc`s in.
#[derive(Clone)]
pub struct AuthDeps {
    pub token_store: Arc<dyn TokenStore>,
    pub identifier: Arc<dyn Identifier>,
}
