use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::audit::RequestContext;
use crate::authz::{IdentityClaims, IdentityContext};
use crate::errors::AppError;

/// The authentication layer leaves validated [`IdentityClaims`] in the request
/// extensions. Missing or malformed claims reject with 401.
#[async_trait]
impl<S> FromRequestParts<S> for IdentityContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<IdentityClaims>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("missing identity"))?;

        IdentityContext::from_claims(claims).map_err(|e| {
            tracing::debug!(error = %e, "rejecting malformed identity");
            AppError::from(e)
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestContext::from_headers(&parts.headers))
    }
}
