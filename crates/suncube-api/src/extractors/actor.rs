//! Caller identity taken from a request header.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the caller's identity for the audit trail.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The caller named in [`ACTOR_HEADER`], if any.
#[derive(Debug, Clone, Default)]
pub struct Actor(pub Option<String>);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self(actor))
    }
}
