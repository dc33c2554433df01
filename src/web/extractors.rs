//! Caller identity taken from request headers.
//!
//! Authentication happens upstream; this layer trusts `x-actor-id` and `x-actor-role`.

use super::errors::ApiError;
use crate::models::{Actor, ActorRole};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The [`Actor`] making the request
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<String, ApiError> {
            let value = parts
                .headers
                .get(name)
                .ok_or_else(|| ApiError::unauthenticated(format!("{name} header is required")))?
                .to_str()
                .map_err(|_| ApiError::unauthenticated(format!("{name} is not valid text")))?
                .trim()
                .to_string();
            if value.is_empty() {
                return Err(ApiError::unauthenticated(format!("{name} is empty")));
            }
            Ok(value)
        };

        let id = header(ACTOR_ID_HEADER)?;
        let role: ActorRole = header(ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(ApiError::unauthenticated)?;
        Ok(Self(Actor::new(id, role)))
    }
}
