//! Caller identity.
//!
//! Authentication happens in front of this service; the authenticated user id
//! arrives in the `X-User-Id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

pub struct RequireUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|val| val.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match user_id {
            Some(id) => Ok(RequireUser(id.to_string())),
            None => {
                warn!("Missing {} header", USER_ID_HEADER);
                Err(ApiError::Unauthorized)
            }
        }
    }
}
