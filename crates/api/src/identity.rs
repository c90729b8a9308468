//! Caller identity as established by the upstream auth collaborator.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("Authentication required".to_string()))?;

        header
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthenticated("Invalid X-User-Id header".to_string()))
    }
}
