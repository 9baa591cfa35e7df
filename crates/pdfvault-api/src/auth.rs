//! Acting-user extraction.
//!
//! Authentication and session management are handled by an upstream gateway,
//! which injects the authenticated user id in the `x-user-id` header. Every
//! core operation is scoped to that user; a request without a valid header is
//! rejected before any handler runs.

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::error::ErrorResponse;

/// Header carrying the authenticated user id, set by the gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The acting user for a request.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());

        match user_id {
            Some(user_id) => Ok(UserContext { user_id }),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "Missing or invalid authenticated user",
                    "MISSING_USER_CONTEXT",
                )),
            )),
        }
    }
}
