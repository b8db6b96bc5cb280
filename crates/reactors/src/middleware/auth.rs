//! Caller identity extraction for the RPC surface.
//!
//! Handlers that take an [`Identity`] parameter reject unauthenticated
//! requests before any handler code runs. The token is the auth frontend's
//! signed bearer token; verification is pure and local (no identity
//! provider round trip per request).

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;

use crate::error::AppError;
use crate::identity::{Identity, verify_token};
use crate::state::AppState;

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::AuthenticationRequired)?;

        verify_token(
            token,
            &state.config().identity.token_secret,
            Utc::now().timestamp(),
        )
        .map_err(|_| AppError::AuthenticationRequired)
    }
}
