//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Reaction-internal rules differ from the RPC surface: a missing document
//! inside a reaction is a silent no-op, never an error, and webhook routes
//! collapse every failure into a bodyless 400 at the route layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::counters::CounterError;
use crate::identity::IdentityError;
use crate::payments::PaymentError;
use crate::payments::webhook::WebhookError;
use crate::reactors::ReactionError;
use crate::shipping::ShippingError;
use crate::store::StoreError;

/// Application-level error type for the reactor service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller presented no (or an invalid) identity token.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Caller's role does not permit the operation.
    #[error("Authorization denied")]
    AuthorizationDenied,

    /// Inbound webhook failed verification or parsing.
    #[error("Webhook rejected: {0}")]
    Webhook(#[from] WebhookError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Primary store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Counter maintenance failed.
    #[error("Counter error: {0}")]
    Counter(#[from] CounterError),

    /// Payment gateway call failed.
    #[error("Payment gateway error: {0}")]
    Payment(#[from] PaymentError),

    /// Shipping gateway call failed.
    #[error("Shipping gateway error: {0}")]
    Shipping(#[from] ShippingError),

    /// Identity provider call failed.
    #[error("Identity provider error: {0}")]
    Identity(#[from] IdentityError),

    /// A document-change reaction failed partway.
    #[error("Reaction failed: {0}")]
    Reaction(#[from] ReactionError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server-class errors to Sentry
        if matches!(
            self,
            Self::Store(_)
                | Self::Counter(_)
                | Self::Payment(_)
                | Self::Shipping(_)
                | Self::Identity(_)
                | Self::Reaction(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied => StatusCode::FORBIDDEN,
            Self::Webhook(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Counter(_) | Self::Reaction(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Payment(_) | Self::Shipping(_) | Self::Identity(_) => StatusCode::BAD_GATEWAY,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Counter(_) | Self::Reaction(_) => {
                "Internal server error".to_string()
            }
            Self::Payment(_) | Self::Shipping(_) | Self::Identity(_) => {
                "External service error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order-123".to_string());
        assert_eq!(err.to_string(), "Not found: order-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            err.into_response().status()
        }

        assert_eq!(
            get_status(AppError::AuthenticationRequired),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::AuthorizationDenied),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Webhook(WebhookError::MissingSignature)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Payment(PaymentError::MissingField("id"))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::Payment(PaymentError::Api {
            status: 500,
            message: "sk_live_oops".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
