//! HTTP surface of the reactor service.
//!
//! Three groups of endpoints:
//! - `/events/{collection}` - change-stream pushes from the primary store
//! - `/rpc/{name}` - caller-authenticated callable operations
//! - `/webhooks/...` - inbound deliveries from the payment and shipping
//!   gateways

pub mod events;
pub mod rpc;
pub mod webhooks;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router over a prepared state.
///
/// Exposed (rather than buried in `main`) so tests can drive the exact
/// production routing with fake gateways behind the state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/events", events::routes())
        .nest("/rpc", rpc::routes())
        .nest("/webhooks", webhooks::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().get("health", "probe").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
