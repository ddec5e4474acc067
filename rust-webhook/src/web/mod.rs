//! Web server module for handling inbound 17TRACK webhooks.
//!
//! This module provides:
//! - A liveness probe at `GET /`
//! - The signed push endpoint at `POST /webhook/17track`

pub mod handlers;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, track17_webhook, AppState, WebhookError, HEALTH_MESSAGE, MAX_BODY_BYTES,
};
pub use signature::{sign, verify_signature};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/webhook/17track", post(track17_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
