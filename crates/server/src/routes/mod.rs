//! HTTP routes for the read API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness check
//! GET  /health/ready           - Readiness check (database reachable)
//! GET  /order?id=<order_uid>   - Order lookup by query string
//! GET  /orders/{order_uid}     - Order lookup by path
//! ```

pub mod orders;

use axum::{Router, extract::State, routing::get};
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::state::AppState;

/// Build the application router with state attached.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/order", get(orders::by_query))
        .route("/orders/{order_uid}", get(orders::by_path))
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
/// Verifies database connectivity before returning OK.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> Result<&'static str> {
    sqlx::query("SELECT 1").fetch_one(state.pool()).await?;
    Ok("ok")
}
