//! Order lookup handlers.
//!
//! Both routes read from the cache only. An identifier that is unknown,
//! empty or malformed is a plain 404.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::debug;

use orderflow_core::Order;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query string for `GET /order`.
#[derive(Debug, Deserialize)]
pub struct OrderLookup {
    /// Order identifier; a missing `id` looks up the empty identifier.
    #[serde(default)]
    pub id: String,
}

/// `GET /order?id=<order_uid>`
pub async fn by_query(
    State(state): State<AppState>,
    Query(lookup): Query<OrderLookup>,
) -> Result<Json<Order>> {
    find(&state, lookup.id).await
}

/// `GET /orders/{order_uid}`
pub async fn by_path(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>> {
    find(&state, order_uid).await
}

async fn find(state: &AppState, order_uid: String) -> Result<Json<Order>> {
    match state.orders().lookup(&order_uid).await {
        Some(order) => Ok(Json(Order::clone(&order))),
        None => {
            debug!(order_uid = %order_uid, "Order not in cache");
            Err(AppError::NotFound(order_uid))
        }
    }
}
