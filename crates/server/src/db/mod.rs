//! Durable storage for orders in `PostgreSQL`.
//!
//! # Tables
//!
//! - `orders` - One row per order, keyed by `order_uid`
//! - `delivery` - One row per order
//! - `payment` - One row per order
//! - `items` - One row per item, with its `position` in the order's list
//!
//! # Migrations
//!
//! The schema lives in `crates/server/migrations/` and is applied via:
//! ```bash
//! cargo run -p orderflow-cli -- migrate
//! ```

pub mod orders;

use std::future::Future;
use std::time::Duration;

use orderflow_core::Order;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use orders::OrderRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// What a successful [`OrderStore::persist`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// All rows for the order were written and committed.
    Inserted,
    /// An order with the same `order_uid` already existed; nothing was written.
    Duplicate,
}

/// Durable order storage used by the ingestion service.
///
/// `persist` is all-or-nothing across the four relations. Implementations
/// must be safe to call concurrently for different orders.
pub trait OrderStore: Send + Sync + 'static {
    /// Write the order and everything it owns as one atomic unit.
    fn persist(
        &self,
        order: &Order,
    ) -> impl Future<Output = Result<PersistOutcome, RepositoryError>> + Send;

    /// Read back every stored order in full.
    fn load_all(&self) -> impl Future<Output = Result<Vec<Order>, RepositoryError>> + Send;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
