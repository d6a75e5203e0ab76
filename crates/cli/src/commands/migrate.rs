//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! of-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `ORDERFLOW_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! The schema lives in `crates/server/migrations/` and is embedded into the
//! binary at compile time.

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending migrations to the order database.
///
/// # Errors
///
/// Returns `MigrationError` if the database URL is not set, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("ORDERFLOW_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar("ORDERFLOW_DATABASE_URL"))?;

    tracing::info!("Connecting to order database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running order migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Order migrations complete!");
    Ok(())
}
