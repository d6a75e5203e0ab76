//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::service::OrderQuery;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// read-only order query, the database pool (for readiness checks) and
/// configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    orders: OrderQuery,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Server configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `orders` - Query handle over the restored order cache
    #[must_use]
    pub fn new(config: ServerConfig, pool: PgPool, orders: OrderQuery) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                orders,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the order query service.
    #[must_use]
    pub fn orders(&self) -> &OrderQuery {
        &self.inner.orders
    }
}
