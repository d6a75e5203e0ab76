//! In-memory read cache of orders keyed by `order_uid`.
//!
//! The cache is a projection of the durable store: entries are added only
//! after the owning transaction commits, or in bulk when the store is read
//! back at startup. Entries are never evicted or expired.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use orderflow_core::{Order, OrderUid};

/// Shared, cheaply cloneable handle to the order cache.
///
/// Readers share the lock; `put` and `load` take it exclusively. Orders are
/// stored behind `Arc`, so a reader gets either the previous order or the new
/// one in full, never a mix.
#[derive(Clone, Default)]
pub struct OrderCache {
    inner: Arc<RwLock<HashMap<OrderUid, Arc<Order>>>>,
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an order by identifier.
    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.inner.read().await.get(order_uid).cloned()
    }

    /// Insert or replace an order.
    pub async fn put(&self, order: Order) {
        let order_uid = order.order_uid.clone();
        self.inner.write().await.insert(order_uid, Arc::new(order));
    }

    /// Bulk-insert orders under a single write lock. Returns how many entries
    /// were added or replaced.
    pub async fn load(&self, orders: impl IntoIterator<Item = Order>) -> usize {
        let mut map = self.inner.write().await;
        let mut loaded = 0;
        for order in orders {
            map.insert(order.order_uid.clone(), Arc::new(order));
            loaded += 1;
        }
        loaded
    }

    /// Number of cached orders.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the cache holds no orders.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
