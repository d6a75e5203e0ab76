//! Order ingestion and query services.
//!
//! [`OrderService`] owns the durable store and the read cache and is built
//! once at startup, then shared with the stream consumer. [`OrderQuery`] is
//! the read-only view handed to the HTTP layer.
//!
//! One message is one unit of work:
//! 1. Decode the payload into an [`Order`]
//! 2. Check the payload is a well-formed JSON object, then validate the order
//! 3. Persist it (all four relations commit together or not at all)
//! 4. Put it in the cache, only after the commit
//!
//! Acknowledging the message is the consumer's job and happens after this
//! returns.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use orderflow_core::{DecodeError, Order, OrderUid, ValidationError};

use crate::cache::OrderCache;
use crate::db::{OrderStore, PersistOutcome, RepositoryError};

/// Why a message could not be ingested.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The payload does not decode into an order.
    #[error("decode failed: {0}")]
    Decode(#[source] DecodeError),

    /// The payload decoded but is not a well-formed JSON object.
    #[error("malformed payload: {0}")]
    Malformed(#[source] DecodeError),

    /// The order failed field validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The durable write failed and was rolled back.
    #[error("persisting order {order_uid} failed: {source}")]
    Persist {
        order_uid: OrderUid,
        #[source]
        source: RepositoryError,
    },
}

impl IngestError {
    /// Whether handling the same payload again could succeed.
    ///
    /// Decode, structure and validation failures are properties of the
    /// payload and will fail identically on every delivery.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persist { .. })
    }
}

/// Result of successfully handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The order was committed and cached.
    Stored(OrderUid),
    /// The order was already stored; nothing changed.
    Duplicate(OrderUid),
}

impl IngestOutcome {
    /// Identifier of the order the message carried.
    #[must_use]
    pub const fn order_uid(&self) -> &OrderUid {
        match self {
            Self::Stored(uid) | Self::Duplicate(uid) => uid,
        }
    }
}

/// Ingestion service: the one owner of the store and the cache.
pub struct OrderService<S> {
    store: S,
    cache: OrderCache,
}

impl<S: OrderStore> OrderService<S> {
    /// Create a new order service.
    #[must_use]
    pub const fn new(store: S, cache: OrderCache) -> Self {
        Self { store, cache }
    }

    /// Get a reference to the durable store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read-only query handle sharing this service's cache.
    #[must_use]
    pub fn query(&self) -> OrderQuery {
        OrderQuery::new(self.cache.clone())
    }

    /// Rebuild the cache from the durable store.
    ///
    /// Must finish before the query API is exposed and before the consumer
    /// starts, otherwise early lookups miss orders that exist durably.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<usize, RepositoryError> {
        let orders = self.store.load_all().await?;
        let restored = self.cache.load(orders).await;
        info!(restored, "Order cache restored from database");
        Ok(restored)
    }

    /// Handle one message payload end to end.
    ///
    /// The cache is updated only when the store reports a committed insert.
    /// A duplicate `order_uid` is a no-op: the first stored version wins and
    /// stays cached.
    ///
    /// # Errors
    ///
    /// Returns `IngestError` describing the step that failed. Nothing is
    /// cached on error.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let order = Order::decode(payload).map_err(IngestError::Decode)?;
        Order::check_structure(payload).map_err(IngestError::Malformed)?;
        order.validate()?;

        let order_uid = order.order_uid.clone();
        let outcome = self
            .store
            .persist(&order)
            .await
            .map_err(|source| IngestError::Persist {
                order_uid: order_uid.clone(),
                source,
            })?;

        match outcome {
            PersistOutcome::Inserted => {
                self.cache.put(order).await;
                debug!(order_uid = %order_uid, "Order stored and cached");
                Ok(IngestOutcome::Stored(order_uid))
            }
            PersistOutcome::Duplicate => {
                warn!(order_uid = %order_uid, "Duplicate order ignored");
                Ok(IngestOutcome::Duplicate(order_uid))
            }
        }
    }

    /// Look up an order in the cache.
    pub async fn lookup(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.cache.get(order_uid).await
    }
}

/// Read-only order lookups served from the cache.
///
/// Never touches the database. Unknown and malformed identifiers both come
/// back as `None`.
#[derive(Clone, Default)]
pub struct OrderQuery {
    cache: OrderCache,
}

impl OrderQuery {
    /// Create a query handle over a cache.
    #[must_use]
    pub const fn new(cache: OrderCache) -> Self {
        Self { cache }
    }

    /// Look up an order by identifier.
    pub async fn lookup(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.cache.get(order_uid).await
    }

    /// Number of orders currently served.
    pub async fn len(&self) -> usize {
        self.cache.len().await
    }

    /// Whether no orders are served yet.
    pub async fn is_empty(&self) -> bool {
        self.cache.is_empty().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use orderflow_core::fixtures;

    use super::*;

    /// In-memory store with the same all-or-nothing and first-write-wins
    /// behavior as the `PostgreSQL` repository.
    #[derive(Default)]
    struct MemoryStore {
        orders: Mutex<HashMap<OrderUid, Order>>,
        fail_writes: AtomicBool,
        persist_calls: AtomicUsize,
    }

    impl MemoryStore {
        fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
            let store = Self::default();
            {
                let mut map = store.orders.lock().unwrap();
                for order in orders {
                    map.insert(order.order_uid.clone(), order);
                }
            }
            store
        }

        fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn persist_calls(&self) -> usize {
            self.persist_calls.load(Ordering::SeqCst)
        }

        fn stored(&self, order_uid: &str) -> Option<Order> {
            self.orders.lock().unwrap().get(order_uid).cloned()
        }
    }

    impl OrderStore for MemoryStore {
        async fn persist(&self, order: &Order) -> Result<PersistOutcome, RepositoryError> {
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
            }
            let mut map = self.orders.lock().unwrap();
            if map.contains_key(&order.order_uid) {
                return Ok(PersistOutcome::Duplicate);
            }
            map.insert(order.order_uid.clone(), order.clone());
            Ok(PersistOutcome::Inserted)
        }

        async fn load_all(&self) -> Result<Vec<Order>, RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(self.orders.lock().unwrap().values().cloned().collect())
        }
    }

    fn service() -> OrderService<MemoryStore> {
        OrderService::new(MemoryStore::default(), OrderCache::new())
    }

    fn payload(order: &Order) -> Vec<u8> {
        serde_json::to_vec(order).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_stores_and_caches() {
        let service = service();
        let order = fixtures::sample_order("stored-1");

        let outcome = service.ingest(&payload(&order)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Stored(OrderUid::new("stored-1")));
        assert_eq!(*service.lookup("stored-1").await.unwrap(), order);
        assert_eq!(service.store().stored("stored-1"), Some(order));
    }

    #[tokio::test]
    async fn test_end_to_end_single_item_order() {
        let service = service();
        let mut order = fixtures::sample_order("abc123");
        order.track_number = "T1".to_owned();
        order.items.truncate(1);

        service.ingest(&payload(&order)).await.unwrap();

        let found = service.query().lookup("abc123").await.unwrap();
        assert_eq!(found.order_uid.as_str(), "abc123");
        assert_eq!(found.track_number, "T1");
        assert_eq!(found.items.len(), 1);
        assert_eq!(*found, order);
    }

    #[tokio::test]
    async fn test_decode_error_is_dropped_before_store() {
        let service = service();
        let err = service.ingest(b"{not json").await.unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        assert!(!err.is_retryable());
        assert_eq!(service.store().persist_calls(), 0);
        assert!(service.query().is_empty().await);
    }

    #[tokio::test]
    async fn test_non_object_payload_is_malformed() {
        let service = service();
        let order = fixtures::sample_order("array");
        let value = serde_json::to_value(&order).unwrap();
        let fields: Vec<serde_json::Value> = [
            "order_uid",
            "track_number",
            "entry",
            "delivery",
            "payment",
            "items",
            "locale",
            "internal_signature",
            "customer_id",
            "delivery_service",
            "shardkey",
            "sm_id",
            "date_created",
            "oof_shard",
        ]
        .iter()
        .map(|f| value[*f].clone())
        .collect();

        let err = service
            .ingest(&serde_json::to_vec(&fields).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Malformed(DecodeError::NotAnObject)));
        assert_eq!(service.store().persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_validation_error_is_dropped_before_store() {
        let service = service();
        let mut order = fixtures::sample_order("invalid");
        order.items[0].sale = 250;

        let err = service.ingest(&payload(&order)).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert_eq!(service.store().persist_calls(), 0);
        assert!(service.lookup("invalid").await.is_none());
    }

    #[tokio::test]
    async fn test_nul_character_is_a_validation_error() {
        let service = service();
        let mut order = fixtures::sample_order("nul");
        order.delivery.city = "Mos\u{0}cow".to_owned();

        let err = service.ingest(&payload(&order)).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(!err.is_retryable());
        assert_eq!(service.store().persist_calls(), 0);
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_cache_untouched() {
        let service = service();
        service.store().fail_writes(true);
        let order = fixtures::sample_order("fails");

        let err = service.ingest(&payload(&order)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, IngestError::Persist { ref order_uid, .. } if order_uid.as_str() == "fails"));
        assert!(service.lookup("fails").await.is_none());

        service.store().fail_writes(false);
        service.ingest(&payload(&order)).await.unwrap();
        assert!(service.lookup("fails").await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_is_noop_first_write_wins() {
        let service = service();
        let first = fixtures::sample_order("dup");
        let mut second = fixtures::sample_order("dup");
        second.track_number = "CHANGED".to_owned();

        service.ingest(&payload(&first)).await.unwrap();
        let outcome = service.ingest(&payload(&second)).await.unwrap();

        assert_eq!(outcome, IngestOutcome::Duplicate(OrderUid::new("dup")));
        assert_eq!(outcome.order_uid().as_str(), "dup");
        assert_eq!(*service.lookup("dup").await.unwrap(), first);
        assert_eq!(service.store().stored("dup"), Some(first));
    }

    #[tokio::test]
    async fn test_restore_loads_every_stored_order() {
        let orders: Vec<Order> = (0..10)
            .map(|i| fixtures::sample_order(&format!("restored-{i}")))
            .collect();
        let service = OrderService::new(MemoryStore::with_orders(orders.clone()), OrderCache::new());

        assert_eq!(service.restore().await.unwrap(), 10);
        for order in &orders {
            let cached = service.lookup(order.order_uid.as_str()).await.unwrap();
            assert_eq!(*cached, *order);
        }
        assert!(service.lookup("never-stored").await.is_none());
    }

    #[tokio::test]
    async fn test_restore_failure_is_reported() {
        let service = service();
        service.store().fail_writes(true);
        assert!(service.restore().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_of_distinct_orders() {
        let service = Arc::new(service());
        let mut handles = Vec::new();
        for i in 0..32 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                let order = fixtures::sample_order(&format!("concurrent-{i}"));
                service.ingest(&payload(&order)).await
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), Ok(IngestOutcome::Stored(_))));
        }
        assert_eq!(service.query().len().await, 32);
    }

    #[tokio::test]
    async fn test_lookup_never_validates_identifier() {
        let service = service();
        assert!(service.lookup("").await.is_none());
        assert!(service.lookup("has space / and ? marks").await.is_none());
    }
}
