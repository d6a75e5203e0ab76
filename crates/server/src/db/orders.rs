//! Order repository: transactional writes across the four order relations and
//! full reads for cache reconstruction.
//!
//! Queries are runtime-checked (`sqlx::query` with binds) so the crate builds
//! without a live database.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument, warn};

use orderflow_core::{Delivery, Item, Order, OrderUid, Payment};

use super::{OrderStore, PersistOutcome, RepositoryError};

/// `PostgreSQL`-backed [`OrderStore`].
///
/// Each `persist` runs in its own pooled transaction. Writers of different
/// orders proceed in parallel; writers of the same `order_uid` are serialized
/// by the primary key on `orders`.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for OrderRepository {
    /// Insert the order, its delivery, its payment and its items in one
    /// transaction.
    ///
    /// The `orders` insert is `ON CONFLICT DO NOTHING`: when the order already
    /// exists the transaction is rolled back and `Duplicate` is returned, so
    /// re-delivered messages never create extra rows. Any statement failure
    /// rolls everything back.
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid, items = order.items.len()))]
    async fn persist(&self, order: &Order) -> Result<PersistOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        match insert_order(&mut *tx, order).await {
            Ok(PersistOutcome::Inserted) => {
                tx.commit().await?;
                debug!("Order committed");
                Ok(PersistOutcome::Inserted)
            }
            Ok(PersistOutcome::Duplicate) => {
                tx.rollback().await?;
                debug!("Order already stored, nothing written");
                Ok(PersistOutcome::Duplicate)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; connection drop will abort the transaction");
                }
                Err(e)
            }
        }
    }

    /// Load every order with its delivery, payment and items.
    ///
    /// Reads run in one repeatable-read snapshot. An order whose delivery or
    /// payment row is missing is skipped with a warning rather than failing
    /// the whole load.
    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let order_rows: Vec<OrderRow> = sqlx::query_as(
            r"
            SELECT order_uid, track_number, entry, delivery_service, locale,
                   internal_signature, customer_id, shardkey, sm_id,
                   date_created, oof_shard
            FROM orders
            ORDER BY date_created, order_uid
            ",
        )
        .fetch_all(&mut *tx)
        .await?;

        let delivery_rows: Vec<DeliveryRow> = sqlx::query_as(
            r"
            SELECT order_uid, name, phone, zip, city, address, region, email
            FROM delivery
            ",
        )
        .fetch_all(&mut *tx)
        .await?;

        let payment_rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT order_uid, "transaction", request_id, currency, provider,
                   amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
            FROM payment
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        let item_rows: Vec<ItemRow> = sqlx::query_as(
            r"
            SELECT order_uid, chrt_id, track_number, price, rid, name, sale,
                   size, total_price, nm_id, brand, status
            FROM items
            ORDER BY order_uid, position
            ",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let orders = assemble(order_rows, delivery_rows, payment_rows, item_rows);
        debug!(count = orders.len(), "Loaded orders");
        Ok(orders)
    }
}

/// Run the inserts for one order on an open transaction.
async fn insert_order(
    conn: &mut PgConnection,
    order: &Order,
) -> Result<PersistOutcome, RepositoryError> {
    let inserted = sqlx::query(
        r"
        INSERT INTO orders (
            order_uid, track_number, entry, delivery_service, locale,
            internal_signature, customer_id, shardkey, sm_id, date_created, oof_shard
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO NOTHING
        ",
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.delivery_service)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Ok(PersistOutcome::Duplicate);
    }

    let delivery = &order.delivery;
    sqlx::query(
        r"
        INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(&order.order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut *conn)
    .await?;

    let payment = &order.payment;
    sqlx::query(
        r#"
        INSERT INTO payment (
            order_uid, "transaction", request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&order.order_uid)
    .bind(&payment.transaction)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut *conn)
    .await?;

    for (index, item) in order.items.iter().enumerate() {
        let position = i32::try_from(index).map_err(|_| {
            RepositoryError::DataCorruption(format!("item position {index} out of range"))
        })?;

        sqlx::query(
            r"
            INSERT INTO items (
                order_uid, position, chrt_id, track_number, price, rid, name,
                sale, size, total_price, nm_id, brand, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(&order.order_uid)
        .bind(position)
        .bind(item.chrt_id)
        .bind(&item.track_number)
        .bind(item.price)
        .bind(&item.rid)
        .bind(&item.name)
        .bind(item.sale)
        .bind(&item.size)
        .bind(item.total_price)
        .bind(item.nm_id)
        .bind(&item.brand)
        .bind(item.status)
        .execute(&mut *conn)
        .await?;
    }

    Ok(PersistOutcome::Inserted)
}

/// Join the per-relation rows back into full orders, keeping the order of
/// `order_rows` and each order's item positions.
fn assemble(
    order_rows: Vec<OrderRow>,
    delivery_rows: Vec<DeliveryRow>,
    payment_rows: Vec<PaymentRow>,
    item_rows: Vec<ItemRow>,
) -> Vec<Order> {
    let mut deliveries: HashMap<OrderUid, Delivery> = delivery_rows
        .into_iter()
        .map(|row| row.into_parts())
        .collect();
    let mut payments: HashMap<OrderUid, Payment> = payment_rows
        .into_iter()
        .map(|row| row.into_parts())
        .collect();
    let mut items: HashMap<OrderUid, Vec<Item>> = HashMap::new();
    for row in item_rows {
        let (uid, item) = row.into_parts();
        items.entry(uid).or_default().push(item);
    }

    let mut orders = Vec::with_capacity(order_rows.len());
    for row in order_rows {
        let Some(delivery) = deliveries.remove(&row.order_uid) else {
            let err = RepositoryError::DataCorruption("order has no delivery row".to_owned());
            warn!(order_uid = %row.order_uid, error = %err, "Skipping order during load");
            continue;
        };
        let Some(payment) = payments.remove(&row.order_uid) else {
            let err = RepositoryError::DataCorruption("order has no payment row".to_owned());
            warn!(order_uid = %row.order_uid, error = %err, "Skipping order during load");
            continue;
        };
        let order_items = items.remove(&row.order_uid).unwrap_or_default();
        orders.push(row.into_order(delivery, payment, order_items));
    }

    orders
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_uid: OrderUid,
    track_number: String,
    entry: String,
    delivery_service: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

impl OrderRow {
    fn into_order(self, delivery: Delivery, payment: Payment, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery,
            payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    order_uid: OrderUid,
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
}

impl DeliveryRow {
    fn into_parts(self) -> (OrderUid, Delivery) {
        (
            self.order_uid,
            Delivery {
                name: self.name,
                phone: self.phone,
                zip: self.zip,
                city: self.city,
                address: self.address,
                region: self.region,
                email: self.email,
            },
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    order_uid: OrderUid,
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: Decimal,
    payment_dt: i64,
    bank: String,
    delivery_cost: Decimal,
    goods_total: Decimal,
    custom_fee: Decimal,
}

impl PaymentRow {
    fn into_parts(self) -> (OrderUid, Payment) {
        (
            self.order_uid,
            Payment {
                transaction: self.transaction,
                request_id: self.request_id,
                currency: self.currency,
                provider: self.provider,
                amount: self.amount,
                payment_dt: self.payment_dt,
                bank: self.bank,
                delivery_cost: self.delivery_cost,
                goods_total: self.goods_total,
                custom_fee: self.custom_fee,
            },
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    order_uid: OrderUid,
    chrt_id: i64,
    track_number: String,
    price: Decimal,
    rid: String,
    name: String,
    sale: i32,
    size: String,
    total_price: Decimal,
    nm_id: i64,
    brand: String,
    status: i32,
}

impl ItemRow {
    fn into_parts(self) -> (OrderUid, Item) {
        (
            self.order_uid,
            Item {
                chrt_id: self.chrt_id,
                track_number: self.track_number,
                price: self.price,
                rid: self.rid,
                name: self.name,
                sale: self.sale,
                size: self.size,
                total_price: self.total_price,
                nm_id: self.nm_id,
                brand: self.brand,
                status: self.status,
            },
        )
    }
}
