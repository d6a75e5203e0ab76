//! Sample orders for tests and the demo publisher.
//!
//! Every sample passes [`Order::validate`](crate::Order::validate).

use chrono::DateTime;
use rust_decimal::Decimal;

use crate::{Delivery, Item, Order, OrderUid, Payment};

const SAMPLE_CREATED_AT: i64 = 1_637_907_739;

/// A delivery record for a sample order.
#[must_use]
pub fn sample_delivery() -> Delivery {
    Delivery {
        name: "John Doe".to_owned(),
        phone: "123-456-7890".to_owned(),
        zip: "12345".to_owned(),
        city: "Example City".to_owned(),
        address: "123 Main St".to_owned(),
        region: "Example Region".to_owned(),
        email: "john@example.com".to_owned(),
    }
}

/// A payment record for a sample order.
#[must_use]
pub fn sample_payment() -> Payment {
    Payment {
        transaction: "demo-transaction".to_owned(),
        request_id: "demo-request".to_owned(),
        currency: "USD".to_owned(),
        provider: "Example Provider".to_owned(),
        amount: Decimal::new(12_345, 2),
        payment_dt: SAMPLE_CREATED_AT,
        bank: "Example Bank".to_owned(),
        delivery_cost: Decimal::new(10, 0),
        goods_total: Decimal::new(100, 0),
        custom_fee: Decimal::new(5, 0),
    }
}

/// A single sample item.
#[must_use]
pub fn sample_item() -> Item {
    Item {
        chrt_id: 1,
        track_number: "item_track_number".to_owned(),
        price: Decimal::new(50, 0),
        rid: "item_rid".to_owned(),
        name: "Item 1".to_owned(),
        sale: 0,
        size: "M".to_owned(),
        total_price: Decimal::new(50, 0),
        nm_id: 101,
        brand: "Example Brand".to_owned(),
        status: 1,
    }
}

/// The two items every sample order carries.
#[must_use]
pub fn sample_items() -> Vec<Item> {
    vec![
        sample_item(),
        Item {
            chrt_id: 2,
            track_number: "item_track_number_2".to_owned(),
            price: Decimal::new(70, 0),
            rid: "item_rid_2".to_owned(),
            name: "Item 2".to_owned(),
            sale: 10,
            size: "L".to_owned(),
            total_price: Decimal::new(63, 0),
            nm_id: 102,
            brand: "Example Brand 2".to_owned(),
            status: 2,
        },
    ]
}

/// A complete sample order with the given identifier.
#[must_use]
pub fn sample_order(uid: &str) -> Order {
    Order {
        order_uid: OrderUid::new(uid),
        track_number: "WBILMTESTTRACK".to_owned(),
        entry: "WBIL".to_owned(),
        delivery: sample_delivery(),
        payment: sample_payment(),
        items: sample_items(),
        locale: "en".to_owned(),
        internal_signature: String::new(),
        customer_id: "demo-customer".to_owned(),
        delivery_service: "meest".to_owned(),
        shardkey: "9".to_owned(),
        sm_id: 99,
        date_created: DateTime::from_timestamp(SAMPLE_CREATED_AT, 0).unwrap_or_default(),
        oof_shard: "1".to_owned(),
    }
}
