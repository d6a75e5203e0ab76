//! Demo order publisher.
//!
//! Publishes a well-formed sample order on a fixed interval so the ingestion
//! pipeline can be exercised end to end. Each order gets a fresh `order_uid`
//! and current timestamps; everything else matches the sample fixture.
//!
//! # Usage
//!
//! ```bash
//! of-cli publish --interval 10s
//! of-cli publish --interval 250ms --count 100
//! ```
//!
//! # Environment Variables
//!
//! - `NATS_URL` - NATS server URL (default: nats://localhost:4222)

use std::time::Duration;

use async_nats::jetstream;
use chrono::{SubsecRound, Utc};
use orderflow_core::{Order, fixtures};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to connect to NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),

    #[error("failed to create stream: {0}")]
    Stream(#[from] jetstream::context::CreateStreamError),

    #[error("failed to publish order: {0}")]
    Publish(#[from] jetstream::context::PublishError),

    #[error("failed to encode order: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub interval: Duration,
    pub count: Option<u64>,
    pub subject: String,
    pub stream: String,
}

/// Publish sample orders until `count` is reached or Ctrl+C is pressed.
///
/// Returns how many orders the server acknowledged.
///
/// # Errors
///
/// Returns `PublishError` if NATS is unreachable or a publish is not
/// acknowledged.
pub async fn run(options: PublishOptions) -> Result<u64, PublishError> {
    dotenvy::dotenv().ok();
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_owned());

    let client = async_nats::ConnectOptions::new()
        .name("orderflow-publisher")
        .connect(&url)
        .await?;
    let context = jetstream::new(client);
    context
        .get_or_create_stream(jetstream::stream::Config {
            name: options.stream.clone(),
            subjects: vec![options.subject.clone()],
            ..Default::default()
        })
        .await?;

    tracing::info!(
        url = %url,
        subject = %options.subject,
        interval_ms = u64::try_from(options.interval.as_millis()).unwrap_or(u64::MAX),
        "Publishing sample orders"
    );

    let mut ticker = tokio::time::interval(options.interval);
    let mut published = 0;

    while options.count.is_none_or(|count| published < count) {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }

        let order = generate_order();
        let payload = serde_json::to_vec(&order)?;
        context
            .publish(options.subject.clone(), payload.into())
            .await?
            .await?;

        published += 1;
        tracing::info!(order_uid = %order.order_uid, published, "Order published");
    }

    Ok(published)
}

/// Build a sample order with a fresh identifier and the current time.
#[must_use]
pub fn generate_order() -> Order {
    let order_uid = Uuid::new_v4().simple().to_string();
    // Microseconds, so the published order equals what the service stores
    let now = Utc::now().trunc_subsecs(6);

    let mut order = fixtures::sample_order(&order_uid);
    order.date_created = now;
    order.payment.transaction.clone_from(&order_uid);
    order.payment.payment_dt = now.timestamp();
    order
}

/// Parse an interval such as `10s`, `500ms` or `2m`. A bare number is
/// taken as seconds.
///
/// # Errors
///
/// Returns a message naming the rejected input.
pub fn parse_interval(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid interval: {raw:?}"))?;
    let interval = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        _ => return Err(format!("invalid interval unit in {raw:?} (use ms, s or m)")),
    };

    if interval.is_zero() {
        return Err("interval must be greater than zero".to_owned());
    }
    Ok(interval)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_interval("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_interval("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_interval("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_interval_rejects_garbage() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("fast").is_err());
        assert!(parse_interval("10h").is_err());
        assert!(parse_interval("0s").is_err());
    }

    #[test]
    fn test_generated_orders_are_valid_and_unique() {
        let first = generate_order();
        let second = generate_order();

        assert!(first.validate().is_ok());
        assert_ne!(first.order_uid, second.order_uid);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.payment.transaction, first.order_uid.as_str());
        assert_eq!(first.date_created.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_generated_order_is_a_json_object() {
        let order = generate_order();
        let payload = serde_json::to_vec(&order).unwrap();
        assert!(Order::check_structure(&payload).is_ok());
        assert_eq!(Order::decode(&payload).unwrap(), order);
    }
}
