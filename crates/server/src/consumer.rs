//! Durable subscription to the order subject.
//!
//! Orders arrive through a NATS `JetStream` durable pull consumer. The stream
//! position is stored server-side under the durable name, so a restarted
//! process resumes after the last acknowledged message.
//!
//! A message is acknowledged only once [`OrderService::ingest`] has returned:
//! - stored or duplicate orders are acked
//! - payloads that can never succeed (decode or validation failures) are
//!   terminated so they are not redelivered
//! - persistence failures are NAKed with an exponential delay, and on the last
//!   attempt the raw payload is republished to the dead-letter subject

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, AckKind, Message, consumer::PullConsumer};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::StreamConfig;
use crate::db::OrderStore;
use crate::service::{IngestError, IngestOutcome, OrderService};

/// Upper bound on the redelivery delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How long the server waits for an ack before redelivering.
const ACK_WAIT: Duration = Duration::from_secs(30);

/// Header naming why a message was dead-lettered.
pub const DEAD_LETTER_ERROR_HEADER: &str = "Orderflow-Error";

/// Header carrying the order identifier of a dead-lettered message.
pub const DEAD_LETTER_ORDER_UID_HEADER: &str = "Orderflow-Order-Uid";

/// Header carrying how many times the message was delivered.
pub const DEAD_LETTER_DELIVERED_HEADER: &str = "Orderflow-Delivered";

/// Errors setting up or reading the subscription.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to connect to NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),

    #[error("failed to create stream: {0}")]
    Stream(#[from] jetstream::context::CreateStreamError),

    #[error("failed to create durable consumer: {0}")]
    Consumer(#[from] jetstream::stream::ConsumerError),

    #[error("failed to open message stream: {0}")]
    Messages(#[from] jetstream::consumer::StreamError),
}

/// Redelivery schedule for messages whose persistence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delivery attempts before the message is dead-lettered.
    pub max_deliver: i64,
    /// Delay before the first redelivery.
    pub base: Duration,
    /// Cap on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build the policy from the subscription settings.
    #[must_use]
    pub const fn from_config(config: &StreamConfig) -> Self {
        Self {
            max_deliver: config.max_deliver,
            base: config.retry_base,
            max_delay: MAX_RETRY_DELAY,
        }
    }

    /// Delay before redelivering a message that has been delivered
    /// `delivered` times: `base * 2^(delivered - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, delivered: i64) -> Duration {
        let exponent = u32::try_from(delivered.saturating_sub(1).clamp(0, 16)).unwrap_or(16);
        self.base.saturating_mul(1 << exponent).min(self.max_delay)
    }
}

/// What to tell the server about a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Advance the stream position.
    Ack,
    /// Ask for redelivery after the delay.
    Retry(Duration),
    /// Drop the message without redelivery.
    Terminate,
    /// Republish the payload to the dead-letter subject, then drop it.
    DeadLetter,
}

/// Decide the disposition of a message from the ingest result and the number
/// of times it has been delivered (starting at 1).
#[must_use]
pub fn disposition(
    result: &Result<IngestOutcome, IngestError>,
    delivered: i64,
    policy: &RetryPolicy,
) -> Disposition {
    match result {
        Ok(_) => Disposition::Ack,
        Err(e) if !e.is_retryable() => Disposition::Terminate,
        Err(_) if delivered >= policy.max_deliver => Disposition::DeadLetter,
        Err(_) => Disposition::Retry(policy.backoff(delivered)),
    }
}

/// Connected durable subscription feeding an [`OrderService`].
pub struct OrderConsumer<S> {
    consumer: PullConsumer,
    handler: MessageHandler<S>,
    subject: String,
}

impl<S: OrderStore> OrderConsumer<S> {
    /// Connect to NATS and bind the durable consumer.
    ///
    /// Creates the order stream and the dead-letter stream if they do not
    /// exist yet. The delivery limit is enforced here rather than by the
    /// server, so a message whose dead-letter publish fails is redelivered
    /// instead of silently dropped.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError` if the connection, either stream or the
    /// consumer cannot be set up.
    #[instrument(skip_all, fields(stream = %config.stream, durable = %config.durable_name))]
    pub async fn subscribe(
        config: &StreamConfig,
        service: Arc<OrderService<S>>,
    ) -> Result<Self, ConsumerError> {
        let client = async_nats::ConnectOptions::new()
            .name(&config.client_name)
            .connect(&config.url)
            .await?;
        info!(url = %config.url, "Connected to NATS");

        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream.clone(),
                subjects: vec![config.subject.clone()],
                ..Default::default()
            })
            .await?;

        context
            .get_or_create_stream(jetstream::stream::Config {
                name: format!("{}_DEAD", config.stream),
                subjects: vec![config.dead_letter_subject.clone()],
                ..Default::default()
            })
            .await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.durable_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(config.durable_name.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    ..Default::default()
                },
            )
            .await?;

        Ok(Self {
            consumer,
            handler: MessageHandler {
                service,
                context,
                dead_letter_subject: Arc::from(config.dead_letter_subject.as_str()),
                policy: RetryPolicy::from_config(config),
            },
            subject: config.subject.clone(),
        })
    }

    /// Pull messages until shutdown is signalled or the stream closes.
    ///
    /// Every message is handled in its own task. Transport errors on
    /// individual pulls are logged and the loop keeps going.
    ///
    /// # Errors
    ///
    /// Returns `ConsumerError::Messages` if the message stream cannot be
    /// opened.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let mut messages = self.consumer.messages().await?;
        info!(subject = %self.subject, "Order subscription started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Order subscription stopping");
                        break;
                    }
                }
                next = messages.next() => match next {
                    Some(Ok(message)) => {
                        let handler = self.handler.clone();
                        tokio::spawn(async move { handler.handle(message).await });
                    }
                    Some(Err(e)) => warn!(error = %e, "Failed to receive message"),
                    None => {
                        warn!("Message stream closed");
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}

/// Per-message work shared by every spawned task.
struct MessageHandler<S> {
    service: Arc<OrderService<S>>,
    context: jetstream::Context,
    dead_letter_subject: Arc<str>,
    policy: RetryPolicy,
}

impl<S> Clone for MessageHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            context: self.context.clone(),
            dead_letter_subject: Arc::clone(&self.dead_letter_subject),
            policy: self.policy,
        }
    }
}

impl<S: OrderStore> MessageHandler<S> {
    async fn handle(&self, message: Message) {
        let delivered = match message.info() {
            Ok(info) => info.delivered,
            Err(e) => {
                warn!(error = %e, "Message has no delivery metadata");
                1
            }
        };

        let result = self.service.ingest(&message.payload).await;
        let disposition = disposition(&result, delivered, &self.policy);

        let ack = match (&result, disposition) {
            (Ok(outcome), Disposition::Ack) => {
                debug!(order_uid = %outcome.order_uid(), delivered, "Order handled");
                message.ack().await
            }
            (Err(e), Disposition::Terminate) => {
                warn!(error = %e, delivered, "Dropping message that cannot be ingested");
                message.ack_with(AckKind::Term).await
            }
            (Err(e), Disposition::Retry(delay)) => {
                warn!(
                    error = %e,
                    delivered,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Persisting order failed, scheduling redelivery"
                );
                message.ack_with(AckKind::Nak(Some(delay))).await
            }
            (Err(e), Disposition::DeadLetter) => {
                if let Err(publish_err) = self.dead_letter(&message, e, delivered).await {
                    error!(
                        error = %publish_err,
                        delivered,
                        "Failed to dead-letter message, scheduling redelivery"
                    );
                    message
                        .ack_with(AckKind::Nak(Some(self.policy.max_delay)))
                        .await
                } else {
                    message.ack_with(AckKind::Term).await
                }
            }
            (Ok(_), _) | (Err(_), Disposition::Ack) => message.ack().await,
        };

        if let Err(e) = ack {
            error!(error = %e, ?disposition, "Failed to acknowledge message");
        }
    }

    async fn dead_letter(
        &self,
        message: &Message,
        cause: &IngestError,
        delivered: i64,
    ) -> Result<(), jetstream::context::PublishError> {
        let event_id = sentry::capture_error(cause);
        error!(
            error = %cause,
            delivered,
            sentry_event_id = %event_id,
            subject = %self.dead_letter_subject,
            "Giving up on message, moving it to the dead-letter subject"
        );

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(DEAD_LETTER_ERROR_HEADER, cause.to_string().as_str());
        headers.insert(DEAD_LETTER_DELIVERED_HEADER, delivered.to_string().as_str());
        if let IngestError::Persist { order_uid, .. } = cause {
            headers.insert(DEAD_LETTER_ORDER_UID_HEADER, order_uid.as_str());
        }

        self.context
            .publish_with_headers(
                self.dead_letter_subject.to_string(),
                headers,
                message.payload.clone(),
            )
            .await?
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use orderflow_core::{OrderUid, ValidationError};

    use super::*;
    use crate::db::RepositoryError;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_deliver: 5,
            base: Duration::from_millis(500),
            max_delay: MAX_RETRY_DELAY,
        }
    }

    fn persist_failure() -> Result<IngestOutcome, IngestError> {
        Err(IngestError::Persist {
            order_uid: OrderUid::from("abc123"),
            source: RepositoryError::Database(sqlx::Error::PoolTimedOut),
        })
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(4), Duration::from_secs(4));
        assert_eq!(policy.backoff(9), MAX_RETRY_DELAY);
        assert_eq!(policy.backoff(i64::MAX), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_backoff_treats_missing_count_as_first_attempt() {
        assert_eq!(policy().backoff(0), Duration::from_millis(500));
        assert_eq!(policy().backoff(-3), Duration::from_millis(500));
    }

    #[test]
    fn test_success_and_duplicate_are_acked() {
        let stored = Ok(IngestOutcome::Stored(OrderUid::from("abc123")));
        let duplicate = Ok(IngestOutcome::Duplicate(OrderUid::from("abc123")));
        assert_eq!(disposition(&stored, 1, &policy()), Disposition::Ack);
        assert_eq!(disposition(&duplicate, 3, &policy()), Disposition::Ack);
    }

    #[test]
    fn test_invalid_payload_is_terminated() {
        let invalid = Err(IngestError::Validation(ValidationError::Empty {
            field: "order_uid".to_owned(),
        }));
        assert_eq!(disposition(&invalid, 1, &policy()), Disposition::Terminate);
        // even on the last attempt
        assert_eq!(disposition(&invalid, 5, &policy()), Disposition::Terminate);
    }

    #[test]
    fn test_nul_in_text_field_is_terminated_not_retried() {
        let invalid = Err(IngestError::Validation(ValidationError::NulCharacter {
            field: "delivery.city".to_owned(),
        }));
        assert_eq!(disposition(&invalid, 1, &policy()), Disposition::Terminate);
    }

    #[test]
    fn test_persist_failure_retries_with_backoff() {
        let result = persist_failure();
        assert_eq!(
            disposition(&result, 1, &policy()),
            Disposition::Retry(Duration::from_millis(500))
        );
        assert_eq!(
            disposition(&result, 3, &policy()),
            Disposition::Retry(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_persist_failure_dead_letters_on_last_attempt() {
        let result = persist_failure();
        assert_eq!(disposition(&result, 5, &policy()), Disposition::DeadLetter);
        assert_eq!(disposition(&result, 6, &policy()), Disposition::DeadLetter);
    }

    #[test]
    fn test_single_attempt_policy_dead_letters_immediately() {
        let policy = RetryPolicy {
            max_deliver: 1,
            ..policy()
        };
        assert_eq!(
            disposition(&persist_failure(), 1, &policy),
            Disposition::DeadLetter
        );
    }

    #[test]
    fn test_policy_from_config() {
        let config = StreamConfig {
            url: "nats://localhost:4222".to_owned(),
            client_name: "orderflow-server".to_owned(),
            stream: "ORDERS".to_owned(),
            subject: "orders".to_owned(),
            durable_name: "durable-order-sub".to_owned(),
            dead_letter_subject: "orders.dead".to_owned(),
            max_deliver: 3,
            retry_base: Duration::from_millis(250),
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_deliver, 3);
        assert_eq!(policy.base, Duration::from_millis(250));
        assert_eq!(policy.max_delay, MAX_RETRY_DELAY);
    }
}
