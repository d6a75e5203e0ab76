//! The order aggregate and its wire decoding.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::validation::{ValidationError, require_no_nul, require_non_empty};
use super::{Delivery, Item, OrderUid, Payment};

/// Errors turning a raw message payload into an [`Order`].
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The payload is not UTF-8 JSON of the order shape.
    #[error("payload does not match the order shape: {0}")]
    Shape(#[source] serde_json::Error),

    /// The payload is valid JSON but its top level is not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// An order as published on the stream, persisted across four relations and
/// served from the read cache.
///
/// Field names on the wire match the relational column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_uid: OrderUid,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    #[serde(deserialize_with = "deserialize_date_created")]
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

impl Order {
    /// Decode a message payload into an order.
    ///
    /// This is only the typed decode. serde also accepts a JSON array in
    /// field order for a struct, so callers that need the payload to be a
    /// well-formed object follow up with [`Order::check_structure`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Shape`] if the payload is not JSON or does not
    /// fit the order shape.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload).map_err(DecodeError::Shape)
    }

    /// Check that a payload is a well-formed JSON object, independent of the
    /// typed decode.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Shape`] for invalid JSON and
    /// [`DecodeError::NotAnObject`] when the top level is not an object.
    pub fn check_structure(payload: &[u8]) -> Result<(), DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(DecodeError::Shape)?;
        if value.is_object() {
            Ok(())
        } else {
            Err(DecodeError::NotAnObject)
        }
    }

    /// Validate the order and every record it owns.
    ///
    /// # Errors
    ///
    /// Returns the first failing field, with a path such as
    /// `payment.currency` or `items[0].sale`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let uid = self.order_uid.as_str();
        require_non_empty("order_uid", uid)?;
        if uid.len() > OrderUid::MAX_LENGTH {
            return Err(ValidationError::TooLong {
                field: "order_uid".to_owned(),
                max: OrderUid::MAX_LENGTH,
            });
        }
        if uid.chars().any(char::is_whitespace) {
            return Err(ValidationError::Whitespace {
                field: "order_uid".to_owned(),
            });
        }
        require_non_empty("track_number", &self.track_number)?;
        require_no_nul(&[
            ("order_uid", uid),
            ("track_number", self.track_number.as_str()),
            ("entry", self.entry.as_str()),
            ("locale", self.locale.as_str()),
            ("internal_signature", self.internal_signature.as_str()),
            ("customer_id", self.customer_id.as_str()),
            ("delivery_service", self.delivery_service.as_str()),
            ("shardkey", self.shardkey.as_str()),
            ("oof_shard", self.oof_shard.as_str()),
        ])?;

        self.delivery.validate().map_err(|e| e.within("delivery"))?;
        self.payment.validate().map_err(|e| e.within("payment"))?;
        for (index, item) in self.items.iter().enumerate() {
            item.validate()
                .map_err(|e| e.within(&format!("items[{index}]")))?;
        }

        Ok(())
    }
}

/// Parse an ISO-8601 creation timestamp.
///
/// Accepts an explicit offset (`2021-11-26T06:22:19Z`, `...+03:00`) or none,
/// in which case the time is read as UTC. Sub-microsecond digits are dropped
/// because `TIMESTAMPTZ` stores microseconds, so a decoded order equals the
/// one read back from the database.
///
/// # Errors
///
/// Returns `chrono::ParseError` if `raw` is not an ISO-8601 date-time.
pub fn parse_date_created(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let parsed = match raw.parse::<DateTime<FixedOffset>>() {
        Ok(with_offset) => with_offset.with_timezone(&Utc),
        Err(_) => raw.parse::<NaiveDateTime>()?.and_utc(),
    };
    Ok(parsed.trunc_subsecs(6))
}

fn deserialize_date_created<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date_created(&raw).map_err(serde::de::Error::custom)
}
