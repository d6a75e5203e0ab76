//! Order identifier.
//!
//! `order_uid` is assigned by the upstream producer and is immutable once the
//! order exists. It keys the order in both the durable store and the read
//! cache.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique order identifier.
///
/// Construction never fails: lookups accept any string and simply miss.
/// Structural rules for *ingested* identifiers are enforced by
/// [`Order::validate`](crate::Order::validate).
///
/// ```
/// use orderflow_core::OrderUid;
///
/// let uid = OrderUid::new("b563feb7b2b84b6test");
/// assert_eq!(uid.as_str(), "b563feb7b2b84b6test");
/// assert_eq!(uid.to_string(), "b563feb7b2b84b6test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderUid(String);

impl OrderUid {
    /// Maximum accepted length in bytes for an ingested identifier.
    pub const MAX_LENGTH: usize = 128;

    /// Wrap a string as an order identifier.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `OrderUid` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl From<&str> for OrderUid {
    fn from(uid: &str) -> Self {
        Self(uid.to_owned())
    }
}

impl AsRef<str> for OrderUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for OrderUid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderUid {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderUid {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderUid {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_serializes_as_plain_string() {
        let uid = OrderUid::new("abc123");
        assert_eq!(serde_json::to_string(&uid).unwrap(), "\"abc123\"");

        let parsed: OrderUid = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(parsed, uid);
    }

    #[test]
    fn test_borrow_allows_str_lookup() {
        let mut map = HashMap::new();
        map.insert(OrderUid::new("abc123"), 1);
        assert_eq!(map.get("abc123"), Some(&1));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn test_conversions() {
        let from_str: OrderUid = "x".into();
        let from_string: OrderUid = String::from("x").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str.into_inner(), "x");
    }
}
