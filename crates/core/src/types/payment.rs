//! Payment details of an order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::validation::{
    ValidationError, require_no_nul, require_non_empty, require_non_negative,
};

/// Payment for an order (1:1, owned by the order).
///
/// Monetary fields are exact decimals. They travel as JSON numbers and are
/// stored as `NUMERIC`; no currency-unit conversion happens anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Payment time, epoch seconds.
    pub payment_dt: i64,
    pub bank: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_cost: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub goods_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub custom_fee: Decimal,
}

impl Payment {
    /// Validate the payment record.
    ///
    /// # Errors
    ///
    /// Returns the first failing field: an empty transaction id or currency,
    /// a NUL character in any text field, or any negative monetary amount.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("transaction", &self.transaction)?;
        require_non_empty("currency", &self.currency)?;
        require_no_nul(&[
            ("transaction", self.transaction.as_str()),
            ("request_id", self.request_id.as_str()),
            ("currency", self.currency.as_str()),
            ("provider", self.provider.as_str()),
            ("bank", self.bank.as_str()),
        ])?;
        require_non_negative("amount", self.amount)?;
        require_non_negative("delivery_cost", self.delivery_cost)?;
        require_non_negative("goods_total", self.goods_total)?;
        require_non_negative("custom_fee", self.custom_fee)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_sample_payment_is_valid() {
        assert!(fixtures::sample_payment().validate().is_ok());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let payment = Payment {
            custom_fee: Decimal::new(-5, 0),
            ..fixtures::sample_payment()
        };
        let err = payment.validate().unwrap_err();
        assert_eq!(err.field(), "custom_fee");
    }

    #[test]
    fn test_amounts_decode_exactly_from_json_numbers() {
        let json = r#"{
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500.10,
            "goods_total": 317,
            "custom_fee": 0
        }"#;
        let payment: Payment = serde_json::from_str(json).unwrap();
        assert_eq!(payment.amount, Decimal::new(1817, 0));
        assert_eq!(payment.delivery_cost, Decimal::new(15001, 1));
        assert_eq!(payment.payment_dt, 1_637_907_727);

        let value = serde_json::to_value(&payment).unwrap();
        assert!(value["delivery_cost"].is_number());
    }
}
