//! Line items of an order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::validation::{
    ValidationError, require_in_range, require_no_nul, require_non_negative,
};

/// One purchased item (1:N, owned by the order, order of the list is kept).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub rid: String,
    pub name: String,
    /// Discount percentage.
    pub sale: i32,
    pub size: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

impl Item {
    /// Validate the item record.
    ///
    /// # Errors
    ///
    /// Returns the first failing field: a negative price or total, or a sale
    /// percentage outside `0..=100`, or a NUL character in a text field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_negative("price", self.price)?;
        require_non_negative("total_price", self.total_price)?;
        require_in_range("sale", i64::from(self.sale), 0, 100)?;
        require_no_nul(&[
            ("track_number", self.track_number.as_str()),
            ("rid", self.rid.as_str()),
            ("name", self.name.as_str()),
            ("size", self.size.as_str()),
            ("brand", self.brand.as_str()),
        ])?;
        Ok(())
    }
}
