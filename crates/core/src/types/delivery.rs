//! Delivery details of an order.

use serde::{Deserialize, Serialize};

use super::validation::{ValidationError, require_no_nul, require_non_empty};

/// Recipient and address for an order (1:1, owned by the order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

impl Delivery {
    /// Validate the delivery record.
    ///
    /// The recipient name is required and no field may contain NUL. Email is optional, but when present it
    /// must have a non-empty local part and domain around an `@`.
    ///
    /// # Errors
    ///
    /// Returns the first failing field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("name", &self.name)?;
        require_no_nul(&[
            ("name", self.name.as_str()),
            ("phone", self.phone.as_str()),
            ("zip", self.zip.as_str()),
            ("city", self.city.as_str()),
            ("address", self.address.as_str()),
            ("region", self.region.as_str()),
            ("email", self.email.as_str()),
        ])?;

        if !self.email.is_empty() {
            let valid = self
                .email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
            if !valid {
                return Err(ValidationError::InvalidEmail {
                    field: "email".to_owned(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_sample_delivery_is_valid() {
        assert!(fixtures::sample_delivery().validate().is_ok());
    }

    #[test]
    fn test_missing_name() {
        let delivery = Delivery {
            name: String::new(),
            ..fixtures::sample_delivery()
        };
        let err = delivery.validate().err().map(|e| e.field().to_owned());
        assert_eq!(err.as_deref(), Some("name"));
    }

    #[test]
    fn test_email_optional_but_checked() {
        let mut delivery = fixtures::sample_delivery();
        delivery.email = String::new();
        assert!(delivery.validate().is_ok());

        delivery.email = "not-an-email".to_owned();
        assert!(matches!(
            delivery.validate(),
            Err(ValidationError::InvalidEmail { .. })
        ));

        delivery.email = "@example.com".to_owned();
        assert!(delivery.validate().is_err());
    }
}
