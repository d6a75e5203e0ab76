//! Field-level validation shared by the order records.

use rust_decimal::Decimal;

/// A record failed validation.
///
/// `field` is a path relative to the record that was validated; parents
/// prepend their own segment with [`ValidationError::within`], so an error
/// surfaced from an order reads like `items[1].sale`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field is empty.
    #[error("{field} cannot be empty")]
    Empty {
        /// Path of the offending field.
        field: String,
    },
    /// A text field exceeds its length limit.
    #[error("{field} must be at most {max} bytes")]
    TooLong {
        /// Path of the offending field.
        field: String,
        /// Maximum allowed length.
        max: usize,
    },
    /// A field that must not contain whitespace does.
    #[error("{field} must not contain whitespace")]
    Whitespace {
        /// Path of the offending field.
        field: String,
    },
    /// A monetary amount is negative.
    #[error("{field} must not be negative (got {value})")]
    Negative {
        /// Path of the offending field.
        field: String,
        /// The rejected amount.
        value: Decimal,
    },
    /// An integer falls outside its allowed range.
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        /// Path of the offending field.
        field: String,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// The rejected value.
        value: i64,
    },
    /// An email field is present but malformed.
    #[error("{field} is not a valid email address")]
    InvalidEmail {
        /// Path of the offending field.
        field: String,
    },
    /// A text field contains a NUL character, which text columns cannot hold.
    #[error("{field} must not contain NUL characters")]
    NulCharacter {
        /// Path of the offending field.
        field: String,
    },
}

impl ValidationError {
    /// Path of the field that failed.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::Whitespace { field }
            | Self::Negative { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::InvalidEmail { field }
            | Self::NulCharacter { field } => field,
        }
    }

    /// Prefix the field path with the parent record's segment.
    #[must_use]
    pub fn within(mut self, parent: &str) -> Self {
        let field = match &mut self {
            Self::Empty { field }
            | Self::TooLong { field, .. }
            | Self::Whitespace { field }
            | Self::Negative { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::InvalidEmail { field }
            | Self::NulCharacter { field } => field,
        };
        *field = format!("{parent}.{field}");
        self
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: field.to_owned(),
        });
    }
    Ok(())
}

/// Check every named text field for NUL characters.
pub(crate) fn require_no_nul(fields: &[(&str, &str)]) -> Result<(), ValidationError> {
    match fields.iter().find(|(_, value)| value.contains('\0')) {
        Some((field, _)) => Err(ValidationError::NulCharacter {
            field: (*field).to_owned(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn require_non_negative(field: &str, value: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::Negative {
            field: field.to_owned(),
            value,
        });
    }
    Ok(())
}

pub(crate) fn require_in_range(
    field: &str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<(), ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_owned(),
            min,
            max,
            value,
        });
    }
    Ok(())
}
