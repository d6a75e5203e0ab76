//! Core types for Orderflow.
//!
//! An [`Order`] is the root aggregate. It exclusively owns one [`Delivery`],
//! one [`Payment`] and zero or more [`Item`]s; none of them has an identity
//! of its own outside the order.

pub mod delivery;
pub mod id;
pub mod item;
pub mod order;
pub mod payment;
pub mod validation;

pub use delivery::Delivery;
pub use id::OrderUid;
pub use item::Item;
pub use order::{DecodeError, Order, parse_date_created};
pub use payment::Payment;
pub use validation::ValidationError;
