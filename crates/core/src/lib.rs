//! Orderflow Core - Order aggregate types.
//!
//! This crate provides the data model shared across all Orderflow components:
//! - `server` - Stream ingestion, persistence, read cache and query API
//! - `cli` - Command-line tools for migrations and the demo order publisher
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no message-stream clients. Decoding from raw message bytes lives
//! here because it is pure.
//!
//! # Modules
//!
//! - [`types`] - The `Order` aggregate, its sub-records and the `OrderUid` key
//! - `fixtures` - Sample orders for tests and the demo publisher (`fixtures` feature)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use types::*;
