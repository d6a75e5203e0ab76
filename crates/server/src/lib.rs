//! Orderflow Server library.
//!
//! The order ingestion pipeline as a library, so the binary stays a thin
//! bootstrap and the pieces can be tested on their own:
//!
//! - [`consumer`] - Durable stream subscription, ack/retry/dead-letter policy
//! - [`service`] - Decode, validate, persist and cache one order; cache restore
//! - [`db`] - `PostgreSQL` persistence across the four order relations
//! - [`cache`] - In-memory read cache
//! - [`routes`] - HTTP read API
//! - [`lifecycle`] - Shutdown signal and subscription supervision

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod config;
pub mod consumer;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod routes;
pub mod service;
pub mod state;
