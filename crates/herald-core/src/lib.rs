//! Core types and trait definitions for the Herald notification scheduler.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod bus;
pub mod error;
pub mod events;
pub mod notification;
pub mod occurrence;
pub mod schedule;
pub mod store;
pub mod subject;
pub mod timezone;

pub use error::{Error, Result};
