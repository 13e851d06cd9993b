//! SQLite backend for the Herald notification store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. SQLite's single-writer discipline is
//! what makes the claim operation atomic: one UPDATE selects, locks, and
//! transitions due rows in a single statement.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
