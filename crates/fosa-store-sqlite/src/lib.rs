//! SQLite backend for the FOSA hierarchy store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every store operation is a single
//! `call` closure; maintenance operations open and close their own
//! transactions inside it.

mod encode;
mod evolve;
mod link;
mod load;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
