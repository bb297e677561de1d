//! Core types and pure logic for the FOSA geographic hierarchy.
//!
//! This crate holds the domain model, the geometry normalizer, the cascading
//! filter resolver, the reconciliation planner, the dump rewriter and the
//! declared schema steps. It has no database or HTTP dependencies; storage
//! backends implement [`store::GeoStore`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
#![allow(async_fn_in_trait)]

pub mod cascade;
pub mod dump;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod reconcile;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
