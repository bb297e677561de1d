//! JSON API for the FOSA dashboard.
//!
//! Exposes an axum [`Router`] backed by any [`fosa_core::store::GeoStore`].
//! Every request reads a fresh snapshot; nothing is cached between requests.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", fosa_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod filters;
pub mod geometry;

use std::sync::Arc;

use axum::{Router, routing::get};
use fosa_core::store::GeoStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: GeoStore + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/filters", get(filters::options::<S>))
    .route("/map", get(filters::map::<S>))
    .route("/geometry/{level}/{id}", get(geometry::get_one::<S>))
    .with_state(store)
}
