//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{ "error": "<message>" }`. Store failures are
//! logged in full and reported to the client without their details.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use fosa_core::entity::Level;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request named something the domain does not know, such as a level.
  #[error(transparent)]
  Domain(#[from] fosa_core::Error),

  #[error("{0} rows have no outline; they are drawn as markers")]
  NoOutline(Level),

  #[error("no {level} with id {id}")]
  Missing { level: Level, id: i64 },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self { Self::Store(Box::new(e)) }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::Domain(_) | Self::NoOutline(_) => StatusCode::BAD_REQUEST,
      Self::Missing { .. } => StatusCode::NOT_FOUND,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let message = match &self {
      Self::Store(e) => {
        tracing::error!(error = %e, "store error while serving request");
        "the inventory store could not answer".to_owned()
      }
      other => other.to_string(),
    };
    (self.status(), Json(json!({ "error": message }))).into_response()
  }
}
