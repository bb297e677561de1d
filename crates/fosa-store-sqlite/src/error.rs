//! Error type for `fosa-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] fosa_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The load was rolled back; the target table keeps its previous rows.
  #[error("bulk load into {table} failed: {message}")]
  BulkLoad { table: String, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
