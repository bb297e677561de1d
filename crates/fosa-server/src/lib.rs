//! HTTP server and maintenance tooling for the FOSA inventory backend.
//!
//! The `fosa` binary wires a [`SqliteStore`](fosa_store_sqlite::SqliteStore)
//! into the JSON API and exposes the maintenance operations (schema
//! evolution, bulk loads, reconciliation) as subcommands.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::{Router, routing::get};
use fosa_core::store::GeoStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, read from `fosa.toml` and `FOSA_*` variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("fosa.sqlite3") }

impl Default for ServerConfig {
  fn default() -> Self {
    Self { host: default_host(), port: default_port(), store_path: default_store_path() }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Layer the optional TOML file at `path` under `FOSA_*` environment
/// variables. A leading `~` in `store_path` is expanded.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("FOSA"))
    .build()
    .context("failed to read config file")?;

  let mut cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  cfg.store_path = expand_tilde(&cfg.store_path);
  Ok(cfg)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: the API under `/api` plus a liveness check.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: GeoStore + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", fosa_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use fosa_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  async fn app() -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    router(Arc::new(store))
  }

  async fn status(uri: &str) -> StatusCode {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app().await.oneshot(req).await.unwrap().status()
  }

  #[tokio::test]
  async fn health_check_answers() {
    assert_eq!(status("/health").await, StatusCode::OK);
  }

  #[tokio::test]
  async fn api_is_nested_under_prefix() {
    // The base schema alone is enough to serve the filters.
    assert_eq!(status("/api/filters").await, StatusCode::OK);
    assert_eq!(status("/filters").await, StatusCode::NOT_FOUND);
  }

  #[test]
  fn missing_config_file_falls_back_to_defaults() {
    let cfg = load_config(Path::new("does-not-exist.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.address(), format!("{}:8080", cfg.host));
  }

  #[test]
  fn tilde_is_expanded_only_at_the_start() {
    assert_eq!(expand_tilde(Path::new("data/fosa.sqlite3")), PathBuf::from("data/fosa.sqlite3"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/fosa.sqlite3")), PathBuf::from(home).join("fosa.sqlite3"));
    }
  }
}
