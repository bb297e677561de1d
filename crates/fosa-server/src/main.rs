//! `fosa`: serve the dashboard API and run maintenance on the store.
//!
//! Reads `fosa.toml` (or the path given with `--config`) layered with `FOSA_*`
//! environment variables, then opens the SQLite store it names.
//!
//! ```text
//! fosa serve
//! fosa migrate [--continue-on-error]
//! fosa rollback [STEP]... [--continue-on-error]
//! fosa steps
//! fosa load --table health_districts --legacy-name district dump.sql
//! fosa reconcile districts [--dry-run]
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use fosa_core::{
  dump::TargetTable,
  reconcile::LinkSpec,
  schema::{EvolutionReport, FailurePolicy},
  store::GeoStore,
};
use fosa_server::{ServerConfig, load_config};
use fosa_store_sqlite::SqliteStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "FOSA inventory backend")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "fosa.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,
  /// Apply every declared schema step.
  Migrate {
    /// Keep going after a step fails.
    #[arg(long)]
    continue_on_error: bool,
  },
  /// Revert schema steps, newest first. Reverts all steps when none are named.
  Rollback {
    steps: Vec<String>,
    #[arg(long)]
    continue_on_error: bool,
  },
  /// List applied schema steps.
  Steps,
  /// Replace a table's rows with a SQL dump.
  Load {
    /// Table to replace.
    #[arg(long)]
    table:       TargetTable,
    /// Table name the dump inserts into.
    #[arg(long)]
    legacy_name: String,
    /// Path to the dump.
    dump:        PathBuf,
  },
  /// Fill in foreign keys from free-text parent names.
  Reconcile {
    #[command(subcommand)]
    link:    Link,
    /// Report what would change without writing.
    #[arg(long, global = true)]
    dry_run: bool,
  },
}

#[derive(Subcommand)]
enum Link {
  /// Health districts to regions.
  Districts,
  /// Health areas to health districts.
  Areas,
  /// Any child/parent pair.
  Custom(CustomLink),
}

#[derive(Args)]
struct CustomLink {
  #[arg(long)]
  child_table:        String,
  #[arg(long, default_value = "id")]
  child_id_column:    String,
  #[arg(long)]
  child_name_column:  String,
  #[arg(long)]
  legacy_column:      String,
  #[arg(long)]
  fk_column:          String,
  #[arg(long)]
  parent_table:       String,
  #[arg(long, default_value = "id")]
  parent_id_column:   String,
  #[arg(long, default_value = "name")]
  parent_name_column: String,
  #[arg(long)]
  touch_column:       Option<String>,
}

impl Link {
  fn spec(self) -> LinkSpec {
    match self {
      Link::Districts => LinkSpec::district_to_region(),
      Link::Areas => LinkSpec::area_to_district(),
      Link::Custom(c) => LinkSpec {
        child_table:        c.child_table,
        child_id_column:    c.child_id_column,
        child_name_column:  c.child_name_column,
        legacy_column:      c.legacy_column,
        fk_column:          c.fk_column,
        parent_table:       c.parent_table,
        parent_id_column:   c.parent_id_column,
        parent_name_column: c.parent_name_column,
        touch_column:       c.touch_column,
      },
    }
  }
}

fn policy(continue_on_error: bool) -> FailurePolicy {
  if continue_on_error { FailurePolicy::Continue } else { FailurePolicy::Abort }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn finish(report: &EvolutionReport) -> anyhow::Result<()> {
  print_json(report)?;
  if !report.succeeded() {
    anyhow::bail!("one or more schema steps failed");
  }
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg: ServerConfig = load_config(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Serve => serve(cfg, store).await?,
    Command::Migrate { continue_on_error } => {
      let report = store.evolve_schema(policy(continue_on_error)).await?;
      finish(&report)?;
    }
    Command::Rollback { steps, continue_on_error } => {
      let report = store.revert_schema(steps, policy(continue_on_error)).await?;
      finish(&report)?;
    }
    Command::Steps => print_json(&store.applied_steps().await?)?,
    Command::Load { table, legacy_name, dump } => {
      let sql = tokio::fs::read_to_string(&dump)
        .await
        .with_context(|| format!("failed to read dump {dump:?}"))?;
      let report = store.bulk_load(table, legacy_name, sql).await?;
      print_json(&report)?;
    }
    Command::Reconcile { link, dry_run } => {
      let spec = link.spec();
      let report = if dry_run {
        store.plan_reconciliation(spec).await?
      } else {
        store.reconcile(spec).await?
      };
      print_json(&report)?;
    }
  }

  Ok(())
}

async fn serve(cfg: ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let app = fosa_server::router(Arc::new(store));
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
