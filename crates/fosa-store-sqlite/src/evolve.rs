//! Applying and reverting declared schema steps.
//!
//! Presence is read from `PRAGMA table_info` and `sqlite_master`, so a step
//! that is already in place reports [`StepOutcome::AlreadyPresent`] without
//! attempting the DDL. Each step runs in its own transaction.

use chrono::Utc;
use fosa_core::schema::{EvolutionReport, FailurePolicy, Step, StepOutcome, StepReport};
use rusqlite::Connection;

use crate::{
  encode::encode_dt,
  schema::{index_exists, table_columns},
};

pub type StepFn = fn(&mut Connection, &Step) -> rusqlite::Result<StepOutcome>;

/// Run `op` over `steps` in order, honouring `policy` on failure.
pub fn run_steps(
  conn: &mut Connection,
  steps: &[&Step],
  policy: FailurePolicy,
  op: StepFn,
) -> EvolutionReport {
  let mut report = EvolutionReport::default();

  for (i, step) in steps.iter().enumerate() {
    let outcome = op(conn, step).unwrap_or_else(|e| StepOutcome::Failed(e.to_string()));
    match &outcome {
      StepOutcome::Applied => tracing::info!(step = step.id, table = step.table, "step applied"),
      StepOutcome::AlreadyPresent => tracing::debug!(step = step.id, "nothing to do"),
      StepOutcome::Failed(message) => tracing::error!(step = step.id, %message, "step failed"),
    }

    let failed = outcome.is_failure();
    report.steps.push(StepReport { id: step.id.to_owned(), outcome });

    if failed && policy == FailurePolicy::Abort {
      report.skipped = steps[i + 1..].iter().map(|s| s.id.to_owned()).collect();
      break;
    }
  }
  report
}

/// Add whatever part of `step` is missing, then record it in the ledger.
pub fn apply_step(conn: &mut Connection, step: &Step) -> rusqlite::Result<StepOutcome> {
  let tx = conn.transaction()?;
  let present = table_columns(&tx, step.table)?;
  let mut changed = false;

  for column in step.columns {
    if present.contains(column.name) {
      continue;
    }
    tx.execute(
      &format!("ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}", step.table, column.name, column.decl),
      [],
    )?;
    if let Some(backfill) = column.backfill {
      tx.execute(backfill, [])?;
    }
    changed = true;
  }

  for index in step.indexes {
    if index_exists(&tx, index.name)? {
      continue;
    }
    tx.execute(
      &format!("CREATE INDEX \"{}\" ON \"{}\"({})", index.name, step.table, index.columns),
      [],
    )?;
    changed = true;
  }

  tx.execute(
    "INSERT OR IGNORE INTO schema_steps (id, applied_at) VALUES (?1, ?2)",
    rusqlite::params![step.id, encode_dt(Utc::now())],
  )?;
  tx.commit()?;

  Ok(if changed { StepOutcome::Applied } else { StepOutcome::AlreadyPresent })
}

/// Drop what `step` added: indexes first, then columns in reverse order.
pub fn revert_step(conn: &mut Connection, step: &Step) -> rusqlite::Result<StepOutcome> {
  let tx = conn.transaction()?;
  let mut changed = false;

  for index in step.indexes {
    if index_exists(&tx, index.name)? {
      tx.execute(&format!("DROP INDEX \"{}\"", index.name), [])?;
      changed = true;
    }
  }

  let present = table_columns(&tx, step.table)?;
  for column in step.columns.iter().rev() {
    if present.contains(column.name) {
      tx.execute(
        &format!("ALTER TABLE \"{}\" DROP COLUMN \"{}\"", step.table, column.name),
        [],
      )?;
      changed = true;
    }
  }

  tx.execute("DELETE FROM schema_steps WHERE id = ?1", rusqlite::params![step.id])?;
  tx.commit()?;

  Ok(if changed { StepOutcome::Applied } else { StepOutcome::AlreadyPresent })
}
