//! Declared schema evolution steps.
//!
//! Each step adds nullable columns (optionally with a foreign key, an index or
//! a one-off backfill) to one table. Steps are applied in [`STEPS`] order:
//! the foreign-key steps rely on the free-text columns added before them.
//! Every step can be reverted by dropping what it added.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A column added by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name:     &'static str,
  /// Type and constraint clause following the name in `ADD COLUMN`.
  pub decl:     &'static str,
  /// Statement run once right after the column is added.
  pub backfill: Option<&'static str>,
}

/// An index created after the step's columns exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
  pub name:    &'static str,
  pub columns: &'static str,
}

/// One additive, re-runnable schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
  pub id:      &'static str,
  pub table:   &'static str,
  pub columns: &'static [Column],
  pub indexes: &'static [Index],
}

const fn col(name: &'static str, decl: &'static str) -> Column {
  Column { name, decl, backfill: None }
}

/// SQL expression producing the current UTC time as RFC 3339 text.
pub const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', 'now')";

// SQLite refuses non-constant defaults in `ADD COLUMN`, so timestamps are
// filled by an explicit update instead.
const CREATED_AT_BACKFILL: &str = "UPDATE health_districts \
  SET created_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE created_at IS NULL";
const UPDATED_AT_BACKFILL: &str = "UPDATE health_districts \
  SET updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now') WHERE updated_at IS NULL";

/// All steps, in the order they must be applied.
pub const STEPS: &[Step] = &[
  Step {
    id:      "regions_capital_population",
    table:   "regions",
    columns: &[col("capital", "TEXT"), col("population", "INTEGER")],
    indexes: &[],
  },
  Step {
    id:      "health_districts_geography",
    table:   "health_districts",
    columns: &[
      col("region", "TEXT"),
      col("area", "REAL"),
      col("code", "TEXT"),
      col("display_name", "TEXT"),
      col("geom", "TEXT"),
    ],
    indexes: &[],
  },
  Step {
    id:      "health_areas_geography",
    table:   "health_areas",
    columns: &[
      col("nom_dist", "TEXT"),
      col("area", "REAL"),
      col("code", "TEXT"),
      col("display_name", "TEXT"),
      col("geom", "TEXT"),
    ],
    indexes: &[],
  },
  Step {
    id:      "health_districts_region_fk",
    table:   "health_districts",
    columns: &[col("region_id", "INTEGER REFERENCES regions(id)")],
    indexes: &[Index { name: "health_districts_region_idx", columns: "region_id" }],
  },
  Step {
    id:      "health_areas_district_fk",
    table:   "health_areas",
    columns: &[col("district_id", "INTEGER REFERENCES health_districts(id)")],
    indexes: &[Index { name: "health_areas_district_idx", columns: "district_id" }],
  },
  Step {
    id:      "health_districts_timestamps",
    table:   "health_districts",
    columns: &[
      Column { name: "created_at", decl: "TEXT", backfill: Some(CREATED_AT_BACKFILL) },
      Column { name: "updated_at", decl: "TEXT", backfill: Some(UPDATED_AT_BACKFILL) },
    ],
    indexes: &[],
  },
];

/// Look up a declared step by id.
pub fn step(id: &str) -> Option<&'static Step> { STEPS.iter().find(|s| s.id == id) }

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What happened when a step (or its inverse) ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum StepOutcome {
  /// At least one change was made.
  Applied,
  /// Everything the step declares was already in place (or already gone,
  /// when reverting).
  AlreadyPresent,
  Failed(String),
}

impl StepOutcome {
  pub fn is_failure(&self) -> bool { matches!(self, Self::Failed(_)) }
}

/// What the runner does after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
  /// Stop; later steps are not attempted.
  #[default]
  Abort,
  /// Record the failure and keep going.
  Continue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
  pub id:      String,
  pub outcome: StepOutcome,
}

/// Result of running a batch of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionReport {
  pub steps:   Vec<StepReport>,
  /// Ids of steps never attempted because an earlier one failed under
  /// [`FailurePolicy::Abort`].
  pub skipped: Vec<String>,
}

impl EvolutionReport {
  pub fn succeeded(&self) -> bool {
    self.skipped.is_empty() && !self.steps.iter().any(|s| s.outcome.is_failure())
  }

  pub fn count(&self, outcome: fn(&StepOutcome) -> bool) -> usize {
    self.steps.iter().filter(|s| outcome(&s.outcome)).count()
  }
}

/// A row of the `schema_steps` ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStep {
  pub id:         String,
  pub applied_at: DateTime<Utc>,
}
