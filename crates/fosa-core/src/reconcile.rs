//! Foreign-key reconciliation between a child table and its parent.
//!
//! Source dumps key health districts by region *name* and health areas by
//! district *name*. Reconciliation resolves those names against the canonical
//! parent table and fills in the foreign key. Matching is exact and
//! case-sensitive: `"Nord-Ouest"` and `"Nord Ouest"` are different parents,
//! and rows that do not match are reported as orphans for an operator to fix.
//!
//! This module is the pure half: [`LinkSpec`] describes the tables and
//! [`plan`] decides what to write. Storage backends load the rows, apply the
//! plan and build the [`ReconcileReport`].

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{Result, error::validate_identifier};

// ─── Spec ────────────────────────────────────────────────────────────────────

/// Tables and columns taking part in one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
  pub child_table:        String,
  pub child_id_column:    String,
  /// Column shown to the operator in the orphan report.
  pub child_name_column:  String,
  /// Free-text parent name on the child row.
  pub legacy_column:      String,
  /// Foreign key to fill in.
  pub fk_column:          String,
  pub parent_table:       String,
  pub parent_id_column:   String,
  pub parent_name_column: String,
  /// Timestamp column set to now whenever a row is updated.
  pub touch_column:       Option<String>,
}

impl LinkSpec {
  /// `health_districts.region` → `regions.name`, filling `region_id`.
  pub fn district_to_region() -> Self {
    Self {
      child_table:        "health_districts".into(),
      child_id_column:    "id".into(),
      child_name_column:  "nom_ds".into(),
      legacy_column:      "region".into(),
      fk_column:          "region_id".into(),
      parent_table:       "regions".into(),
      parent_id_column:   "id".into(),
      parent_name_column: "name".into(),
      touch_column:       Some("updated_at".into()),
    }
  }

  /// `health_areas.nom_dist` → `health_districts.nom_ds`, filling
  /// `district_id`.
  pub fn area_to_district() -> Self {
    Self {
      child_table:        "health_areas".into(),
      child_id_column:    "id".into(),
      child_name_column:  "nom_as".into(),
      legacy_column:      "nom_dist".into(),
      fk_column:          "district_id".into(),
      parent_table:       "health_districts".into(),
      parent_id_column:   "id".into(),
      parent_name_column: "nom_ds".into(),
      touch_column:       None,
    }
  }

  /// Check every table and column name before it reaches SQL.
  pub fn validate(&self) -> Result<()> {
    for name in [
      &self.child_table,
      &self.child_id_column,
      &self.child_name_column,
      &self.legacy_column,
      &self.fk_column,
      &self.parent_table,
      &self.parent_id_column,
      &self.parent_name_column,
    ] {
      validate_identifier(name)?;
    }
    if let Some(touch) = &self.touch_column {
      validate_identifier(touch)?;
    }
    Ok(())
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A canonical parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRow {
  pub id:   i64,
  pub name: String,
}

/// A child row whose foreign key is still unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRow {
  pub id:          i64,
  pub name:        Option<String>,
  pub legacy_name: Option<String>,
}

// ─── Plan ────────────────────────────────────────────────────────────────────

/// A child row that could not be matched to any parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orphan {
  pub id:          i64,
  pub name:        Option<String>,
  pub legacy_name: Option<String>,
}

/// A foreign key to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
  pub child_id:  i64,
  pub parent_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
  pub assignments: Vec<Assignment>,
  pub orphans:     Vec<Orphan>,
  /// Parent names carried by more than one parent row.
  pub ambiguous:   Vec<String>,
}

/// Index parents by exact name. When a name repeats, the lowest id wins.
///
/// Parents with an id of zero or below are left out: a child pointed at one
/// would still read as unlinked and be visited again on every run.
pub fn parent_index(parents: &[ParentRow]) -> (HashMap<&str, i64>, Vec<String>) {
  let mut index: HashMap<&str, i64> = HashMap::with_capacity(parents.len());
  let mut ambiguous = Vec::new();
  for p in parents {
    if p.id <= 0 {
      tracing::warn!(parent_id = p.id, parent = %p.name, "skipping parent with a non-positive id");
      continue;
    }
    index
      .entry(p.name.as_str())
      .and_modify(|id| {
        if !ambiguous.contains(&p.name) {
          ambiguous.push(p.name.clone());
        }
        *id = (*id).min(p.id);
      })
      .or_insert(p.id);
  }
  ambiguous.sort();
  (index, ambiguous)
}

/// Decide, for every unlinked child, which parent it gets or that it is an
/// orphan. Each child is visited exactly once, in input order.
pub fn plan(parents: &[ParentRow], children: &[ChildRow]) -> Plan {
  let (index, ambiguous) = parent_index(parents);
  let mut out = Plan { ambiguous, ..Plan::default() };

  for child in children {
    match child.legacy_name.as_deref().and_then(|n| index.get(n)) {
      Some(&parent_id) => out.assignments.push(Assignment { child_id: child.id, parent_id }),
      None => out.orphans.push(Orphan {
        id:          child.id,
        name:        child.name.clone(),
        legacy_name: child.legacy_name.clone(),
      }),
    }
  }
  out
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// How many children one parent received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentTally {
  pub parent_id:   i64,
  pub parent_name: String,
  pub updated:     usize,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
  pub child_table:  String,
  pub parent_table: String,
  /// `false` for a dry run: nothing was written.
  pub applied:      bool,
  /// Unlinked rows examined.
  pub visited:      usize,
  /// Rows whose foreign key was set (or would be, for a dry run).
  pub updated:      usize,
  /// Per-parent counts, ordered by parent name.
  pub per_parent:   Vec<ParentTally>,
  pub orphans:      Vec<Orphan>,
  pub ambiguous:    Vec<String>,
}

impl ReconcileReport {
  /// Summarize a plan. `applied` says whether its assignments were written.
  pub fn from_plan(spec: &LinkSpec, parents: &[ParentRow], plan: Plan, applied: bool) -> Self {
    let names: HashMap<i64, &str> = parents.iter().map(|p| (p.id, p.name.as_str())).collect();

    let mut counts: BTreeMap<(String, i64), usize> = BTreeMap::new();
    for a in &plan.assignments {
      let name = names.get(&a.parent_id).copied().unwrap_or_default().to_owned();
      *counts.entry((name, a.parent_id)).or_default() += 1;
    }

    Self {
      child_table:  spec.child_table.clone(),
      parent_table: spec.parent_table.clone(),
      applied,
      visited:      plan.assignments.len() + plan.orphans.len(),
      updated:      plan.assignments.len(),
      per_parent:   counts
        .into_iter()
        .map(|((parent_name, parent_id), updated)| ParentTally { parent_id, parent_name, updated })
        .collect(),
      orphans:      plan.orphans,
      ambiguous:    plan.ambiguous,
    }
  }
}
