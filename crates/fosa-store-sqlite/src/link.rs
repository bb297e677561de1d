//! Reading and writing rows for foreign-key reconciliation.
//!
//! Every name in the [`LinkSpec`] has been validated as a plain identifier
//! before it reaches these functions.

use fosa_core::{
  reconcile::{ChildRow, LinkSpec, Plan, ParentRow},
  schema::NOW_SQL,
};
use rusqlite::{Connection, types::Value};

use crate::encode::text;

pub fn parent_rows(conn: &Connection, spec: &LinkSpec) -> rusqlite::Result<Vec<ParentRow>> {
  let sql = format!(
    "SELECT \"{id}\", \"{name}\" FROM \"{table}\" WHERE \"{name}\" IS NOT NULL",
    id = spec.parent_id_column,
    name = spec.parent_name_column,
    table = spec.parent_table,
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt.query_map([], |row| {
    Ok((row.get::<_, i64>(0)?, row.get::<_, Value>(1)?))
  })?;

  let mut parents = Vec::new();
  for row in rows {
    let (id, name) = row?;
    if let Some(name) = text(name) {
      parents.push(ParentRow { id, name });
    }
  }
  Ok(parents)
}

/// Child rows whose foreign key is NULL or 0, in id order.
pub fn unlinked_children(conn: &Connection, spec: &LinkSpec) -> rusqlite::Result<Vec<ChildRow>> {
  let sql = format!(
    "SELECT \"{id}\", \"{name}\", \"{legacy}\" FROM \"{table}\" \
     WHERE \"{fk}\" IS NULL OR \"{fk}\" = 0 ORDER BY \"{id}\"",
    id = spec.child_id_column,
    name = spec.child_name_column,
    legacy = spec.legacy_column,
    table = spec.child_table,
    fk = spec.fk_column,
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt.query_map([], |row| {
    Ok(ChildRow {
      id:          row.get(0)?,
      name:        text(row.get(1)?),
      legacy_name: text(row.get(2)?),
    })
  })?;
  rows.collect()
}

/// Write every assignment in `plan`, one autocommitted statement per row.
///
/// An error stops the run; rows written before it stay written.
pub fn apply_plan(conn: &Connection, spec: &LinkSpec, plan: &Plan) -> rusqlite::Result<usize> {
  let touch = spec
    .touch_column
    .as_ref()
    .map(|c| format!(", \"{c}\" = {NOW_SQL}"))
    .unwrap_or_default();
  let sql = format!(
    "UPDATE \"{table}\" SET \"{fk}\" = ?1{touch} WHERE \"{id}\" = ?2",
    table = spec.child_table,
    fk = spec.fk_column,
    id = spec.child_id_column,
  );
  let mut stmt = conn.prepare(&sql)?;

  let mut written = 0;
  for a in &plan.assignments {
    written += stmt.execute(rusqlite::params![a.parent_id, a.child_id])?;
  }
  Ok(written)
}
