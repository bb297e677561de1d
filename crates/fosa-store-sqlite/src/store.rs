//! [`SqliteStore`]: the SQLite implementation of [`GeoStore`].

use std::path::Path;

use chrono::{SubsecRound as _, Utc};
use rusqlite::{Connection, OptionalExtension as _, Row, types::Value};

use fosa_core::{
  cascade::HierarchySnapshot,
  dump::{LoadReport, TargetTable, rewrite_dump},
  entity::{
    Arrondissement, Department, Facility, HealthArea, HealthDistrict, Level, NewArrondissement,
    NewDepartment, NewFacility, NewHealthArea, NewHealthDistrict, NewRegion, Region,
  },
  reconcile::{LinkSpec, ReconcileReport, plan},
  schema::{self, AppliedStep, EvolutionReport, FailurePolicy, STEPS, Step},
  store::{GeoStore, StoredShape},
};

use crate::{
  Error, Result,
  encode::{
    RawArrondissement, RawDepartment, RawFacility, RawHealthArea, RawHealthDistrict, RawRegion,
    decode_dt, encode_dt, text,
  },
  evolve::{apply_step, revert_step, run_steps},
  link::{apply_plan, parent_rows, unlinked_children},
  load::replace_table,
  schema::{SCHEMA, select_list, table_columns},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A FOSA hierarchy store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and create the base tables.
  ///
  /// Schema steps are not applied; run [`GeoStore::evolve_schema`] for that.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store. Useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn conn(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn reconciliation(&self, spec: LinkSpec, write: bool) -> Result<ReconcileReport> {
    spec.validate()?;

    let call_spec = spec.clone();
    let (parents, planned) = self
      .conn
      .call(move |conn| {
        let parents = parent_rows(conn, &call_spec)?;
        let children = unlinked_children(conn, &call_spec)?;
        let planned = plan(&parents, &children);
        if write {
          apply_plan(conn, &call_spec, &planned)?;
        }
        Ok((parents, planned))
      })
      .await?;

    let report = ReconcileReport::from_plan(&spec, &parents, planned, write);
    log_reconciliation(&report);
    Ok(report)
  }
}

fn read_table<T>(
  conn: &Connection,
  table: &str,
  columns: &[&str],
  read: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
  let present = table_columns(conn, table)?;
  let sql = format!("SELECT {} FROM \"{table}\" ORDER BY \"id\"", select_list(&present, columns));
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt.query_map([], read)?;
  rows.collect()
}

fn name_column(level: Level) -> &'static str {
  match level {
    Level::HealthDistrict => "nom_ds",
    Level::HealthArea => "nom_as",
    Level::Region | Level::Department | Level::Arrondissement | Level::Facility => "name",
  }
}

fn log_reconciliation(report: &ReconcileReport) {
  for name in &report.ambiguous {
    tracing::warn!(
      parent_table = %report.parent_table,
      name,
      "several parents share this name; the lowest id is used"
    );
  }
  for orphan in &report.orphans {
    tracing::debug!(
      id = orphan.id,
      name = orphan.name.as_deref(),
      parent = orphan.legacy_name.as_deref(),
      "orphan"
    );
  }
  if !report.orphans.is_empty() {
    tracing::warn!(
      child_table = %report.child_table,
      orphans = report.orphans.len(),
      "rows left without a parent"
    );
  }
  tracing::info!(
    child_table = %report.child_table,
    parent_table = %report.parent_table,
    applied = report.applied,
    visited = report.visited,
    updated = report.updated,
    "reconciliation finished"
  );
}

// ─── GeoStore impl ───────────────────────────────────────────────────────────

impl GeoStore for SqliteStore {
  type Error = Error;

  // ── Rows ──────────────────────────────────────────────────────────────────

  async fn add_region(&self, input: NewRegion) -> Result<Region> {
    let row = input.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO regions (name, capital, population, geom) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![row.name, row.capital, row.population, row.geometry],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Region {
      id,
      name: input.name,
      capital: input.capital,
      population: input.population,
      geometry: input.geometry,
    })
  }

  async fn add_department(&self, input: NewDepartment) -> Result<Department> {
    let row = input.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO departments (name, region_id, geom) VALUES (?1, ?2, ?3)",
          rusqlite::params![row.name, row.region_id, row.geometry],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Department { id, name: input.name, region_id: input.region_id, geometry: input.geometry })
  }

  async fn add_arrondissement(&self, input: NewArrondissement) -> Result<Arrondissement> {
    let row = input.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO arrondissements (name, department_id, geom) VALUES (?1, ?2, ?3)",
          rusqlite::params![row.name, row.department_id, row.geometry],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Arrondissement {
      id,
      name: input.name,
      department_id: input.department_id,
      geometry: input.geometry,
    })
  }

  async fn add_health_district(&self, input: NewHealthDistrict) -> Result<HealthDistrict> {
    let now = Utc::now().trunc_subsecs(0);
    let now_str = encode_dt(now);
    let row = input.clone();

    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO health_districts
             (nom_ds, display_name, region, region_id, code, area, geom, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          rusqlite::params![
            row.name,
            row.display_name,
            row.region.legacy_name,
            row.region.resolved_id,
            row.code,
            row.area,
            row.geometry,
            now_str,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(HealthDistrict {
      id,
      name: input.name,
      display_name: input.display_name,
      region: input.region,
      code: input.code,
      area: input.area,
      geometry: input.geometry,
      created_at: Some(now),
      updated_at: Some(now),
    })
  }

  async fn add_health_area(&self, input: NewHealthArea) -> Result<HealthArea> {
    let row = input.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO health_areas
             (nom_as, display_name, nom_dist, district_id, code, area, geom)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            row.name,
            row.display_name,
            row.district.legacy_name,
            row.district.resolved_id,
            row.code,
            row.area,
            row.geometry,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(HealthArea {
      id,
      name: input.name,
      display_name: input.display_name,
      district: input.district,
      code: input.code,
      area: input.area,
      geometry: input.geometry,
    })
  }

  async fn add_facility(&self, input: NewFacility) -> Result<Facility> {
    let row = input.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO facilities
             (name, kind, latitude, longitude, district_id, health_area_id)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            row.name,
            row.kind,
            row.latitude,
            row.longitude,
            row.district_id,
            row.health_area_id,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(Facility {
      id,
      name: input.name,
      kind: input.kind,
      latitude: input.latitude,
      longitude: input.longitude,
      district_id: input.district_id,
      health_area_id: input.health_area_id,
    })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn snapshot(&self) -> Result<HierarchySnapshot> {
    let snapshot = self
      .conn
      .call(|conn| {
        Ok(HierarchySnapshot {
          regions:         read_table(conn, "regions", RawRegion::COLUMNS, RawRegion::from_row)?
            .into_iter()
            .map(RawRegion::into_region)
            .collect(),
          departments:     read_table(
            conn,
            "departments",
            RawDepartment::COLUMNS,
            RawDepartment::from_row,
          )?
          .into_iter()
          .map(RawDepartment::into_department)
          .collect(),
          arrondissements: read_table(
            conn,
            "arrondissements",
            RawArrondissement::COLUMNS,
            RawArrondissement::from_row,
          )?
          .into_iter()
          .map(RawArrondissement::into_arrondissement)
          .collect(),
          districts:       read_table(
            conn,
            "health_districts",
            RawHealthDistrict::COLUMNS,
            RawHealthDistrict::from_row,
          )?
          .into_iter()
          .map(RawHealthDistrict::into_district)
          .collect(),
          health_areas:    read_table(
            conn,
            "health_areas",
            RawHealthArea::COLUMNS,
            RawHealthArea::from_row,
          )?
          .into_iter()
          .map(RawHealthArea::into_health_area)
          .collect(),
          facilities:      read_table(
            conn,
            "facilities",
            RawFacility::COLUMNS,
            RawFacility::from_row,
          )?
          .into_iter()
          .map(RawFacility::into_facility)
          .collect(),
        })
      })
      .await?;
    Ok(snapshot)
  }

  async fn shape(&self, level: Level, id: i64) -> Result<Option<StoredShape>> {
    if level == Level::Facility {
      return Ok(None);
    }
    let table = level.table();
    let name_col = name_column(level);

    let raw: Option<(Value, Value)> = self
      .conn
      .call(move |conn| {
        let present = table_columns(conn, table)?;
        let sql = format!(
          "SELECT {} FROM \"{table}\" WHERE \"id\" = ?1",
          select_list(&present, &[name_col, "geom"])
        );
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?,
        )
      })
      .await?;

    Ok(raw.map(|(name, geom)| StoredShape {
      level,
      id,
      name: text(name).unwrap_or_default(),
      geometry: text(geom),
    }))
  }

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn evolve_schema(&self, policy: FailurePolicy) -> Result<EvolutionReport> {
    let report = self
      .conn
      .call(move |conn| {
        let steps: Vec<&Step> = STEPS.iter().collect();
        Ok(run_steps(conn, &steps, policy, apply_step))
      })
      .await?;

    tracing::info!(
      applied = report.count(|o| matches!(o, schema::StepOutcome::Applied)),
      failed = report.count(schema::StepOutcome::is_failure),
      skipped = report.skipped.len(),
      "schema evolution finished"
    );
    Ok(report)
  }

  async fn revert_schema(&self, ids: Vec<String>, policy: FailurePolicy) -> Result<EvolutionReport> {
    let mut steps: Vec<&'static Step> = if ids.is_empty() {
      STEPS.iter().collect()
    } else {
      ids
        .iter()
        .map(|id| schema::step(id).ok_or_else(|| fosa_core::Error::UnknownStep(id.clone())))
        .collect::<Result<_, _>>()?
    };
    // Later steps depend on earlier ones, so undo from the end.
    steps.sort_by_key(|s| std::cmp::Reverse(STEPS.iter().position(|d| d.id == s.id)));
    steps.dedup_by_key(|s| s.id);

    let report = self
      .conn
      .call(move |conn| Ok(run_steps(conn, &steps, policy, revert_step)))
      .await?;

    tracing::info!(
      reverted = report.count(|o| matches!(o, schema::StepOutcome::Applied)),
      failed = report.count(schema::StepOutcome::is_failure),
      "schema rollback finished"
    );
    Ok(report)
  }

  async fn applied_steps(&self) -> Result<Vec<AppliedStep>> {
    let raws: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT id, applied_at FROM schema_steps ORDER BY applied_at, id")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(id, at)| decode_dt(&at).map(|applied_at| AppliedStep { id, applied_at }))
      .collect()
  }

  // ── Maintenance ───────────────────────────────────────────────────────────

  async fn bulk_load(
    &self,
    table: TargetTable,
    legacy_name: String,
    dump: String,
  ) -> Result<LoadReport> {
    let target = table.table();
    let rewrite = rewrite_dump(&dump, &legacy_name, target)?;
    if rewrite.inserts_redirected == 0 {
      tracing::warn!(
        legacy = %legacy_name,
        table = target,
        "dump has no inserts into the legacy table; the target will be left empty"
      );
    }

    let sql = rewrite.sql;
    let loaded = self
      .conn
      .call(move |conn| Ok(replace_table(conn, target, &sql).map_err(|e| e.to_string())))
      .await?;
    let counts = loaded.map_err(|message| {
      tracing::error!(table = target, %message, "bulk load rolled back");
      Error::BulkLoad { table: target.to_owned(), message }
    })?;

    let report = LoadReport {
      table,
      rows_before: counts.before,
      rows_after: counts.after,
      inserts_redirected: rewrite.inserts_redirected,
      statements_stripped: rewrite.statements_stripped,
      foreign_inserts: rewrite.foreign_inserts,
    };
    tracing::info!(
      table = target,
      rows_before = report.rows_before,
      rows_after = report.rows_after,
      inserts = report.inserts_redirected,
      stripped = report.statements_stripped,
      "bulk load committed"
    );
    Ok(report)
  }

  async fn reconcile(&self, spec: LinkSpec) -> Result<ReconcileReport> {
    self.reconciliation(spec, true).await
  }

  async fn plan_reconciliation(&self, spec: LinkSpec) -> Result<ReconcileReport> {
    self.reconciliation(spec, false).await
  }
}
