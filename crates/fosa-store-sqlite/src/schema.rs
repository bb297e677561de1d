//! Base SQL schema for the FOSA SQLite store.
//!
//! The tables start in the shape the legacy exports use: health districts and
//! health areas carry nothing but a name. Everything else is added by the
//! declared steps in [`fosa_core::schema::STEPS`].

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension as _};

/// Base DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS regions (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL,
    geom  TEXT             -- GeoJSON, possibly string-encoded
);

CREATE TABLE IF NOT EXISTS departments (
    id         INTEGER PRIMARY KEY,
    name       TEXT NOT NULL,
    region_id  INTEGER REFERENCES regions(id),
    geom       TEXT
);

CREATE TABLE IF NOT EXISTS arrondissements (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    department_id  INTEGER REFERENCES departments(id),
    geom           TEXT
);

CREATE TABLE IF NOT EXISTS health_districts (
    id      INTEGER PRIMARY KEY,
    nom_ds  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS health_areas (
    id      INTEGER PRIMARY KEY,
    nom_as  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS facilities (
    id              INTEGER PRIMARY KEY,
    name            TEXT NOT NULL,
    kind            TEXT,
    latitude        REAL,
    longitude       REAL,
    district_id     INTEGER REFERENCES health_districts(id),
    health_area_id  INTEGER REFERENCES health_areas(id)
);

-- Ledger of applied schema steps.
CREATE TABLE IF NOT EXISTS schema_steps (
    id          TEXT PRIMARY KEY,
    applied_at  TEXT NOT NULL  -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS departments_region_idx        ON departments(region_id);
CREATE INDEX IF NOT EXISTS arrondissements_department_idx ON arrondissements(department_id);
CREATE INDEX IF NOT EXISTS facilities_district_idx        ON facilities(district_id);
CREATE INDEX IF NOT EXISTS facilities_health_area_idx     ON facilities(health_area_id);
";

// ─── Introspection ───────────────────────────────────────────────────────────
//
// Table and column names reaching these helpers are either declared constants
// or validated identifiers.

/// Column names of `table`; empty if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
  let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
  names.collect()
}

pub fn index_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
        rusqlite::params![name],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
  let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;
  Ok(n.max(0) as u64)
}

/// `SELECT` list for `wanted`, with `NULL` standing in for absent columns.
pub fn select_list(present: &HashSet<String>, wanted: &[&str]) -> String {
  wanted
    .iter()
    .map(|c| if present.contains(*c) { format!("\"{c}\"") } else { "NULL".to_owned() })
    .collect::<Vec<_>>()
    .join(", ")
}
