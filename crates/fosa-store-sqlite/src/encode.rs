//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Legacy dumps are loosely typed: a `REAL` column may hold text, geometry may
//! arrive as a blob. Rows are therefore read as raw [`Value`]s and converted
//! leniently; a cell that cannot be read as the expected type becomes `None`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use fosa_core::entity::{
  Arrondissement, Department, Facility, HealthArea, HealthDistrict, ParentLink, Region,
};
use rusqlite::{Row, types::Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Same shape as [`fosa_core::schema::NOW_SQL`] produces.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Secs, true) }

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS` (taken as UTC).
pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|naive| naive.and_utc())
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Cells ───────────────────────────────────────────────────────────────────

pub fn text(value: Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::Text(s) => Some(s),
    Value::Blob(bytes) => String::from_utf8(bytes).ok(),
    Value::Integer(i) => Some(i.to_string()),
    Value::Real(f) => Some(f.to_string()),
  }
}

pub fn real(value: Value) -> Option<f64> {
  match value {
    Value::Integer(i) => Some(i as f64),
    Value::Real(f) => Some(f),
    Value::Text(s) => s.trim().parse().ok(),
    Value::Null | Value::Blob(_) => None,
  }
}

pub fn integer(value: Value) -> Option<i64> {
  match value {
    Value::Integer(i) => Some(i),
    Value::Real(f) if f.fract() == 0.0 => Some(f as i64),
    Value::Text(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn timestamp(value: Value, column: &str, id: i64) -> Option<DateTime<Utc>> {
  let raw = text(value)?;
  match decode_dt(&raw) {
    Ok(dt) => Some(dt),
    Err(e) => {
      tracing::warn!(id, column, error = %e, "unreadable timestamp ignored");
      None
    }
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────
//
// `COLUMNS` lists what each row type selects, in order. Columns that schema
// evolution has not added yet are selected as NULL.

pub struct RawRegion {
  pub id:         i64,
  pub name:       Value,
  pub capital:    Value,
  pub population: Value,
  pub geom:       Value,
}

impl RawRegion {
  pub const COLUMNS: &'static [&'static str] = &["id", "name", "capital", "population", "geom"];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      name:       row.get(1)?,
      capital:    row.get(2)?,
      population: row.get(3)?,
      geom:       row.get(4)?,
    })
  }

  pub fn into_region(self) -> Region {
    Region {
      id:         self.id,
      name:       text(self.name).unwrap_or_default(),
      capital:    text(self.capital),
      population: integer(self.population),
      geometry:   text(self.geom),
    }
  }
}

pub struct RawDepartment {
  pub id:        i64,
  pub name:      Value,
  pub region_id: Value,
  pub geom:      Value,
}

impl RawDepartment {
  pub const COLUMNS: &'static [&'static str] = &["id", "name", "region_id", "geom"];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { id: row.get(0)?, name: row.get(1)?, region_id: row.get(2)?, geom: row.get(3)? })
  }

  pub fn into_department(self) -> Department {
    Department {
      id:        self.id,
      name:      text(self.name).unwrap_or_default(),
      region_id: integer(self.region_id),
      geometry:  text(self.geom),
    }
  }
}

pub struct RawArrondissement {
  pub id:            i64,
  pub name:          Value,
  pub department_id: Value,
  pub geom:          Value,
}

impl RawArrondissement {
  pub const COLUMNS: &'static [&'static str] = &["id", "name", "department_id", "geom"];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { id: row.get(0)?, name: row.get(1)?, department_id: row.get(2)?, geom: row.get(3)? })
  }

  pub fn into_arrondissement(self) -> Arrondissement {
    Arrondissement {
      id:            self.id,
      name:          text(self.name).unwrap_or_default(),
      department_id: integer(self.department_id),
      geometry:      text(self.geom),
    }
  }
}

pub struct RawHealthDistrict {
  pub id:           i64,
  pub nom_ds:       Value,
  pub display_name: Value,
  pub region:       Value,
  pub region_id:    Value,
  pub code:         Value,
  pub area:         Value,
  pub geom:         Value,
  pub created_at:   Value,
  pub updated_at:   Value,
}

impl RawHealthDistrict {
  pub const COLUMNS: &'static [&'static str] = &[
    "id",
    "nom_ds",
    "display_name",
    "region",
    "region_id",
    "code",
    "area",
    "geom",
    "created_at",
    "updated_at",
  ];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      nom_ds:       row.get(1)?,
      display_name: row.get(2)?,
      region:       row.get(3)?,
      region_id:    row.get(4)?,
      code:         row.get(5)?,
      area:         row.get(6)?,
      geom:         row.get(7)?,
      created_at:   row.get(8)?,
      updated_at:   row.get(9)?,
    })
  }

  pub fn into_district(self) -> HealthDistrict {
    HealthDistrict {
      id:           self.id,
      name:         text(self.nom_ds).unwrap_or_default(),
      display_name: text(self.display_name),
      region:       ParentLink {
        legacy_name: text(self.region),
        resolved_id: integer(self.region_id),
      },
      code:         text(self.code),
      area:         real(self.area),
      geometry:     text(self.geom),
      created_at:   timestamp(self.created_at, "created_at", self.id),
      updated_at:   timestamp(self.updated_at, "updated_at", self.id),
    }
  }
}

pub struct RawHealthArea {
  pub id:           i64,
  pub nom_as:       Value,
  pub display_name: Value,
  pub nom_dist:     Value,
  pub district_id:  Value,
  pub code:         Value,
  pub area:         Value,
  pub geom:         Value,
}

impl RawHealthArea {
  pub const COLUMNS: &'static [&'static str] =
    &["id", "nom_as", "display_name", "nom_dist", "district_id", "code", "area", "geom"];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      nom_as:       row.get(1)?,
      display_name: row.get(2)?,
      nom_dist:     row.get(3)?,
      district_id:  row.get(4)?,
      code:         row.get(5)?,
      area:         row.get(6)?,
      geom:         row.get(7)?,
    })
  }

  pub fn into_health_area(self) -> HealthArea {
    HealthArea {
      id:           self.id,
      name:         text(self.nom_as).unwrap_or_default(),
      display_name: text(self.display_name),
      district:     ParentLink {
        legacy_name: text(self.nom_dist),
        resolved_id: integer(self.district_id),
      },
      code:         text(self.code),
      area:         real(self.area),
      geometry:     text(self.geom),
    }
  }
}

pub struct RawFacility {
  pub id:             i64,
  pub name:           Value,
  pub kind:           Value,
  pub latitude:       Value,
  pub longitude:      Value,
  pub district_id:    Value,
  pub health_area_id: Value,
}

impl RawFacility {
  pub const COLUMNS: &'static [&'static str] =
    &["id", "name", "kind", "latitude", "longitude", "district_id", "health_area_id"];

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      name:           row.get(1)?,
      kind:           row.get(2)?,
      latitude:       row.get(3)?,
      longitude:      row.get(4)?,
      district_id:    row.get(5)?,
      health_area_id: row.get(6)?,
    })
  }

  pub fn into_facility(self) -> Facility {
    Facility {
      id:             self.id,
      name:           text(self.name).unwrap_or_default(),
      kind:           text(self.kind),
      latitude:       real(self.latitude),
      longitude:      real(self.longitude),
      district_id:    integer(self.district_id),
      health_area_id: integer(self.health_area_id),
    }
  }
}
