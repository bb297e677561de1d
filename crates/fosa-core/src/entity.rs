//! Geographic entities, from region down to facility.
//!
//! Health districts and health areas were historically linked to their
//! parents by a free-text name only. They carry a [`ParentLink`] holding both
//! the legacy name and the reconciled foreign key, and every consumer picks
//! one of the two through [`LinkMode`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ─── Levels ──────────────────────────────────────────────────────────────────

/// One level of the geographic hierarchy.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Level {
  Region,
  Department,
  Arrondissement,
  #[strum(to_string = "health_district", serialize = "district")]
  #[serde(alias = "district")]
  HealthDistrict,
  HealthArea,
  Facility,
}

impl Level {
  /// Table holding rows of this level.
  pub fn table(self) -> &'static str {
    match self {
      Self::Region => "regions",
      Self::Department => "departments",
      Self::Arrondissement => "arrondissements",
      Self::HealthDistrict => "health_districts",
      Self::HealthArea => "health_areas",
      Self::Facility => "facilities",
    }
  }
}

// ─── Parent links ────────────────────────────────────────────────────────────

/// Which half of a [`ParentLink`] a consumer relies on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
  /// Match the free-text parent name. Works on unreconciled rows.
  #[default]
  #[serde(alias = "by_name")]
  Name,
  /// Match the reconciled foreign key. Only sees rows the reconciler resolved.
  #[serde(alias = "by_reference")]
  Reference,
}

/// A two-phase link to a parent row: the free-text name entered by hand and
/// the foreign key filled in by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
  /// Parent name exactly as it appears in the source data.
  pub legacy_name: Option<String>,
  /// Reconciled parent id. `0` in the store is read as unset.
  pub resolved_id: Option<i64>,
}

impl ParentLink {
  pub fn unresolved(legacy_name: impl Into<String>) -> Self {
    Self { legacy_name: Some(legacy_name.into()), resolved_id: None }
  }

  pub fn is_resolved(&self) -> bool { self.resolved_id.is_some_and(|id| id != 0) }

  /// Whether this link points at the parent `(id, name)` under `mode`.
  ///
  /// Name comparison is exact and case-sensitive.
  pub fn points_to(&self, mode: LinkMode, parent_id: i64, parent_name: &str) -> bool {
    match mode {
      LinkMode::Name => self.legacy_name.as_deref() == Some(parent_name),
      LinkMode::Reference => self.is_resolved() && self.resolved_id == Some(parent_id),
    }
  }
}

// ─── Administrative branch ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
  pub id:         i64,
  pub name:       String,
  pub capital:    Option<String>,
  pub population: Option<i64>,
  /// Raw GeoJSON text as stored.
  pub geometry:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
  pub id:        i64,
  pub name:      String,
  pub region_id: Option<i64>,
  pub geometry:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrondissement {
  pub id:            i64,
  pub name:          String,
  pub department_id: Option<i64>,
  pub geometry:      Option<String>,
}

// ─── Health branch ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthDistrict {
  pub id:           i64,
  /// Canonical name (`nom_ds`).
  pub name:         String,
  pub display_name: Option<String>,
  /// Link to the parent region (`region` / `region_id`).
  pub region:       ParentLink,
  pub code:         Option<String>,
  pub area:         Option<f64>,
  pub geometry:     Option<String>,
  pub created_at:   Option<DateTime<Utc>>,
  pub updated_at:   Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthArea {
  pub id:           i64,
  /// Canonical name (`nom_as`).
  pub name:         String,
  pub display_name: Option<String>,
  /// Link to the parent district (`nom_dist` / `district_id`).
  pub district:     ParentLink,
  pub code:         Option<String>,
  pub area:         Option<f64>,
  pub geometry:     Option<String>,
}

/// A health facility (FOSA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
  pub id:             i64,
  pub name:           String,
  pub kind:           Option<String>,
  pub latitude:       Option<f64>,
  pub longitude:      Option<f64>,
  pub district_id:    Option<i64>,
  pub health_area_id: Option<i64>,
}

// ─── Inserts ─────────────────────────────────────────────────────────────────

/// Input for seeding a region. Ids are assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRegion {
  pub name:       String,
  pub capital:    Option<String>,
  pub population: Option<i64>,
  pub geometry:   Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDepartment {
  pub name:      String,
  pub region_id: Option<i64>,
  pub geometry:  Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArrondissement {
  pub name:          String,
  pub department_id: Option<i64>,
  pub geometry:      Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHealthDistrict {
  pub name:         String,
  pub display_name: Option<String>,
  pub region:       ParentLink,
  pub code:         Option<String>,
  pub area:         Option<f64>,
  pub geometry:     Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewHealthArea {
  pub name:         String,
  pub display_name: Option<String>,
  pub district:     ParentLink,
  pub code:         Option<String>,
  pub area:         Option<f64>,
  pub geometry:     Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewFacility {
  pub name:           String,
  pub kind:           Option<String>,
  pub latitude:       Option<f64>,
  pub longitude:      Option<f64>,
  pub district_id:    Option<i64>,
  pub health_area_id: Option<i64>,
}
