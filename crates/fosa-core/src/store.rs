//! The `GeoStore` trait.
//!
//! Implemented by storage backends (e.g. `fosa-store-sqlite`). The HTTP layer
//! and the `fosa` binary depend on this abstraction, not on a concrete
//! backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  cascade::HierarchySnapshot,
  dump::{LoadReport, TargetTable},
  entity::{
    Arrondissement, Department, Facility, HealthArea, HealthDistrict, Level, NewArrondissement,
    NewDepartment, NewFacility, NewHealthArea, NewHealthDistrict, NewRegion, Region,
  },
  reconcile::{LinkSpec, ReconcileReport},
  schema::{AppliedStep, EvolutionReport, FailurePolicy},
};

/// The stored geometry of one row, with its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredShape {
  pub level:    Level,
  pub id:       i64,
  pub name:     String,
  pub geometry: Option<String>,
}

/// Abstraction over a FOSA hierarchy store.
///
/// Request-time reads (`snapshot`, `shape`) never write. Maintenance
/// operations (schema evolution, bulk loads, reconciliation) own their
/// transactions.
///
/// All methods return `Send` futures so the trait can be used from axum
/// handlers on a multi-threaded runtime.
pub trait GeoStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Rows ──────────────────────────────────────────────────────────────

  /// Requires the `regions_capital_population` step.
  fn add_region(
    &self,
    input: NewRegion,
  ) -> impl Future<Output = Result<Region, Self::Error>> + Send + '_;

  fn add_department(
    &self,
    input: NewDepartment,
  ) -> impl Future<Output = Result<Department, Self::Error>> + Send + '_;

  fn add_arrondissement(
    &self,
    input: NewArrondissement,
  ) -> impl Future<Output = Result<Arrondissement, Self::Error>> + Send + '_;

  /// Requires the evolved schema (see [`GeoStore::evolve_schema`]).
  fn add_health_district(
    &self,
    input: NewHealthDistrict,
  ) -> impl Future<Output = Result<HealthDistrict, Self::Error>> + Send + '_;

  /// Requires the evolved schema.
  fn add_health_area(
    &self,
    input: NewHealthArea,
  ) -> impl Future<Output = Result<HealthArea, Self::Error>> + Send + '_;

  fn add_facility(
    &self,
    input: NewFacility,
  ) -> impl Future<Output = Result<Facility, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Every row of every level. Columns not yet added by schema evolution
  /// read as `None`.
  fn snapshot(&self) -> impl Future<Output = Result<HierarchySnapshot, Self::Error>> + Send + '_;

  /// Name and raw geometry of one row. `None` if the row does not exist or
  /// the level carries no geometry.
  fn shape(
    &self,
    level: Level,
    id: i64,
  ) -> impl Future<Output = Result<Option<StoredShape>, Self::Error>> + Send + '_;

  // ── Schema ────────────────────────────────────────────────────────────

  /// Apply every declared step in order.
  fn evolve_schema(
    &self,
    policy: FailurePolicy,
  ) -> impl Future<Output = Result<EvolutionReport, Self::Error>> + Send + '_;

  /// Revert the named steps in reverse declaration order, or every step when
  /// `ids` is empty.
  fn revert_schema(
    &self,
    ids: Vec<String>,
    policy: FailurePolicy,
  ) -> impl Future<Output = Result<EvolutionReport, Self::Error>> + Send + '_;

  fn applied_steps(&self) -> impl Future<Output = Result<Vec<AppliedStep>, Self::Error>> + Send + '_;

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Replace every row of `table` with the rows a dump inserts into
  /// `legacy_name`. All or nothing.
  fn bulk_load(
    &self,
    table: TargetTable,
    legacy_name: String,
    dump: String,
  ) -> impl Future<Output = Result<LoadReport, Self::Error>> + Send + '_;

  /// Fill in unset foreign keys from free-text parent names.
  fn reconcile(
    &self,
    spec: LinkSpec,
  ) -> impl Future<Output = Result<ReconcileReport, Self::Error>> + Send + '_;

  /// Compute what [`GeoStore::reconcile`] would do without writing.
  fn plan_reconciliation(
    &self,
    spec: LinkSpec,
  ) -> impl Future<Output = Result<ReconcileReport, Self::Error>> + Send + '_;
}
