//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::HashSet;

use fosa_core::{
  cascade::{Pick, Selection, resolve},
  dump::TargetTable,
  entity::{Level, LinkMode, NewFacility, NewHealthArea, NewHealthDistrict, NewRegion, ParentLink},
  reconcile::LinkSpec,
  schema::{FailurePolicy, STEPS, StepOutcome},
  store::GeoStore,
};

use crate::{
  Error, SqliteStore,
  schema::{index_exists, table_columns},
};

/// Base tables only, no schema steps.
async fn bare_store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// Fully evolved store.
async fn store() -> SqliteStore {
  let s = bare_store().await;
  let report = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert!(report.succeeded(), "{report:?}");
  s
}

async fn exec(s: &SqliteStore, sql: &'static str) {
  s.conn()
    .call(move |c| {
      c.execute_batch(sql)?;
      Ok(())
    })
    .await
    .unwrap();
}

async fn columns(s: &SqliteStore, table: &'static str) -> HashSet<String> {
  s.conn()
    .call(move |c| Ok(table_columns(c, table)?))
    .await
    .unwrap()
}

async fn has_index(s: &SqliteStore, name: &'static str) -> bool {
  s.conn()
    .call(move |c| Ok(index_exists(c, name)?))
    .await
    .unwrap()
}

async fn district_names(s: &SqliteStore) -> Vec<String> {
  s.snapshot().await.unwrap().districts.into_iter().map(|d| d.name).collect()
}

async fn foreign_keys_on(s: &SqliteStore) -> bool {
  s.conn()
    .call(|c| Ok(c.query_row("PRAGMA foreign_keys", [], |r| r.get::<_, i64>(0))? == 1))
    .await
    .unwrap()
}

async fn count(s: &SqliteStore, table: &'static str) -> i64 {
  s.conn()
    .call(move |c| {
      Ok(c.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?)
    })
    .await
    .unwrap()
}

fn district(name: &str, region: Option<&str>) -> NewHealthDistrict {
  NewHealthDistrict {
    name: name.into(),
    region: ParentLink { legacy_name: region.map(Into::into), resolved_id: None },
    ..NewHealthDistrict::default()
  }
}

fn region(name: &str) -> NewRegion { NewRegion { name: name.into(), ..NewRegion::default() } }

// ─── Schema evolution ────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_store_has_legacy_shaped_tables() {
  let s = bare_store().await;
  let expected: HashSet<String> = ["id", "nom_ds"].into_iter().map(String::from).collect();
  assert_eq!(columns(&s, "health_districts").await, expected);

  // Missing columns read as empty values.
  exec(&s, "INSERT INTO health_districts (id, nom_ds) VALUES (1, 'Biyem-Assi');").await;
  let snap = s.snapshot().await.unwrap();
  assert_eq!(snap.districts.len(), 1);
  assert_eq!(snap.districts[0].name, "Biyem-Assi");
  assert_eq!(snap.districts[0].region, ParentLink::default());
}

#[tokio::test]
async fn evolution_is_rerunnable() {
  let s = bare_store().await;

  let first = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert_eq!(first.steps.len(), STEPS.len());
  assert!(first.steps.iter().all(|r| r.outcome == StepOutcome::Applied));

  let second = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert!(second.steps.iter().all(|r| r.outcome == StepOutcome::AlreadyPresent));

  let applied: Vec<String> = s.applied_steps().await.unwrap().into_iter().map(|a| a.id).collect();
  assert_eq!(applied.len(), STEPS.len());

  let cols = columns(&s, "health_districts").await;
  for c in ["region", "region_id", "area", "code", "display_name", "geom", "created_at", "updated_at"] {
    assert!(cols.contains(c), "missing {c}");
  }
}

#[tokio::test]
async fn partially_present_step_adds_only_what_is_missing() {
  let s = bare_store().await;
  exec(&s, "ALTER TABLE regions ADD COLUMN capital TEXT;").await;

  let report = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert_eq!(report.steps[0].id, "regions_capital_population");
  assert_eq!(report.steps[0].outcome, StepOutcome::Applied);
  assert!(columns(&s, "regions").await.contains("population"));
}

#[tokio::test]
async fn abort_policy_skips_remaining_steps() {
  let s = bare_store().await;
  exec(&s, "DROP TABLE health_areas;").await;

  let report = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  let outcomes: Vec<_> = report.steps.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(
    outcomes,
    vec!["regions_capital_population", "health_districts_geography", "health_areas_geography"]
  );
  assert!(report.steps[2].outcome.is_failure());
  assert_eq!(
    report.skipped,
    vec!["health_districts_region_fk", "health_areas_district_fk", "health_districts_timestamps"]
  );
  assert!(!report.succeeded());
}

#[tokio::test]
async fn continue_policy_attempts_every_step() {
  let s = bare_store().await;
  exec(&s, "DROP TABLE health_areas;").await;

  let report = s.evolve_schema(FailurePolicy::Continue).await.unwrap();
  assert_eq!(report.steps.len(), STEPS.len());
  assert!(report.skipped.is_empty());
  assert_eq!(report.count(StepOutcome::is_failure), 2);
  assert!(columns(&s, "health_districts").await.contains("updated_at"));
}

#[tokio::test]
async fn timestamps_are_backfilled_for_existing_rows() {
  let s = bare_store().await;
  exec(&s, "INSERT INTO health_districts (id, nom_ds) VALUES (1, 'Deido');").await;
  s.evolve_schema(FailurePolicy::Abort).await.unwrap();

  let snap = s.snapshot().await.unwrap();
  assert!(snap.districts[0].created_at.is_some());
  assert!(snap.districts[0].updated_at.is_some());
}

#[tokio::test]
async fn reverting_a_step_drops_its_columns() {
  let s = store().await;

  let report = s
    .revert_schema(vec!["regions_capital_population".into()], FailurePolicy::Abort)
    .await
    .unwrap();
  assert_eq!(report.steps[0].outcome, StepOutcome::Applied);

  let cols = columns(&s, "regions").await;
  assert!(!cols.contains("capital"));
  assert!(!cols.contains("population"));
  assert!(!s.applied_steps().await.unwrap().iter().any(|a| a.id == "regions_capital_population"));

  let again = s
    .revert_schema(vec!["regions_capital_population".into()], FailurePolicy::Abort)
    .await
    .unwrap();
  assert_eq!(again.steps[0].outcome, StepOutcome::AlreadyPresent);

  let redo = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert_eq!(redo.count(|o| matches!(o, StepOutcome::Applied)), 1);
}

#[tokio::test]
async fn reverting_timestamps_keeps_rows() {
  let s = store().await;
  s.add_health_district(district("Deido", Some("Littoral"))).await.unwrap();

  s.revert_schema(vec!["health_districts_timestamps".into()], FailurePolicy::Abort)
    .await
    .unwrap();

  let snap = s.snapshot().await.unwrap();
  assert_eq!(snap.districts.len(), 1);
  assert!(snap.districts[0].created_at.is_none());
  assert!(!columns(&s, "health_districts").await.contains("created_at"));
}

#[tokio::test]
async fn reverting_foreign_key_steps_drops_linked_columns_and_indexes() {
  let s = seeded().await;
  s.add_health_area(NewHealthArea {
    name: "Mendong".into(),
    district: ParentLink::unresolved("Biyem-Assi"),
    ..NewHealthArea::default()
  })
  .await
  .unwrap();
  s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  assert_eq!(s.reconcile(LinkSpec::area_to_district()).await.unwrap().updated, 1);

  let report = s
    .revert_schema(
      vec!["health_districts_region_fk".into(), "health_areas_district_fk".into()],
      FailurePolicy::Abort,
    )
    .await
    .unwrap();
  let ids: Vec<_> = report.steps.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(ids, vec!["health_areas_district_fk", "health_districts_region_fk"]);
  assert!(report.steps.iter().all(|r| r.outcome == StepOutcome::Applied), "{report:?}");

  assert!(!columns(&s, "health_districts").await.contains("region_id"));
  assert!(!columns(&s, "health_areas").await.contains("district_id"));
  assert!(!has_index(&s, "health_districts_region_idx").await);
  assert!(!has_index(&s, "health_areas_district_idx").await);
  assert_eq!(count(&s, "health_districts").await, 4);
  assert_eq!(count(&s, "health_areas").await, 1);

  // Reapplying brings the links back unset.
  let redo = s.evolve_schema(FailurePolicy::Abort).await.unwrap();
  assert_eq!(redo.count(|o| matches!(o, StepOutcome::Applied)), 2);
  assert!(has_index(&s, "health_districts_region_idx").await);
  let snap = s.snapshot().await.unwrap();
  assert!(snap.districts.iter().all(|d| !d.region.is_resolved()));
}

#[tokio::test]
async fn reverting_everything_undoes_every_step() {
  let s = store().await;
  s.add_health_district(district("Deido", Some("Littoral"))).await.unwrap();

  let report = s.revert_schema(Vec::new(), FailurePolicy::Abort).await.unwrap();
  assert_eq!(report.steps.len(), STEPS.len());
  assert!(report.steps.iter().all(|r| r.outcome == StepOutcome::Applied), "{report:?}");
  assert!(s.applied_steps().await.unwrap().is_empty());

  let cols = columns(&s, "health_districts").await;
  assert_eq!(cols, HashSet::from(["id".to_owned(), "nom_ds".to_owned()]));
  assert_eq!(district_names(&s).await, vec!["Deido"]);
}

#[tokio::test]
async fn reverting_an_unknown_step_is_an_error() {
  let s = store().await;
  let err = s.revert_schema(vec!["nope".into()], FailurePolicy::Abort).await;
  assert!(matches!(err, Err(Error::Core(fosa_core::Error::UnknownStep(_)))));
}

// ─── Bulk load ───────────────────────────────────────────────────────────────

const DISTRICT_DUMP: &str = "\
SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";
START TRANSACTION;
INSERT INTO `district` (`id`, `nom_ds`, `region`) VALUES
(1, 'Biyem-Assi', 'Centre'),
(2, 'Deido', 'Littoral');
COMMIT;
";

#[tokio::test]
async fn bulk_load_replaces_rows_despite_references() {
  let s = store().await;
  let old = s.add_health_district(district("Old", Some("Centre"))).await.unwrap();
  // A facility referencing the row that the load deletes.
  s.add_facility(NewFacility {
    name: "CSI Old".into(),
    district_id: Some(old.id),
    ..NewFacility::default()
  })
  .await
  .unwrap();

  let report = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), DISTRICT_DUMP.into())
    .await
    .unwrap();

  assert_eq!(report.rows_before, 1);
  assert_eq!(report.rows_after, 2);
  assert_eq!(report.inserts_redirected, 1);
  assert_eq!(report.statements_stripped, 3);
  assert!(foreign_keys_on(&s).await);

  let names: Vec<String> = s.snapshot().await.unwrap().districts.into_iter().map(|d| d.name).collect();
  assert_eq!(names, vec!["Biyem-Assi", "Deido"]);
}

#[tokio::test]
async fn failed_load_rolls_back_and_restores_foreign_keys() {
  let s = store().await;
  s.add_health_district(district("Keep", Some("Centre"))).await.unwrap();

  let dump = "INSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'A');\n\
              INSERT INTO `district` (`id`, `bogus`) VALUES (2, 'B');\n";
  let err = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await
    .unwrap_err();

  match err {
    Error::BulkLoad { table, message } => {
      assert_eq!(table, "health_districts");
      assert!(message.contains("bogus"), "{message}");
    }
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(foreign_keys_on(&s).await);

  let snap = s.snapshot().await.unwrap();
  assert_eq!(snap.districts.len(), 1);
  assert_eq!(snap.districts[0].name, "Keep");
}

#[tokio::test]
async fn commit_sharing_a_line_with_an_insert_cannot_break_atomicity() {
  let s = store().await;
  s.add_health_district(district("Keep", Some("Centre"))).await.unwrap();

  let dump = "INSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'A'); COMMIT;\n\
              INSERT INTO `district` (`id`, `bogus`) VALUES (2, 'B');\n";
  let err = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await;

  assert!(matches!(err, Err(Error::BulkLoad { .. })), "{err:?}");
  assert!(foreign_keys_on(&s).await);
  assert_eq!(district_names(&s).await, vec!["Keep"]);
}

#[tokio::test]
async fn constraint_violation_midway_keeps_prior_rows() {
  let s = store().await;
  s.add_health_district(district("Keep", Some("Centre"))).await.unwrap();
  s.add_health_district(district("Also kept", Some("Littoral"))).await.unwrap();

  let dump = "INSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'A'), (2, 'B');\n\
              INSERT INTO `district` (`id`, `nom_ds`) VALUES (2, 'Duplicate');\n\
              INSERT INTO `district` (`id`, `nom_ds`) VALUES (3, 'C');\n";
  let err = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await
    .unwrap_err();

  match err {
    Error::BulkLoad { message, .. } => assert!(message.contains("UNIQUE"), "{message}"),
    other => panic!("unexpected error: {other:?}"),
  }
  assert!(foreign_keys_on(&s).await);
  assert_eq!(count(&s, "health_districts").await, 2);
  assert_eq!(district_names(&s).await, vec!["Keep", "Also kept"]);

  // A missing NOT NULL value fails the same way.
  let dump = "INSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'A');\n\
              INSERT INTO `district` (`id`, `nom_ds`) VALUES (2, NULL);\n";
  let err = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await;
  assert!(matches!(err, Err(Error::BulkLoad { .. })), "{err:?}");
  assert!(foreign_keys_on(&s).await);
  assert_eq!(district_names(&s).await, vec!["Keep", "Also kept"]);
}

#[tokio::test]
async fn savepoint_in_dump_is_refused_before_any_write() {
  let s = store().await;
  s.add_health_district(district("Keep", Some("Centre"))).await.unwrap();

  let dump = "SAVEPOINT import;\nINSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'A');\nRELEASE import;\n";
  let err = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await;

  assert!(matches!(err, Err(Error::Core(fosa_core::Error::InvalidRewrite(_)))), "{err:?}");
  assert_eq!(district_names(&s).await, vec!["Keep"]);
}

#[tokio::test]
async fn load_leaves_similarly_named_tables_alone() {
  let s = store().await;
  exec(&s, "CREATE TABLE district_archive (id INTEGER PRIMARY KEY, nom_ds TEXT);").await;

  let dump = "INSERT INTO `district` (`id`, `nom_ds`) VALUES (1, 'Biyem-Assi');\n\
              INSERT INTO `district_archive` (`id`, `nom_ds`) VALUES (9, 'Old');\n";
  let report = s
    .bulk_load(TargetTable::HealthDistricts, "district".into(), dump.into())
    .await
    .unwrap();

  assert_eq!(report.inserts_redirected, 1);
  assert_eq!(report.foreign_inserts, 1);
  assert_eq!(count(&s, "health_districts").await, 1);
  assert_eq!(count(&s, "district_archive").await, 1);
}

#[tokio::test]
async fn load_rejects_hostile_legacy_names() {
  let s = store().await;
  let err = s
    .bulk_load(TargetTable::Regions, "region`; DROP TABLE regions; --".into(), String::new())
    .await;
  assert!(matches!(err, Err(Error::Core(fosa_core::Error::InvalidRewrite(_)))));
  assert_eq!(count(&s, "regions").await, 0);
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

async fn seeded() -> SqliteStore {
  let s = store().await;
  s.add_region(region("Centre")).await.unwrap();
  s.add_region(region("Littoral")).await.unwrap();
  s.add_health_district(district("Biyem-Assi", Some("Centre"))).await.unwrap();
  s.add_health_district(district("Deido", Some("Littoral"))).await.unwrap();
  s.add_health_district(district("Obala", Some("centre"))).await.unwrap();
  s.add_health_district(district("Nowhere", None)).await.unwrap();
  s
}

#[tokio::test]
async fn reconcile_links_exact_names_and_lists_orphans() {
  let s = seeded().await;
  exec(&s, "UPDATE health_districts SET updated_at = NULL;").await;

  let report = s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  assert!(report.applied);
  assert_eq!(report.visited, 4);
  assert_eq!(report.updated, 2);

  let orphans: Vec<_> = report.orphans.iter().map(|o| o.name.as_deref().unwrap()).collect();
  assert_eq!(orphans, vec!["Obala", "Nowhere"]);
  assert_eq!(report.orphans[0].legacy_name.as_deref(), Some("centre"));

  let tallies: Vec<_> = report.per_parent.iter().map(|t| (t.parent_name.as_str(), t.updated)).collect();
  assert_eq!(tallies, vec![("Centre", 1), ("Littoral", 1)]);

  let snap = s.snapshot().await.unwrap();
  let centre = snap.regions.iter().find(|r| r.name == "Centre").unwrap();
  let biyem = snap.districts.iter().find(|d| d.name == "Biyem-Assi").unwrap();
  assert_eq!(biyem.region.resolved_id, Some(centre.id));
  assert!(biyem.updated_at.is_some());
  let obala = snap.districts.iter().find(|d| d.name == "Obala").unwrap();
  assert_eq!(obala.region.resolved_id, None);
  assert!(obala.updated_at.is_none());
}

#[tokio::test]
async fn reconcile_is_idempotent() {
  let s = seeded().await;
  let first = s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  let second = s.reconcile(LinkSpec::district_to_region()).await.unwrap();

  assert_eq!(second.updated, 0);
  assert_eq!(second.visited, 2);
  assert_eq!(second.orphans, first.orphans);
}

#[tokio::test]
async fn zero_foreign_key_counts_as_unset() {
  let s = seeded().await;
  s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  // Zeros arrive through bulk loads, which run with foreign keys off.
  exec(
    &s,
    "PRAGMA foreign_keys = OFF;
     UPDATE health_districts SET region_id = 0 WHERE nom_ds = 'Deido';
     PRAGMA foreign_keys = ON;",
  )
  .await;
  assert!(foreign_keys_on(&s).await);

  let report = s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  assert_eq!(report.updated, 1);
  assert_eq!(report.per_parent[0].parent_name, "Littoral");
}

#[tokio::test]
async fn dry_run_writes_nothing() {
  let s = seeded().await;

  let planned = s.plan_reconciliation(LinkSpec::district_to_region()).await.unwrap();
  assert!(!planned.applied);
  assert_eq!(planned.updated, 2);
  assert!(s.snapshot().await.unwrap().districts.iter().all(|d| !d.region.is_resolved()));

  let applied = s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  assert_eq!(applied.updated, planned.updated);
  assert_eq!(applied.orphans, planned.orphans);
}

#[tokio::test]
async fn invalid_link_spec_is_rejected_before_sql() {
  let s = seeded().await;
  let mut spec = LinkSpec::district_to_region();
  spec.parent_table = "regions; DROP TABLE regions".into();

  let err = s.reconcile(spec).await;
  assert!(matches!(err, Err(Error::Core(fosa_core::Error::InvalidIdentifier(_)))));
  assert_eq!(count(&s, "regions").await, 2);
}

#[tokio::test]
async fn reference_mode_agrees_with_name_mode_after_reconciliation() {
  let s = seeded().await;
  let biyem = s.snapshot().await.unwrap().districts[0].clone();
  s.add_health_area(NewHealthArea {
    name: "Mendong".into(),
    district: ParentLink::unresolved(biyem.name.clone()),
    ..NewHealthArea::default()
  })
  .await
  .unwrap();

  s.reconcile(LinkSpec::district_to_region()).await.unwrap();
  let areas = s.reconcile(LinkSpec::area_to_district()).await.unwrap();
  assert_eq!(areas.updated, 1);

  let snap = s.snapshot().await.unwrap();
  let sel = Selection { region: Some(Pick::Name("Centre".into())), ..Selection::default() };
  let by_name = resolve(&snap, &sel, LinkMode::Name).view();
  let by_ref = resolve(&snap, &sel, LinkMode::Reference).view();

  assert_eq!(by_ref.districts.names, vec!["Biyem-Assi"]);
  assert_eq!(by_ref.districts, by_name.districts);
  assert_eq!(by_ref.health_areas, by_name.health_areas);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn loosely_typed_cells_are_read_leniently() {
  let s = store().await;
  exec(
    &s,
    "INSERT INTO health_districts (id, nom_ds, area, code) VALUES (1, 'A', 'n/a', NULL);
     INSERT INTO health_districts (id, nom_ds, area, code) VALUES (2, 'B', '12.5', 42);",
  )
  .await;

  let snap = s.snapshot().await.unwrap();
  assert_eq!(snap.districts[0].area, None);
  assert_eq!(snap.districts[1].area, Some(12.5));
  assert_eq!(snap.districts[1].code.as_deref(), Some("42"));
}

#[tokio::test]
async fn shape_returns_name_and_raw_geometry() {
  let s = store().await;
  let geom = r#"{"type":"Polygon","coordinates":[[[11.5,3.8],[11.6,3.8],[11.5,3.8]]]}"#;
  let d = s
    .add_health_district(NewHealthDistrict {
      geometry: Some(geom.into()),
      ..district("Biyem-Assi", Some("Centre"))
    })
    .await
    .unwrap();

  let shape = s.shape(Level::HealthDistrict, d.id).await.unwrap().unwrap();
  assert_eq!(shape.name, "Biyem-Assi");
  assert_eq!(shape.geometry.as_deref(), Some(geom));

  assert!(s.shape(Level::HealthDistrict, 999).await.unwrap().is_none());
  assert!(s.shape(Level::Facility, d.id).await.unwrap().is_none());
}
