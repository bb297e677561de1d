//! Handlers for the cascading filters and the map layer.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/filters` | Candidates for every dropdown |
//! | `GET`  | `/map` | Polygons and markers in scope |
//!
//! Both accept the same query. Each level takes either an id
//! (`?region_id=3`) or an exact name (`?region=Centre`); the id wins when
//! both are given and an empty name means "no selection". `link=name|reference`
//! picks how districts and health areas are matched to their parents.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use fosa_core::{
  cascade::{CascadeView, HierarchySnapshot, MapLayer, Pick, Selection, resolve},
  entity::LinkMode,
  store::GeoStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
  pub region_id:         Option<i64>,
  pub region:            Option<String>,
  pub department_id:     Option<i64>,
  pub department:        Option<String>,
  pub arrondissement_id: Option<i64>,
  pub arrondissement:    Option<String>,
  pub district_id:       Option<i64>,
  pub district:          Option<String>,
  pub health_area_id:    Option<i64>,
  pub health_area:       Option<String>,
  #[serde(default)]
  pub link:              LinkMode,
}

fn pick(id: Option<i64>, name: Option<&str>) -> Option<Pick> {
  match (id, name.map(str::trim)) {
    (Some(id), _) => Some(Pick::Id(id)),
    (None, Some(name)) if !name.is_empty() => Some(Pick::Name(name.to_owned())),
    _ => None,
  }
}

impl FilterParams {
  pub fn selection(&self) -> Selection {
    Selection {
      region:         pick(self.region_id, self.region.as_deref()),
      department:     pick(self.department_id, self.department.as_deref()),
      arrondissement: pick(self.arrondissement_id, self.arrondissement.as_deref()),
      district:       pick(self.district_id, self.district.as_deref()),
      health_area:    pick(self.health_area_id, self.health_area.as_deref()),
    }
  }
}

async fn fresh_snapshot<S>(store: &S) -> Result<HierarchySnapshot, ApiError>
where
  S: GeoStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  store.snapshot().await.map_err(ApiError::store)
}

/// `GET /filters`
pub async fn options<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<FilterParams>,
) -> Result<Json<CascadeView>, ApiError>
where
  S: GeoStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let snapshot = fresh_snapshot(store.as_ref()).await?;
  let view = resolve(&snapshot, &params.selection(), params.link).view();
  if !view.selection.dropped.is_empty() {
    tracing::debug!(dropped = ?view.selection.dropped, "stale selections cleared");
  }
  Ok(Json(view))
}

/// `GET /map`
pub async fn map<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<FilterParams>,
) -> Result<Json<MapLayer>, ApiError>
where
  S: GeoStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let snapshot = fresh_snapshot(store.as_ref()).await?;
  Ok(Json(resolve(&snapshot, &params.selection(), params.link).map_layer()))
}
