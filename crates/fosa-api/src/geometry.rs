//! `GET /geometry/{level}/{id}`: the normalized outline of one row.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use fosa_core::{
  entity::Level,
  geometry::{Bounds, LatLng, outer_ring_from_str},
  store::GeoStore,
};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct GeometryResponse {
  pub level:  Level,
  pub id:     i64,
  pub name:   String,
  /// Outer ring in `[lat, lon]` order; empty when nothing can be drawn.
  pub ring:   Vec<LatLng>,
  pub bounds: Option<Bounds>,
}

/// `GET /geometry/{level}/{id}`
///
/// `level` is one of `region`, `department`, `arrondissement`,
/// `health_district` (or `district`) and `health_area`.
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path((level, id)): Path<(String, i64)>,
) -> Result<Json<GeometryResponse>, ApiError>
where
  S: GeoStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let level: Level = level
    .parse()
    .map_err(|_| fosa_core::Error::UnknownLevel(level.clone()))?;
  if level == Level::Facility {
    return Err(ApiError::NoOutline(level));
  }

  let shape = store
    .shape(level, id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::Missing { level, id })?;

  let ring = outer_ring_from_str(shape.geometry.as_deref());
  let bounds = Bounds::from_points(&ring);
  Ok(Json(GeometryResponse { level, id, name: shape.name, ring, bounds }))
}
