//! Geometry normalization for map rendering.
//!
//! Stored geometry is GeoJSON text, sometimes JSON-encoded a second time by
//! older import scripts. [`outer_ring`] reduces any of those shapes to the
//! outer boundary of the first polygon, flipped from GeoJSON's
//! `[longitude, latitude]` to the `[latitude, longitude]` order used by the
//! dashboard map. Anything it cannot read becomes an empty ring.

use geojson::GeoJson;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A `[latitude, longitude]` pair.
pub type LatLng = [f64; 2];

/// How many layers of string encoding are peeled before giving up.
const MAX_STRING_DECODES: u8 = 2;

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Normalize a geometry column value that may be absent or hold GeoJSON text.
pub fn outer_ring_from_str(raw: Option<&str>) -> Vec<LatLng> {
  let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
    return Vec::new();
  };
  match serde_json::from_str::<Value>(text) {
    Ok(value) => ring_from_value(value, 0),
    Err(e) => {
      tracing::debug!(error = %e, "geometry is not JSON; nothing to draw");
      Vec::new()
    }
  }
}

/// Normalize an already-parsed JSON value: `null`, a JSON string holding
/// GeoJSON, or a GeoJSON object.
pub fn outer_ring(value: &Value) -> Vec<LatLng> { ring_from_value(value.clone(), 0) }

fn ring_from_value(value: Value, depth: u8) -> Vec<LatLng> {
  match value {
    Value::Null => Vec::new(),
    Value::String(inner) if depth < MAX_STRING_DECODES => {
      match serde_json::from_str::<Value>(&inner) {
        Ok(decoded) => ring_from_value(decoded, depth + 1),
        Err(e) => {
          tracing::debug!(error = %e, "string-encoded geometry is not JSON");
          Vec::new()
        }
      }
    }
    Value::Object(_) => match serde_json::from_value::<GeoJson>(value) {
      Ok(geojson) => ring_from_geojson(geojson),
      Err(e) => {
        tracing::warn!(error = %e, "malformed GeoJSON geometry");
        Vec::new()
      }
    },
    other => {
      tracing::debug!(kind = json_kind(&other), "unexpected geometry value");
      Vec::new()
    }
  }
}

fn ring_from_geojson(geojson: GeoJson) -> Vec<LatLng> {
  let geometry = match geojson {
    GeoJson::Geometry(g) => Some(g),
    GeoJson::Feature(f) => f.geometry,
    GeoJson::FeatureCollection(fc) => fc.features.into_iter().find_map(|f| f.geometry),
  };
  let Some(geometry) = geometry else {
    return Vec::new();
  };

  let ring = match geometry.value {
    geojson::Value::Polygon(rings) => rings.into_iter().next(),
    // Only the outer ring of the first part is drawn.
    geojson::Value::MultiPolygon(polygons) => {
      polygons.into_iter().next().and_then(|rings| rings.into_iter().next())
    }
    _ => {
      tracing::debug!("geometry is not a polygon; nothing to draw");
      None
    }
  };

  ring
    .unwrap_or_default()
    .iter()
    .filter_map(|position| match position.as_slice() {
      [lon, lat, ..] => Some([*lat, *lon]),
      _ => None,
    })
    .collect()
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

// ─── Bounds ──────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box in degrees, used to fit the map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
  pub south: f64,
  pub west:  f64,
  pub north: f64,
  pub east:  f64,
}

impl Bounds {
  /// Bounds of a single point.
  pub fn point([lat, lon]: LatLng) -> Self {
    Self { south: lat, west: lon, north: lat, east: lon }
  }

  /// Bounds of every point in `points`; `None` when there are none.
  pub fn from_points<'a>(points: impl IntoIterator<Item = &'a LatLng>) -> Option<Self> {
    let mut points = points.into_iter();
    let mut bounds = Self::point(*points.next()?);
    for p in points {
      bounds.extend(*p);
    }
    Some(bounds)
  }

  pub fn extend(&mut self, [lat, lon]: LatLng) {
    self.south = self.south.min(lat);
    self.north = self.north.max(lat);
    self.west = self.west.min(lon);
    self.east = self.east.max(lon);
  }

  pub fn union(self, other: Self) -> Self {
    Self {
      south: self.south.min(other.south),
      west:  self.west.min(other.west),
      north: self.north.max(other.north),
      east:  self.east.max(other.east),
    }
  }

  pub fn center(&self) -> LatLng {
    [(self.south + self.north) / 2.0, (self.west + self.east) / 2.0]
  }
}
