//! Cascading filter resolution for dependent dropdowns and the map.
//!
//! Two branches hang off a region:
//!
//! - administrative: region → department → arrondissement, linked by
//!   foreign keys;
//! - health: region → health district → health area → facility, where the
//!   first two links go through a [`ParentLink`](crate::entity::ParentLink)
//!   and are matched according to a [`LinkMode`].
//!
//! A pick that does not belong to the currently selected parent (or names
//! nothing at all) is stale. Stale picks are dropped together with every pick
//! below them in their branch, so no candidate list ever mixes a child with a
//! parent it does not belong to.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
  entity::{
    Arrondissement, Department, Facility, HealthArea, HealthDistrict, Level, LinkMode, Region,
  },
  geometry::{Bounds, LatLng, outer_ring_from_str},
};

// ─── Input ───────────────────────────────────────────────────────────────────

/// Every row of the hierarchy, fetched fresh for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchySnapshot {
  pub regions:         Vec<Region>,
  pub departments:     Vec<Department>,
  pub arrondissements: Vec<Arrondissement>,
  pub districts:       Vec<HealthDistrict>,
  pub health_areas:    Vec<HealthArea>,
  pub facilities:      Vec<Facility>,
}

/// A selection at one level, either by id or by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pick {
  Id(i64),
  Name(String),
}

/// The dashboard's current dropdown state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
  pub region:         Option<Pick>,
  pub department:     Option<Pick>,
  pub arrondissement: Option<Pick>,
  pub district:       Option<Pick>,
  pub health_area:    Option<Pick>,
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
  pub id:   i64,
  pub name: String,
}

/// Candidates at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelOptions {
  /// Distinct names, sorted.
  pub names:   Vec<String>,
  /// Every candidate row, sorted by name then id.
  pub choices: Vec<Choice>,
}

/// The picks that survived resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveSelection {
  pub region:         Option<Choice>,
  pub department:     Option<Choice>,
  pub arrondissement: Option<Choice>,
  pub district:       Option<Choice>,
  pub health_area:    Option<Choice>,
  /// Levels whose pick was stale and has been cleared.
  pub dropped:        Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeView {
  pub selection:       EffectiveSelection,
  pub link_mode:       LinkMode,
  pub regions:         LevelOptions,
  pub departments:     LevelOptions,
  pub arrondissements: LevelOptions,
  pub districts:       LevelOptions,
  pub health_areas:    LevelOptions,
  pub facilities:      LevelOptions,
}

/// A polygon ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapShape {
  pub id:   i64,
  pub name: String,
  pub ring: Vec<LatLng>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityMarker {
  pub id:       i64,
  pub name:     String,
  pub kind:     Option<String>,
  pub position: LatLng,
}

/// An entity in scope that has nothing to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unmapped {
  pub level: Level,
  pub id:    i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
  pub selection:        EffectiveSelection,
  pub districts:        Vec<MapShape>,
  pub health_areas:     Vec<MapShape>,
  pub facilities:       Vec<FacilityMarker>,
  pub without_geometry: Vec<Unmapped>,
  /// Extent of everything drawn; `None` when nothing is.
  pub bounds:           Option<Bounds>,
}

// ─── Resolution ──────────────────────────────────────────────────────────────

enum Picked<'a, T> {
  None,
  Found(&'a T),
  Stale,
}

impl<'a, T> Picked<'a, T> {
  fn found(&self) -> Option<&'a T> {
    match self {
      Self::Found(t) => Some(t),
      _ => None,
    }
  }

  fn is_stale(&self) -> bool { matches!(self, Self::Stale) }
}

fn pick_among<'a, T>(
  pick: Option<&Pick>,
  candidates: &[&'a T],
  key: impl Fn(&T) -> (i64, &str),
) -> Picked<'a, T> {
  let Some(pick) = pick else {
    return Picked::None;
  };
  let mut rows = candidates.iter().copied();
  let hit = match pick {
    Pick::Id(id) => rows.find(|c| key(*c).0 == *id),
    // Duplicate names resolve to the lowest id.
    Pick::Name(name) => rows
      .filter(|c| key(*c).1 == name.as_str())
      .min_by_key(|c| key(*c).0),
  };
  hit.map_or(Picked::Stale, Picked::Found)
}

/// The candidate rows at every level for one selection.
pub struct Resolved<'a> {
  pub link_mode:       LinkMode,
  pub region:          Option<&'a Region>,
  pub department:      Option<&'a Department>,
  pub arrondissement:  Option<&'a Arrondissement>,
  pub district:        Option<&'a HealthDistrict>,
  pub health_area:     Option<&'a HealthArea>,
  pub dropped:         Vec<Level>,
  pub regions:         Vec<&'a Region>,
  pub departments:     Vec<&'a Department>,
  pub arrondissements: Vec<&'a Arrondissement>,
  pub districts:       Vec<&'a HealthDistrict>,
  pub health_areas:    Vec<&'a HealthArea>,
  pub facilities:      Vec<&'a Facility>,
}

/// Resolve `selection` against `snapshot`.
pub fn resolve<'a>(
  snapshot: &'a HierarchySnapshot,
  selection: &Selection,
  link_mode: LinkMode,
) -> Resolved<'a> {
  let mut dropped = Vec::new();
  let mut drop_if = |stale: bool, pick: &Option<Pick>, level: Level| -> bool {
    if stale && pick.is_some() {
      dropped.push(level);
    }
    stale
  };

  // Region.
  let regions: Vec<&Region> = snapshot.regions.iter().collect();
  let region_pick = pick_among(selection.region.as_ref(), &regions, |r| (r.id, r.name.as_str()));
  let region = region_pick.found();
  let region_stale = drop_if(region_pick.is_stale(), &selection.region, Level::Region);

  // Administrative branch.
  let departments: Vec<&Department> = snapshot
    .departments
    .iter()
    .filter(|d| region.is_none_or(|r| d.region_id == Some(r.id)))
    .collect();
  let department_pick = if region_stale {
    drop_if(true, &selection.department, Level::Department);
    Picked::None
  } else {
    pick_among(selection.department.as_ref(), &departments, |d| (d.id, d.name.as_str()))
  };
  let department = department_pick.found();
  let department_stale =
    drop_if(department_pick.is_stale(), &selection.department, Level::Department);

  let department_ids: HashSet<i64> = departments.iter().map(|d| d.id).collect();
  let arrondissements: Vec<&Arrondissement> = snapshot
    .arrondissements
    .iter()
    .filter(|a| match (department, region) {
      (Some(d), _) => a.department_id == Some(d.id),
      (None, Some(_)) => a.department_id.is_some_and(|id| department_ids.contains(&id)),
      (None, None) => true,
    })
    .collect();
  let arrondissement_pick = if region_stale || department_stale {
    drop_if(true, &selection.arrondissement, Level::Arrondissement);
    Picked::None
  } else {
    pick_among(selection.arrondissement.as_ref(), &arrondissements, |a| (a.id, a.name.as_str()))
  };
  let arrondissement = arrondissement_pick.found();
  drop_if(
    arrondissement_pick.is_stale(),
    &selection.arrondissement,
    Level::Arrondissement,
  );

  // Health branch.
  let districts: Vec<&HealthDistrict> = snapshot
    .districts
    .iter()
    .filter(|d| region.is_none_or(|r| d.region.points_to(link_mode, r.id, &r.name)))
    .collect();
  let district_pick = if region_stale {
    drop_if(true, &selection.district, Level::HealthDistrict);
    Picked::None
  } else {
    pick_among(selection.district.as_ref(), &districts, |d| (d.id, d.name.as_str()))
  };
  let district = district_pick.found();
  let district_stale =
    drop_if(district_pick.is_stale(), &selection.district, Level::HealthDistrict);

  let health_areas: Vec<&HealthArea> = match (district, region) {
    (Some(d), _) => snapshot
      .health_areas
      .iter()
      .filter(|a| a.district.points_to(link_mode, d.id, &d.name))
      .collect(),
    (None, Some(_)) => snapshot
      .health_areas
      .iter()
      .filter(|a| districts.iter().any(|d| a.district.points_to(link_mode, d.id, &d.name)))
      .collect(),
    (None, None) => snapshot.health_areas.iter().collect(),
  };
  let area_pick = if region_stale || district_stale {
    drop_if(true, &selection.health_area, Level::HealthArea);
    Picked::None
  } else {
    pick_among(selection.health_area.as_ref(), &health_areas, |a| (a.id, a.name.as_str()))
  };
  let health_area = area_pick.found();
  drop_if(area_pick.is_stale(), &selection.health_area, Level::HealthArea);

  let district_ids: HashSet<i64> = districts.iter().map(|d| d.id).collect();
  let facilities: Vec<&Facility> = snapshot
    .facilities
    .iter()
    .filter(|f| match (health_area, district, region) {
      (Some(a), _, _) => f.health_area_id == Some(a.id),
      (None, Some(d), _) => f.district_id == Some(d.id),
      (None, None, Some(_)) => f.district_id.is_some_and(|id| district_ids.contains(&id)),
      (None, None, None) => true,
    })
    .collect();

  Resolved {
    link_mode,
    region,
    department,
    arrondissement,
    district,
    health_area,
    dropped,
    regions,
    departments,
    arrondissements,
    districts,
    health_areas,
    facilities,
  }
}

fn options<'a, T: 'a>(
  rows: impl IntoIterator<Item = &'a &'a T>,
  key: impl Fn(&T) -> (i64, &str),
) -> LevelOptions {
  let mut choices: Vec<Choice> = rows
    .into_iter()
    .map(|r| {
      let (id, name) = key(*r);
      Choice { id, name: name.to_owned() }
    })
    .collect();
  choices.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

  let mut names: Vec<String> = choices.iter().map(|c| c.name.clone()).collect();
  names.dedup();
  LevelOptions { names, choices }
}

fn choice(id: i64, name: &str) -> Choice { Choice { id, name: name.to_owned() } }

impl Resolved<'_> {
  pub fn selection(&self) -> EffectiveSelection {
    EffectiveSelection {
      region:         self.region.map(|r| choice(r.id, r.name.as_str())),
      department:     self.department.map(|d| choice(d.id, d.name.as_str())),
      arrondissement: self.arrondissement.map(|a| choice(a.id, a.name.as_str())),
      district:       self.district.map(|d| choice(d.id, d.name.as_str())),
      health_area:    self.health_area.map(|a| choice(a.id, a.name.as_str())),
      dropped:        self.dropped.clone(),
    }
  }

  /// Dropdown contents for every level.
  pub fn view(&self) -> CascadeView {
    CascadeView {
      selection:       self.selection(),
      link_mode:       self.link_mode,
      regions:         options(&self.regions, |r: &Region| (r.id, r.name.as_str())),
      departments:     options(&self.departments, |d: &Department| (d.id, d.name.as_str())),
      arrondissements: options(&self.arrondissements, |a: &Arrondissement| (a.id, a.name.as_str())),
      districts:       options(&self.districts, |d: &HealthDistrict| (d.id, d.name.as_str())),
      health_areas:    options(&self.health_areas, |a: &HealthArea| (a.id, a.name.as_str())),
      facilities:      options(&self.facilities, |f: &Facility| (f.id, f.name.as_str())),
    }
  }

  /// Polygons and markers in scope, with their combined extent.
  ///
  /// Districts and health areas whose geometry is absent or unreadable are
  /// listed in `without_geometry` instead of being drawn.
  pub fn map_layer(&self) -> MapLayer {
    let mut without_geometry = Vec::new();
    let mut bounds: Option<Bounds> = None;
    let mut grow = |points: &[LatLng]| {
      if let Some(b) = Bounds::from_points(points) {
        bounds = Some(bounds.map_or(b, |acc| acc.union(b)));
      }
    };

    let mut shape = |level: Level, id: i64, name: &str, geometry: Option<&str>| {
      let ring = outer_ring_from_str(geometry);
      if ring.is_empty() {
        without_geometry.push(Unmapped { level, id });
        return None;
      }
      grow(&ring);
      Some(MapShape { id, name: name.to_owned(), ring })
    };

    let districts: Vec<MapShape> = self
      .districts
      .iter()
      .filter_map(|d| shape(Level::HealthDistrict, d.id, &d.name, d.geometry.as_deref()))
      .collect();
    let health_areas: Vec<MapShape> = self
      .health_areas
      .iter()
      .filter_map(|a| shape(Level::HealthArea, a.id, &a.name, a.geometry.as_deref()))
      .collect();

    let mut facilities = Vec::new();
    for f in &self.facilities {
      match (f.latitude, f.longitude) {
        (Some(lat), Some(lon)) => {
          let position = [lat, lon];
          grow(&[position]);
          facilities.push(FacilityMarker {
            id: f.id,
            name: f.name.clone(),
            kind: f.kind.clone(),
            position,
          });
        }
        _ => without_geometry.push(Unmapped { level: Level::Facility, id: f.id }),
      }
    }

    MapLayer {
      selection: self.selection(),
      districts,
      health_areas,
      facilities,
      without_geometry,
      bounds,
    }
  }
}
