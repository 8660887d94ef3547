//! Zone registry and nearest-center classification.
//!
//! Zones are a flat, immutable list of named centers. Classification is a pure
//! function over that list: the zone whose center is closest in (lat, lon)
//! degree space wins, and exact ties go to the lowest id.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::geo_utils::{euclidean_distance, square_ring};
use crate::GpsPoint;

pub type ZoneId = u32;

/// Half side length, in degrees, of the placeholder zone rectangles.
pub const ZONE_BOUNDARY_HALF_EXTENT: f64 = 0.05;

/// A named geographic zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub center: GpsPoint,
}

impl Zone {
    pub fn new(id: ZoneId, name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            center: GpsPoint::new(latitude, longitude),
        }
    }
}

/// Immutable set of zones, ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::nyc_boroughs()
    }
}

impl ZoneRegistry {
    /// Build a registry. Zones are sorted by id.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidZones`] if the list is empty, an id repeats or a
    /// center is not a valid coordinate.
    pub fn new(mut zones: Vec<Zone>) -> Result<Self> {
        if zones.is_empty() {
            return Err(EngineError::InvalidZones {
                message: "no zones defined".to_string(),
            });
        }
        zones.sort_by_key(|z| z.id);
        if let Some(w) = zones.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(EngineError::InvalidZones {
                message: format!("duplicate zone id {}", w[0].id),
            });
        }
        if let Some(z) = zones.iter().find(|z| !z.center.is_valid()) {
            return Err(EngineError::InvalidZones {
                message: format!("zone {} has an invalid center", z.id),
            });
        }
        Ok(Self { zones })
    }

    /// The five New York City boroughs.
    pub fn nyc_boroughs() -> Self {
        Self {
            zones: vec![
                Zone::new(1, "Manhattan", 40.7831, -73.9712),
                Zone::new(2, "Brooklyn", 40.6782, -73.9442),
                Zone::new(3, "Queens", 40.7282, -73.7949),
                Zone::new(4, "Bronx", 40.8448, -73.8648),
                Zone::new(5, "Staten Island", 40.5795, -74.1502),
            ],
        }
    }

    /// Zones in id order.
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone with `id`, if registered.
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones
            .binary_search_by_key(&id, |z| z.id)
            .ok()
            .map(|idx| &self.zones[idx])
    }

    /// Id of the zone nearest to `point`.
    ///
    /// # Example
    /// ```
    /// use trip_flow::{GpsPoint, ZoneRegistry};
    ///
    /// let zones = ZoneRegistry::nyc_boroughs();
    /// // Times Square
    /// assert_eq!(zones.assign_zone(&GpsPoint::new(40.7580, -73.9855)), 1);
    /// ```
    pub fn assign_zone(&self, point: &GpsPoint) -> ZoneId {
        let mut best = &self.zones[0];
        let mut best_dist = euclidean_distance(point, &best.center);

        for zone in &self.zones[1..] {
            let dist = euclidean_distance(point, &zone.center);
            if dist < best_dist {
                best = zone;
                best_dist = dist;
            }
        }

        best.id
    }

    /// Classify many points at once, in input order.
    pub fn assign_zones(&self, points: &[GpsPoint]) -> Vec<ZoneId> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            points.par_iter().map(|p| self.assign_zone(p)).collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            points.iter().map(|p| self.assign_zone(p)).collect()
        }
    }

    /// Placeholder zone boundaries as a GeoJSON FeatureCollection.
    ///
    /// Each zone is a rectangle of `half_extent` degrees around its center,
    /// with `zone_id` and `name` properties. Not an administrative boundary.
    pub fn boundary_geojson(&self, half_extent: f64) -> FeatureCollection {
        let features = self
            .zones
            .iter()
            .map(|zone| {
                let mut properties = JsonObject::new();
                properties.insert("zone_id".to_string(), zone.id.into());
                properties.insert("name".to_string(), zone.name.clone().into());

                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Polygon(vec![square_ring(
                        &zone.center,
                        half_extent,
                    )]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect::<Vec<_>>();

        debug!("Built {} zone boundary features", features.len());

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}
