//! Pickup density heatmap.
//!
//! Two views of the same pickups:
//! - Weighted points for a client-side heat layer ([`heatmap_points`])
//! - A sparse metric grid with per-cell counts, normalized density and
//!   first/last pickup time ([`generate_pickup_heatmap`])
//!
//! Both can be restricted to a single pickup hour.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{compute_bounds, compute_center, meters_per_degree_lng, METERS_PER_DEGREE};
use crate::normalize::TripRecord;
use crate::{Bounds, GpsPoint};

/// Configuration for heatmap generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    /// Grid cell size in meters (default: 250m)
    pub cell_size_meters: f64,
    /// Only count pickups in this hour (0-23)
    pub hour: Option<u8>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size_meters: 250.0,
            hour: None,
        }
    }
}

/// A weighted heat-layer point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub weight: f64,
}

/// A single cell in the heatmap grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    /// Grid row index
    pub row: i32,
    /// Grid column index
    pub col: i32,
    /// Cell center for rendering
    pub center_lat: f64,
    pub center_lng: f64,
    /// Normalized density (0.0-1.0) for color mapping
    pub density: f32,
    pub pickup_count: u32,
    pub first_pickup: Option<NaiveDateTime>,
    pub last_pickup: Option<NaiveDateTime>,
}

/// Complete heatmap result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapResult {
    /// Non-empty cells only (sparse representation), sorted by (row, col)
    pub cells: Vec<HeatmapCell>,
    /// Bounds of the binned pickups
    pub bounds: Bounds,
    /// Centroid of the binned pickups, for initial map placement
    pub center: GpsPoint,
    pub cell_size_meters: f64,
    /// Latitude the grid rows are measured from
    pub ref_lat: f64,
    pub grid_rows: u32,
    pub grid_cols: u32,
    /// Highest per-cell count, the density denominator
    pub max_count: u32,
    pub total_pickups: u32,
}

/// Query result when the user taps a location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellQueryResult {
    pub cell: HeatmapCell,
    pub suggested_label: String,
}

/// Weight-1 heat-layer points for every pickup, optionally limited to `hour`.
pub fn heatmap_points(records: &[TripRecord], hour: Option<u8>) -> Vec<HeatmapPoint> {
    records
        .iter()
        .filter(|r| hour.map_or(true, |h| r.pickup_hour == h))
        .filter_map(|r| r.pickup)
        .map(|p| HeatmapPoint {
            latitude: p.latitude,
            longitude: p.longitude,
            weight: 1.0,
        })
        .collect()
}

// Internal cell data during construction
#[derive(Debug, Default)]
struct CellBuilder {
    pickup_count: u32,
    first_pickup: Option<NaiveDateTime>,
    last_pickup: Option<NaiveDateTime>,
}

/// Grid coordinate
type CellCoord = (i32, i32);

fn to_grid_coords(lat: f64, lng: f64, ref_lat: f64, cell_size_meters: f64) -> CellCoord {
    let row = ((lat - ref_lat) * METERS_PER_DEGREE / cell_size_meters).floor() as i32;
    let col = (lng * meters_per_degree_lng(ref_lat) / cell_size_meters).floor() as i32;
    (row, col)
}

/// Heatmap grid builder
struct HeatmapGrid {
    cell_size_meters: f64,
    ref_lat: f64,
    cells: HashMap<CellCoord, CellBuilder>,
}

impl HeatmapGrid {
    fn new(cell_size_meters: f64, ref_lat: f64) -> Self {
        Self {
            cell_size_meters,
            ref_lat,
            cells: HashMap::new(),
        }
    }

    /// Get cell center coordinates
    fn cell_center(&self, row: i32, col: i32) -> (f64, f64) {
        let center_lat = self.ref_lat + (row as f64 + 0.5) * self.cell_size_meters / METERS_PER_DEGREE;
        let center_lng = (col as f64 + 0.5) * self.cell_size_meters / meters_per_degree_lng(self.ref_lat);
        (center_lat, center_lng)
    }

    fn add_pickup(&mut self, point: &GpsPoint, time: NaiveDateTime) {
        let coord = to_grid_coords(point.latitude, point.longitude, self.ref_lat, self.cell_size_meters);
        let cell = self.cells.entry(coord).or_default();

        cell.pickup_count += 1;
        cell.first_pickup = Some(cell.first_pickup.map_or(time, |t| t.min(time)));
        cell.last_pickup = Some(cell.last_pickup.map_or(time, |t| t.max(time)));
    }

    fn build(self, pickups: &[GpsPoint]) -> HeatmapResult {
        let max_count = self.cells.values().map(|c| c.pickup_count).max().unwrap_or(0);

        let mut cells: Vec<HeatmapCell> = self
            .cells
            .iter()
            .map(|(&(row, col), builder)| {
                let (center_lat, center_lng) = self.cell_center(row, col);
                HeatmapCell {
                    row,
                    col,
                    center_lat,
                    center_lng,
                    density: builder.pickup_count as f32 / max_count.max(1) as f32,
                    pickup_count: builder.pickup_count,
                    first_pickup: builder.first_pickup,
                    last_pickup: builder.last_pickup,
                }
            })
            .collect();
        cells.sort_by_key(|c| (c.row, c.col));

        let (grid_rows, grid_cols) = match (
            cells.iter().map(|c| c.row).min(),
            cells.iter().map(|c| c.row).max(),
            cells.iter().map(|c| c.col).min(),
            cells.iter().map(|c| c.col).max(),
        ) {
            (Some(min_row), Some(max_row), Some(min_col), Some(max_col)) => {
                ((max_row - min_row + 1) as u32, (max_col - min_col + 1) as u32)
            }
            _ => (0, 0),
        };

        let bounds = if pickups.is_empty() {
            Bounds { min_lat: 0.0, max_lat: 0.0, min_lng: 0.0, max_lng: 0.0 }
        } else {
            compute_bounds(pickups)
        };

        HeatmapResult {
            cells,
            bounds,
            center: compute_center(pickups),
            cell_size_meters: self.cell_size_meters,
            ref_lat: self.ref_lat,
            grid_rows,
            grid_cols,
            max_count,
            total_pickups: pickups.len() as u32,
        }
    }
}

/// Bin pickups into a sparse grid of `config.cell_size_meters` cells.
///
/// Rows are measured from the latitude of the first binned pickup.
pub fn generate_pickup_heatmap(records: &[TripRecord], config: &HeatmapConfig) -> HeatmapResult {
    let selected: Vec<(GpsPoint, NaiveDateTime)> = records
        .iter()
        .filter(|r| config.hour.map_or(true, |h| r.pickup_hour == h))
        .filter_map(|r| r.pickup.map(|p| (p, r.pickup_time)))
        .collect();

    let ref_lat = selected.first().map_or(0.0, |(p, _)| p.latitude);
    let mut grid = HeatmapGrid::new(config.cell_size_meters, ref_lat);
    for (point, time) in &selected {
        grid.add_pickup(point, *time);
    }

    let pickups: Vec<GpsPoint> = selected.into_iter().map(|(p, _)| p).collect();
    grid.build(&pickups)
}

/// Query the heatmap at a specific location
pub fn query_heatmap_cell(heatmap: &HeatmapResult, lat: f64, lng: f64) -> Option<CellQueryResult> {
    if heatmap.cells.is_empty() {
        return None;
    }

    let target = to_grid_coords(lat, lng, heatmap.ref_lat, heatmap.cell_size_meters);
    let idx = heatmap
        .cells
        .binary_search_by_key(&target, |c| (c.row, c.col))
        .ok()?;
    let cell = &heatmap.cells[idx];

    let suggested_label = if cell.pickup_count == 1 {
        "Single pickup".to_string()
    } else if cell.pickup_count == heatmap.max_count {
        format!("Hotspot ({} pickups)", cell.pickup_count)
    } else {
        format!("{} pickups", cell.pickup_count)
    };

    Some(CellQueryResult {
        cell: cell.clone(),
        suggested_label,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trip;

    fn at(time: &str, lat: f64, lng: f64) -> TripRecord {
        trip(time, GpsPoint::new(lat, lng), GpsPoint::new(40.70, -73.95))
    }

    #[test]
    fn test_empty_heatmap() {
        let result = generate_pickup_heatmap(&[], &HeatmapConfig::default());
        assert!(result.cells.is_empty());
        assert_eq!(result.total_pickups, 0);
        assert_eq!(result.grid_rows, 0);
        assert!(query_heatmap_cell(&result, 40.75, -73.98).is_none());
        assert!(heatmap_points(&[], None).is_empty());
    }

    #[test]
    fn test_heatmap_points_hour_filter() {
        let records = vec![
            at("2024-01-03 08:10:00", 40.75, -73.98),
            at("2024-01-03 08:50:00", 40.76, -73.97),
            at("2024-01-03 17:00:00", 40.68, -73.94),
        ];
        assert_eq!(heatmap_points(&records, None).len(), 3);

        let morning = heatmap_points(&records, Some(8));
        assert_eq!(morning.len(), 2);
        assert!(morning.iter().all(|p| p.weight == 1.0));
        assert_eq!(heatmap_points(&records, Some(3)).len(), 0);
    }

    #[test]
    fn test_repeated_pickups_share_a_cell() {
        let records = vec![
            at("2024-01-03 08:00:00", 40.7500, -73.9800),
            at("2024-01-05 09:00:00", 40.7500, -73.9800),
            at("2024-01-04 10:00:00", 40.7500, -73.9800),
            at("2024-01-03 11:00:00", 40.6800, -73.9400),
        ];

        let result = generate_pickup_heatmap(&records, &HeatmapConfig::default());
        assert_eq!(result.total_pickups, 4);
        assert_eq!(result.cells.len(), 2);
        assert_eq!(result.max_count, 3);

        let busy = result.cells.iter().find(|c| c.pickup_count == 3).unwrap();
        assert_eq!(busy.density, 1.0);
        assert_eq!(busy.first_pickup, records[0].pickup_time.into());
        assert_eq!(busy.last_pickup, records[1].pickup_time.into());

        let quiet = result.cells.iter().find(|c| c.pickup_count == 1).unwrap();
        assert!((quiet.density - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_query_finds_cell() {
        let records = vec![
            at("2024-01-03 08:00:00", 40.7500, -73.9800),
            at("2024-01-03 08:30:00", 40.7501, -73.9801),
            at("2024-01-03 11:00:00", 40.6800, -73.9400),
        ];
        let result = generate_pickup_heatmap(&records, &HeatmapConfig::default());

        let hit = query_heatmap_cell(&result, 40.7500, -73.9800).unwrap();
        assert_eq!(hit.cell.pickup_count, 2);
        assert_eq!(hit.suggested_label, "Hotspot (2 pickups)");

        let lone = query_heatmap_cell(&result, 40.6800, -73.9400).unwrap();
        assert_eq!(lone.suggested_label, "Single pickup");

        assert!(query_heatmap_cell(&result, 40.9, -73.75).is_none());
    }

    #[test]
    fn test_cell_center_lies_in_cell() {
        let records = vec![at("2024-01-03 08:00:00", 40.7412, -73.9923)];
        let config = HeatmapConfig { cell_size_meters: 500.0, hour: None };
        let result = generate_pickup_heatmap(&records, &config);

        let cell = &result.cells[0];
        let hit = query_heatmap_cell(&result, cell.center_lat, cell.center_lng).unwrap();
        assert_eq!((hit.cell.row, hit.cell.col), (cell.row, cell.col));
        assert_eq!(result.bounds.min_lat, 40.7412);
        assert_eq!(result.center, GpsPoint::new(40.7412, -73.9923));
    }

    #[test]
    fn test_hour_restricted_grid() {
        let records = vec![
            at("2024-01-03 08:00:00", 40.7500, -73.9800),
            at("2024-01-03 17:00:00", 40.6800, -73.9400),
        ];
        let config = HeatmapConfig { hour: Some(17), ..Default::default() };
        let result = generate_pickup_heatmap(&records, &config);
        assert_eq!(result.total_pickups, 1);
        assert_eq!(result.ref_lat, 40.68);
    }
}
