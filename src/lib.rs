//! # Trip Flow
//!
//! Spatial-temporal aggregation engine for ride-hailing trip records.
//!
//! This library provides:
//! - Normalization of heterogeneous trip exports into one canonical table
//! - Nearest-center zone classification
//! - Date, time-of-day, weekday/weekend and weather filtering
//! - Summary statistics, hourly series, zone traffic and zone-to-zone flows
//! - DBSCAN route clustering over pickup/dropoff coordinates
//! - Pickup density heatmaps
//!
//! ## Features
//!
//! - **`parallel`** - Parallel zone assignment and DBSCAN neighbor queries with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use trip_flow::{EngineConfig, RawTable, TripEngine, TripFilter, ZoneRegistry};
//!
//! let csv = "pickup_datetime,dropoff_datetime,pickup_lat,pickup_lon,dropoff_lat,dropoff_lon\n\
//!            2024-01-03 08:05:00,2024-01-03 08:30:00,40.7831,-73.9712,40.6782,-73.9442\n\
//!            2024-01-03 08:40:00,2024-01-03 09:05:00,40.7831,-73.9712,40.6782,-73.9442\n";
//!
//! let raw = RawTable::from_reader(csv.as_bytes()).unwrap();
//! let engine = TripEngine::from_raw(&raw, ZoneRegistry::default(), EngineConfig::default()).unwrap();
//!
//! let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
//! let result = engine.query(&TripFilter::new(day, day));
//!
//! assert_eq!(result.summary.trip_count, 2);
//! assert_eq!(result.summary.avg_duration_minutes, Some(25.0));
//! assert_eq!(result.zone_traffic[0].count, 2); // Manhattan
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{EngineError, Result};

pub mod geo_utils;

pub mod normalize;
pub use normalize::{
    normalize, parse_timestamp, resolve_columns, CleaningBounds, ColumnMapping, NormalizeConfig,
    RawTable, TripRecord, TripTable, Weather, WeatherWeights,
};

pub mod zones;
pub use zones::{Zone, ZoneId, ZoneRegistry};

pub mod filter;
pub use filter::{filter_trips, DayType, TripFilter, WeatherFilter};

pub mod aggregate;
pub use aggregate::{
    hourly_distribution, summary_stats, weekday_weekend_comparison, zone_flow, zone_flow_with,
    zone_traffic, FlowConfig, FlowEdge, HourlyCount, SummaryStats, ZoneCount, ZoneFlowRow,
};

pub mod clustering;
pub use clustering::{cluster_routes, ClusterConfig, RouteCluster};

// Pickup density heatmap
pub mod heatmap;
pub use heatmap::{
    generate_pickup_heatmap, heatmap_points, query_heatmap_cell, CellQueryResult, HeatmapCell,
    HeatmapConfig, HeatmapPoint, HeatmapResult,
};

pub mod engine;
pub use engine::{EngineConfig, QueryResult, TripEngine};

#[cfg(test)]
mod testing;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trip_flow::GpsPoint;
/// let point = GpsPoint::new(40.7580, -73.9855); // Times Square
/// assert_eq!(point.to_lon_lat(), [-73.9855, 40.7580]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// `[longitude, latitude]`, the order map layers and GeoJSON expect.
    pub fn to_lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validity() {
        assert!(GpsPoint::new(40.7831, -73.9712).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, -181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds { min_lat: 40.5, max_lat: 41.0, min_lng: -74.3, max_lng: -73.7 };
        let center = bounds.center();
        assert!((center.latitude - 40.75).abs() < 1e-9);
        assert!((center.longitude + 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_gps_point_json() {
        let json = serde_json::to_string(&GpsPoint::new(40.5, -74.0)).unwrap();
        assert_eq!(json, r#"{"latitude":40.5,"longitude":-74.0}"#);
        let back: GpsPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GpsPoint::new(40.5, -74.0));
    }
}
