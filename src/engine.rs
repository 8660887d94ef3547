//! # Engine Facade
//!
//! Owns the canonical table and zone registry and answers dashboard queries.
//!
//! ```rust
//! use trip_flow::{EngineConfig, RawTable, TripEngine, ZoneRegistry};
//!
//! let csv = "pickup_datetime,pickup_latitude,pickup_longitude\n\
//!            2024-01-03 08:15:00,40.7580,-73.9855\n";
//! let raw = RawTable::from_reader(csv.as_bytes()).unwrap();
//! let engine = TripEngine::from_raw(&raw, ZoneRegistry::default(), EngineConfig::default()).unwrap();
//!
//! let (start, end) = engine.date_range().unwrap();
//! assert_eq!(start, end);
//! ```

use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use geojson::FeatureCollection;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::aggregate::{
    hourly_distribution, summary_stats, weekday_weekend_comparison, zone_flow_with, zone_traffic,
    DayTypeHourlyCount, FlowConfig, HourlyCount, SummaryStats, ZoneCount, ZoneFlowRow,
};
use crate::clustering::{cluster_routes, ClusterConfig, RouteCluster};
use crate::error::Result;
use crate::filter::{filter_trips, TripFilter};
use crate::heatmap::{generate_pickup_heatmap, heatmap_points, HeatmapConfig, HeatmapPoint, HeatmapResult};
use crate::normalize::{normalize, NormalizeConfig, RawTable, TripTable};
use crate::zones::{ZoneRegistry, ZONE_BOUNDARY_HALF_EXTENT};

/// All engine tuning in one place. Missing JSON fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub normalize: NormalizeConfig,
    pub cluster: ClusterConfig,
    pub heatmap: HeatmapConfig,
    pub flow: FlowConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON config.
    ///
    /// # Example
    /// ```
    /// use trip_flow::EngineConfig;
    ///
    /// let config = EngineConfig::from_json(r#"{"cluster": {"eps": 0.3}}"#).unwrap();
    /// assert_eq!(config.cluster.eps, 0.3);
    /// assert_eq!(config.cluster.min_samples, 5);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Everything a dashboard refresh needs for one filter.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub filter: TripFilter,
    pub summary: SummaryStats,
    pub hourly: Vec<HourlyCount>,
    pub weekday_weekend: Vec<DayTypeHourlyCount>,
    pub zone_traffic: Vec<ZoneCount>,
    pub zone_flow: Vec<ZoneFlowRow>,
    /// `None` when the subset is too small or all noise
    pub route_clusters: Option<Vec<RouteCluster>>,
    pub heatmap: Vec<HeatmapPoint>,
}

/// Aggregation engine over a static batch of trips.
#[derive(Debug, Clone)]
pub struct TripEngine {
    table: TripTable,
    zones: ZoneRegistry,
    config: EngineConfig,
}

impl TripEngine {
    /// Wrap an already normalized table.
    pub fn new(table: TripTable, zones: ZoneRegistry, config: EngineConfig) -> Self {
        Self { table, zones, config }
    }

    /// Normalize `raw` with `config.normalize` and build an engine over it.
    pub fn from_raw(raw: &RawTable, zones: ZoneRegistry, config: EngineConfig) -> Result<Self> {
        let table = normalize(raw, &config.normalize)?;
        Ok(Self::new(table, zones, config))
    }

    /// Read, normalize and load a CSV trip export.
    pub fn load_csv<P: AsRef<Path>>(path: P, zones: ZoneRegistry, config: EngineConfig) -> Result<Self> {
        let start = Instant::now();
        let raw = RawTable::from_csv_path(path.as_ref())?;
        let engine = Self::from_raw(&raw, zones, config)?;
        info!(
            "Loaded {} trips from {} in {:?}",
            engine.table.len(),
            path.as_ref().display(),
            start.elapsed()
        );
        Ok(engine)
    }

    /// The canonical table.
    pub fn table(&self) -> &TripTable {
        &self.table
    }

    /// The zone registry.
    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// First and last pickup date in the dataset.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.table.date_range()
    }

    /// Working subset for `filter`.
    pub fn filter(&self, filter: &TripFilter) -> TripTable {
        filter_trips(&self.table, filter)
    }

    /// Placeholder zone rectangles for the map layer.
    pub fn zone_geojson(&self) -> FeatureCollection {
        self.zones.boundary_geojson(ZONE_BOUNDARY_HALF_EXTENT)
    }

    /// Pickup density grid for `filter`, restricted to `config.heatmap.hour`.
    pub fn pickup_heatmap(&self, filter: &TripFilter) -> HeatmapResult {
        let subset = self.filter(filter);
        generate_pickup_heatmap(subset.records(), &self.config.heatmap)
    }

    /// Run every aggregation for `filter`.
    pub fn query(&self, filter: &TripFilter) -> QueryResult {
        let start = Instant::now();
        let subset = self.filter(filter);
        let records = subset.records();

        let result = QueryResult {
            filter: filter.clone(),
            summary: summary_stats(records),
            hourly: hourly_distribution(records),
            weekday_weekend: weekday_weekend_comparison(records),
            zone_traffic: zone_traffic(records, &self.zones),
            zone_flow: zone_flow_with(records, &self.zones, &self.config.flow),
            route_clusters: cluster_routes(records, &self.config.cluster),
            heatmap: heatmap_points(records, self.config.heatmap.hour),
        };

        debug!(
            "Query matched {} of {} trips in {:?}",
            records.len(),
            self.table.len(),
            start.elapsed()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_commutes() -> RawTable {
        let headers = ["pickup_datetime", "dropoff_datetime", "pickup_lat", "pickup_lon", "dropoff_lat", "dropoff_lon", "trip_miles"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(vec![
                format!("2024-01-03 08:{:02}:00", i),
                format!("2024-01-03 08:{:02}:00", i + 20),
                "40.7831".to_string(),
                "-73.9712".to_string(),
                "40.6782".to_string(),
                "-73.9442".to_string(),
                "3.5".to_string(),
            ]);
        }
        rows.push(vec![
            "2024-01-06 22:00:00".to_string(),
            "2024-01-06 22:30:00".to_string(),
            "40.7282".to_string(),
            "-73.7949".to_string(),
            "40.8448".to_string(),
            "-73.8648".to_string(),
            "7".to_string(),
        ]);
        RawTable::new(headers, rows)
    }

    fn engine() -> TripEngine {
        TripEngine::from_raw(&raw_commutes(), ZoneRegistry::default(), EngineConfig::default()).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_config_from_json() {
        let config = EngineConfig::from_json(r#"{"flow": {"quantile": 0.5}, "heatmap": {"hour": 8}}"#).unwrap();
        assert_eq!(config.flow.quantile, 0.5);
        assert_eq!(config.heatmap.hour, Some(8));
        assert_eq!(config.normalize, NormalizeConfig::default());

        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
        assert!(EngineConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_date_range() {
        let engine = engine();
        assert_eq!(engine.table().len(), 11);
        assert_eq!(engine.date_range(), Some((day(3), day(6))));

        let empty = TripEngine::new(TripTable::default(), ZoneRegistry::default(), EngineConfig::default());
        assert_eq!(empty.date_range(), None);
    }

    #[test]
    fn test_query_bundle() {
        let engine = engine();
        let result = engine.query(&TripFilter::new(day(1), day(31)));

        assert_eq!(result.summary.trip_count, 11);
        assert_eq!(result.hourly.iter().map(|h| h.count).sum::<usize>(), 11);
        assert_eq!(result.zone_traffic.iter().map(|z| z.count).sum::<usize>(), 11);
        assert_eq!(result.zone_traffic[0].count, 10);
        assert_eq!(result.heatmap.len(), 11);

        let flows: Vec<(u32, u32)> = result
            .zone_flow
            .iter()
            .filter_map(|row| match row {
                ZoneFlowRow::Flow { source_zone, dest_zone, .. } => Some((*source_zone, *dest_zone)),
                _ => None,
            })
            .collect();
        assert_eq!(flows, vec![(1, 2)]);

        let clusters = result.route_clusters.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_count, 10);
    }

    #[test]
    fn test_query_empty_subset() {
        let engine = engine();
        let result = engine.query(&TripFilter::new(day(20), day(21)));

        assert_eq!(result.summary.trip_count, 0);
        assert_eq!(result.summary.avg_trip_miles, None);
        assert!(result.hourly.is_empty());
        assert_eq!(result.zone_traffic.len(), 5);
        assert_eq!(result.zone_flow.len(), 5);
        assert!(result.route_clusters.is_none());
    }

    #[test]
    fn test_query_serializes() {
        let engine = engine();
        let result = engine.query(&TripFilter::new(day(3), day(3)));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["summary"]["trip_count"], 10);
        assert_eq!(json["filter"]["day_type"], "ALL");
        assert_eq!(json["hourly"][0]["hour"], 8);
    }

    #[test]
    fn test_pickup_heatmap_and_geojson() {
        let engine = engine();
        let grid = engine.pickup_heatmap(&TripFilter::new(day(1), day(31)));
        assert_eq!(grid.total_pickups, 11);
        assert_eq!(grid.cells.len(), 2);

        assert_eq!(engine.zone_geojson().features.len(), 5);
    }
}
