//! # Aggregation
//!
//! Summary statistics, temporal distributions, zone traffic and zone-to-zone
//! flows over a working subset of trips.
//!
//! Every function accepts an empty slice and returns an empty or zero result.
//! Counts are order-independent, so results do not depend on how the subset
//! was produced.
//!
//! ## Flow thresholding
//! Pair counts are computed for every (pickup zone, dropoff zone) combination
//! present in the subset, self-pairs included. The threshold is the 0.8
//! quantile of those counts using linear interpolation between closest ranks.
//! Pairs at or above the threshold are kept, then self-flows are dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filter::DayType;
use crate::geo_utils::midpoint;
use crate::normalize::TripRecord;
use crate::zones::{ZoneId, ZoneRegistry};
use crate::GpsPoint;

/// Default quantile for [`zone_flow`].
pub const DEFAULT_FLOW_QUANTILE: f64 = 0.8;

// ============================================================================
// Summary Statistics
// ============================================================================

/// Scalar overview of a subset.
///
/// A `None` mean means "unavailable": the source column is missing from the
/// dataset or the subset holds no values for it. It is never reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub trip_count: usize,
    pub avg_duration_minutes: Option<f64>,
    pub avg_trip_miles: Option<f64>,
    pub avg_driver_pay: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Row count and per-metric means of `records`.
pub fn summary_stats(records: &[TripRecord]) -> SummaryStats {
    SummaryStats {
        trip_count: records.len(),
        avg_duration_minutes: mean(records.iter().filter_map(|r| r.trip_duration_minutes)),
        avg_trip_miles: mean(records.iter().filter_map(|r| r.trip_miles)),
        avg_driver_pay: mean(records.iter().filter_map(|r| r.driver_pay)),
    }
}

// ============================================================================
// Temporal Distributions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyCount {
    pub hour: u8,
    pub count: usize,
}

/// Trips per pickup hour, ascending. Hours without trips are omitted.
pub fn hourly_distribution(records: &[TripRecord]) -> Vec<HourlyCount> {
    let mut counts = [0usize; 24];
    for r in records {
        counts[usize::from(r.pickup_hour) % 24] += 1;
    }

    counts
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(hour, &count)| HourlyCount { hour: hour as u8, count })
        .collect()
}

/// Expand a sparse hourly series to 24 buckets, zero-filling gaps.
pub fn dense_hourly(series: &[HourlyCount]) -> [usize; 24] {
    let mut dense = [0usize; 24];
    for h in series {
        if let Some(slot) = dense.get_mut(usize::from(h.hour)) {
            *slot += h.count;
        }
    }
    dense
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayTypeHourlyCount {
    pub hour: u8,
    pub is_weekend: bool,
    /// `WEEKDAY` or `WEEKEND`
    pub day_type: DayType,
    pub count: usize,
}

/// Trips per (pickup hour, weekend flag), ordered by hour then weekday first.
pub fn weekday_weekend_comparison(records: &[TripRecord]) -> Vec<DayTypeHourlyCount> {
    let mut counts = [[0usize; 2]; 24];
    for r in records {
        counts[usize::from(r.pickup_hour) % 24][usize::from(r.is_weekend)] += 1;
    }

    let mut rows = Vec::new();
    for (hour, pair) in counts.iter().enumerate() {
        for (idx, &count) in pair.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let is_weekend = idx == 1;
            rows.push(DayTypeHourlyCount {
                hour: hour as u8,
                is_weekend,
                day_type: DayType::of(is_weekend),
                count,
            });
        }
    }
    rows
}

// ============================================================================
// Zone Traffic
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneCount {
    pub zone_id: ZoneId,
    pub count: usize,
}

/// Pickups per zone. Always lists every zone in the registry, in id order.
///
/// Trips without a pickup coordinate are not counted.
pub fn zone_traffic(records: &[TripRecord], zones: &ZoneRegistry) -> Vec<ZoneCount> {
    let pickups: Vec<GpsPoint> = records.iter().filter_map(|r| r.pickup).collect();

    let mut counts: BTreeMap<ZoneId, usize> = zones.zones().iter().map(|z| (z.id, 0)).collect();
    for id in zones.assign_zones(&pickups) {
        *counts.entry(id).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(zone_id, count)| ZoneCount { zone_id, count })
        .collect()
}

// ============================================================================
// Zone Flow
// ============================================================================

/// Flow tuning. The quantile is clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub quantile: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self { quantile: DEFAULT_FLOW_QUANTILE }
    }
}

/// A retained zone-to-zone flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub source_zone: ZoneId,
    pub dest_zone: ZoneId,
    pub count: usize,
}

/// A row of the zone-flow table handed to the map layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ZoneFlowRow {
    /// Zone marker; count is always 0.
    Center {
        zone_id: ZoneId,
        zone_name: String,
        latitude: f64,
        longitude: f64,
        count: usize,
    },
    /// A retained flow, anchored at the midpoint of the two zone centers.
    Flow {
        /// `"{source}-{dest}"`
        zone_id: String,
        /// `"{source name} → {dest name}"`
        zone_name: String,
        source_zone: ZoneId,
        dest_zone: ZoneId,
        latitude: f64,
        longitude: f64,
        start_lat: f64,
        start_lon: f64,
        end_lat: f64,
        end_lon: f64,
        count: usize,
    },
}

impl ZoneFlowRow {
    /// Trip count; 0 for center rows.
    pub fn count(&self) -> usize {
        match self {
            ZoneFlowRow::Center { count, .. } | ZoneFlowRow::Flow { count, .. } => *count,
        }
    }

    /// True for a retained flow row.
    pub fn is_flow(&self) -> bool {
        matches!(self, ZoneFlowRow::Flow { .. })
    }
}

/// Quantile of `values` by linear interpolation between closest ranks.
///
/// Returns `None` for empty input; a single value is its own quantile.
///
/// # Example
/// ```
/// use trip_flow::aggregate::quantile;
///
/// let p80 = quantile(&[5.0, 1.0, 4.0, 2.0, 3.0], 0.8).unwrap();
/// assert!((p80 - 4.2).abs() < 1e-9);
/// assert_eq!(quantile(&[7.0], 0.8), Some(7.0));
/// assert_eq!(quantile(&[], 0.8), None);
/// ```
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;

    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Trip counts per (pickup zone, dropoff zone), self-pairs included.
///
/// Only trips with both coordinates take part.
pub fn pair_counts(records: &[TripRecord], zones: &ZoneRegistry) -> BTreeMap<(ZoneId, ZoneId), usize> {
    let (pickups, dropoffs): (Vec<GpsPoint>, Vec<GpsPoint>) = records
        .iter()
        .filter_map(|r| Some((r.pickup?, r.dropoff?)))
        .unzip();

    let sources = zones.assign_zones(&pickups);
    let dests = zones.assign_zones(&dropoffs);

    let mut counts = BTreeMap::new();
    for pair in sources.into_iter().zip(dests) {
        *counts.entry(pair).or_insert(0) += 1;
    }
    counts
}

/// Non-self pairs whose count reaches the `q` quantile of all pair counts.
pub fn significant_flows(counts: &BTreeMap<(ZoneId, ZoneId), usize>, q: f64) -> Vec<FlowEdge> {
    let values: Vec<f64> = counts.values().map(|&c| c as f64).collect();
    let Some(threshold) = quantile(&values, q) else {
        return Vec::new();
    };

    counts
        .iter()
        .filter(|(&(source, dest), &count)| source != dest && count as f64 >= threshold)
        .map(|(&(source_zone, dest_zone), &count)| FlowEdge { source_zone, dest_zone, count })
        .collect()
}

/// Zone-flow table with the default 0.8 quantile.
pub fn zone_flow(records: &[TripRecord], zones: &ZoneRegistry) -> Vec<ZoneFlowRow> {
    zone_flow_with(records, zones, &FlowConfig::default())
}

/// Zone-flow table: one center row per zone, then one row per retained flow
/// in ascending (source, dest) order.
pub fn zone_flow_with(records: &[TripRecord], zones: &ZoneRegistry, config: &FlowConfig) -> Vec<ZoneFlowRow> {
    let mut rows: Vec<ZoneFlowRow> = zones
        .zones()
        .iter()
        .map(|z| ZoneFlowRow::Center {
            zone_id: z.id,
            zone_name: z.name.clone(),
            latitude: z.center.latitude,
            longitude: z.center.longitude,
            count: 0,
        })
        .collect();

    let counts = pair_counts(records, zones);
    for edge in significant_flows(&counts, config.quantile) {
        let (Some(start), Some(end)) = (zones.get(edge.source_zone), zones.get(edge.dest_zone)) else {
            continue;
        };
        let anchor = midpoint(&start.center, &end.center);

        rows.push(ZoneFlowRow::Flow {
            zone_id: format!("{}-{}", edge.source_zone, edge.dest_zone),
            zone_name: format!("{} → {}", start.name, end.name),
            source_zone: edge.source_zone,
            dest_zone: edge.dest_zone,
            latitude: anchor.latitude,
            longitude: anchor.longitude,
            start_lat: start.center.latitude,
            start_lon: start.center.longitude,
            end_lat: end.center.latitude,
            end_lon: end.center.longitude,
            count: edge.count,
        });
    }

    rows
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::trip;

    fn center(zones: &ZoneRegistry, id: ZoneId) -> GpsPoint {
        zones.get(id).unwrap().center
    }

    /// Ten identical weekday trips at 08:xx from zone 1 to zone 2.
    fn commute(zones: &ZoneRegistry) -> Vec<TripRecord> {
        (0..10)
            .map(|i| {
                trip(
                    &format!("2024-01-03 08:{:02}:00", i),
                    center(zones, 1),
                    center(zones, 2),
                )
            })
            .collect()
    }

    fn flows(rows: &[ZoneFlowRow]) -> Vec<(ZoneId, ZoneId, usize)> {
        rows.iter()
            .filter_map(|row| match row {
                ZoneFlowRow::Flow { source_zone, dest_zone, count, .. } => {
                    Some((*source_zone, *dest_zone, *count))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_summary_stats_means() {
        let zones = ZoneRegistry::nyc_boroughs();
        let mut records = commute(&zones);
        records[0].trip_miles = Some(2.0);
        records[1].trip_miles = Some(4.0);
        records[0].driver_pay = Some(10.0);

        let stats = summary_stats(&records);
        assert_eq!(stats.trip_count, 10);
        assert_eq!(stats.avg_duration_minutes, Some(15.0));
        assert_eq!(stats.avg_trip_miles, Some(3.0));
        assert_eq!(stats.avg_driver_pay, Some(10.0));
    }

    #[test]
    fn test_summary_stats_missing_columns_are_unavailable() {
        let zones = ZoneRegistry::nyc_boroughs();
        let mut records = commute(&zones);
        for r in &mut records {
            r.trip_duration_minutes = None;
        }
        let stats = summary_stats(&records);
        assert_eq!(stats.trip_count, 10);
        assert_eq!(stats.avg_duration_minutes, None);
        assert_eq!(stats.avg_trip_miles, None);
        assert_eq!(stats.avg_driver_pay, None);
    }

    #[test]
    fn test_empty_subset() {
        let zones = ZoneRegistry::nyc_boroughs();
        let stats = summary_stats(&[]);
        assert_eq!(stats.trip_count, 0);
        assert_eq!(stats.avg_trip_miles, None);

        assert!(hourly_distribution(&[]).is_empty());
        assert!(weekday_weekend_comparison(&[]).is_empty());

        let traffic = zone_traffic(&[], &zones);
        assert_eq!(traffic.len(), 5);
        assert!(traffic.iter().all(|z| z.count == 0));

        let rows = zone_flow(&[], &zones);
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| !r.is_flow()));
    }

    #[test]
    fn test_commute_scenario() {
        let zones = ZoneRegistry::nyc_boroughs();
        let records = commute(&zones);

        assert_eq!(hourly_distribution(&records), vec![HourlyCount { hour: 8, count: 10 }]);

        let traffic = zone_traffic(&records, &zones);
        let ids: Vec<ZoneId> = traffic.iter().map(|z| z.zone_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(traffic[0].count, 10);
        assert!(traffic[1..].iter().all(|z| z.count == 0));

        let rows = zone_flow(&records, &zones);
        assert_eq!(flows(&rows), vec![(1, 2, 10)]);

        match rows.last().unwrap() {
            ZoneFlowRow::Flow { zone_id, zone_name, latitude, start_lat, end_lat, .. } => {
                assert_eq!(zone_id, "1-2");
                assert_eq!(zone_name, "Manhattan → Brooklyn");
                assert!((latitude - (start_lat + end_lat) / 2.0).abs() < 1e-12);
            }
            other => panic!("expected flow row, got {:?}", other),
        }
    }

    #[test]
    fn test_hourly_sum_matches_trip_count() {
        let zones = ZoneRegistry::nyc_boroughs();
        let mut records = commute(&zones);
        records.push(trip("2024-01-03 17:45:00", center(&zones, 2), center(&zones, 1)));
        records.push(trip("2024-01-06 17:10:00", center(&zones, 3), center(&zones, 1)));

        let hourly = hourly_distribution(&records);
        let total: usize = hourly.iter().map(|h| h.count).sum();
        assert_eq!(total, summary_stats(&records).trip_count);

        let dense = dense_hourly(&hourly);
        assert_eq!(dense[8], 10);
        assert_eq!(dense[17], 2);
        assert_eq!(dense.iter().sum::<usize>(), total);
    }

    #[test]
    fn test_weekday_weekend_comparison_labels() {
        let zones = ZoneRegistry::nyc_boroughs();
        let a = center(&zones, 1);
        let b = center(&zones, 2);
        let records = vec![
            trip("2024-01-03 17:00:00", a, b), // Wednesday
            trip("2024-01-06 17:30:00", a, b), // Saturday
            trip("2024-01-07 17:45:00", a, b), // Sunday
            trip("2024-01-07 09:00:00", a, b),
        ];

        let rows = weekday_weekend_comparison(&records);
        assert_eq!(
            rows,
            vec![
                DayTypeHourlyCount { hour: 9, is_weekend: true, day_type: DayType::Weekend, count: 1 },
                DayTypeHourlyCount { hour: 17, is_weekend: false, day_type: DayType::Weekday, count: 1 },
                DayTypeHourlyCount { hour: 17, is_weekend: true, day_type: DayType::Weekend, count: 2 },
            ]
        );
    }

    #[test]
    fn test_zone_traffic_sums_to_row_count() {
        let zones = ZoneRegistry::nyc_boroughs();
        let records: Vec<TripRecord> = (0..40)
            .map(|i| {
                let p = GpsPoint::new(40.55 + (i % 10) as f64 * 0.04, -74.25 + (i % 7) as f64 * 0.08);
                trip("2024-01-03 12:00:00", p, center(&zones, 1))
            })
            .collect();

        let traffic = zone_traffic(&records, &zones);
        assert_eq!(traffic.len(), zones.len());
        assert_eq!(traffic.iter().map(|z| z.count).sum::<usize>(), records.len());
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let p80 = quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.8).unwrap();
        assert!((p80 - 4.2).abs() < 1e-9);
        let p50 = quantile(&[1.0, 2.0, 3.0, 4.0], 0.5).unwrap();
        assert!((p50 - 2.5).abs() < 1e-9);
        assert_eq!(quantile(&[3.0, 3.0, 3.0], 0.8), Some(3.0));
        assert_eq!(quantile(&[1.0, 10.0], 0.0), Some(1.0));
        assert_eq!(quantile(&[1.0, 10.0], 1.0), Some(10.0));
        assert_eq!(quantile(&[9.0], 0.8), Some(9.0));
        assert_eq!(quantile(&[], 0.8), None);
    }

    #[test]
    fn test_zone_flow_threshold_drops_small_pairs_and_self_flows() {
        let zones = ZoneRegistry::nyc_boroughs();
        let c = |id| center(&zones, id);
        let mut records = commute(&zones); // 1 -> 2 x10
        records.push(trip("2024-01-03 09:00:00", c(2), c(3)));
        records.push(trip("2024-01-03 09:00:00", c(3), c(1)));
        records.push(trip("2024-01-03 09:00:00", c(4), c(5)));
        // self-flows that dominate the distribution
        for _ in 0..20 {
            records.push(trip("2024-01-03 10:00:00", c(5), c(5)));
        }

        // counts [1, 1, 1, 10, 20] -> p80 = 10 + 0.2 * 10 = 12
        let rows = zone_flow(&records, &zones);
        assert!(flows(&rows).is_empty());

        // counts [1, 1, 1, 10] without the self-flows -> p80 = 1 + 0.4 * 9 = 4.6
        records.truncate(13);
        assert_eq!(flows(&zone_flow(&records, &zones)), vec![(1, 2, 10)]);
    }

    #[test]
    fn test_all_equal_counts_keep_every_non_self_pair() {
        let zones = ZoneRegistry::nyc_boroughs();
        let c = |id| center(&zones, id);
        let records = vec![
            trip("2024-01-03 09:00:00", c(1), c(2)),
            trip("2024-01-03 09:00:00", c(2), c(3)),
            trip("2024-01-03 09:00:00", c(3), c(3)),
            trip("2024-01-03 09:00:00", c(5), c(4)),
        ];
        let rows = zone_flow(&records, &zones);
        assert_eq!(flows(&rows), vec![(1, 2, 1), (2, 3, 1), (5, 4, 1)]);
        assert!(rows.iter().all(|r| match r {
            ZoneFlowRow::Flow { source_zone, dest_zone, .. } => source_zone != dest_zone,
            ZoneFlowRow::Center { count, .. } => *count == 0,
        }));
    }

    #[test]
    fn test_tunable_quantile() {
        let zones = ZoneRegistry::nyc_boroughs();
        let c = |id| center(&zones, id);
        let mut records = commute(&zones);
        records.push(trip("2024-01-03 09:00:00", c(2), c(3)));

        let config = FlowConfig { quantile: 0.0 };
        assert_eq!(flows(&zone_flow_with(&records, &zones, &config)), vec![(1, 2, 10), (2, 3, 1)]);
    }

    #[test]
    fn test_flow_rows_serialize_with_type_tag() {
        let zones = ZoneRegistry::nyc_boroughs();
        let rows = zone_flow(&commute(&zones), &zones);
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["type"], "center");
        assert_eq!(json[0]["count"], 0);
        assert_eq!(json[5]["type"], "flow");
        assert_eq!(json[5]["source_zone"], 1);
        assert_eq!(json[5]["count"], 10);
    }
}
