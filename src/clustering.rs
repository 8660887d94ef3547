//! # Route Clustering
//!
//! Groups trips with similar pickup and dropoff locations into representative
//! routes using DBSCAN over standardized 4D coordinates.
//!
//! ## Algorithm
//! 1. Build features `(pickup_lat, pickup_lon, dropoff_lat, dropoff_lon)`
//! 2. Standardize each dimension to zero mean and unit population variance
//! 3. Index the features in an R-tree and collect every point's
//!    eps-neighborhood (the point itself included)
//! 4. Expand clusters from core points in table order
//!
//! | Label | Meaning |
//! |-------|---------|
//! | core | ≥ `min_samples` neighbors |
//! | border | within eps of a core point, joins the first cluster to reach it |
//! | noise | everything else, discarded |

use std::collections::VecDeque;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::normalize::TripRecord;
use crate::GpsPoint;

/// Tableau 10 palette.
pub const ROUTE_PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

/// Clustering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighborhood radius in standardized units (default: 0.01)
    pub eps: f64,
    /// Neighbors, self included, needed for a core point (default: 5)
    pub min_samples: usize,
    /// Member trips drawn as the representative route (default: 5)
    pub max_route_pairs: usize,
    /// Pick colors at random from this seed instead of cycling by id
    pub color_seed: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 0.01,
            min_samples: 5,
            max_route_pairs: 5,
            color_seed: None,
        }
    }
}

/// A representative route for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCluster {
    pub id: usize,
    /// `"Route {id + 1}"`
    pub name: String,
    pub member_count: usize,
    /// Alternating pickup, dropoff as `[lon, lat]`
    pub coordinates: Vec<[f64; 2]>,
    pub color: String,
    /// Line weight, `min(5, 1 + member_count / 50)`
    pub weight: f64,
    /// Mean of all member pickup and dropoff points
    pub center: GpsPoint,
}

// ============================================================================
// Feature Space
// ============================================================================

/// A feature vector with its row index for R-tree queries
#[derive(Debug, Clone, Copy)]
struct IndexedFeature {
    idx: usize,
    coords: [f64; 4],
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 4]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedFeature {
    fn distance_2(&self, point: &[f64; 4]) -> f64 {
        self.coords
            .iter()
            .zip(point)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// Scale each dimension to zero mean and unit population standard deviation.
///
/// Dimensions with zero variance are only centered.
pub fn standardize(features: &[[f64; 4]]) -> Vec<[f64; 4]> {
    if features.is_empty() {
        return Vec::new();
    }
    let n = features.len() as f64;

    let mut mean = [0.0; 4];
    for f in features {
        for d in 0..4 {
            mean[d] += f[d];
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut scale = [0.0; 4];
    for f in features {
        for d in 0..4 {
            scale[d] += (f[d] - mean[d]).powi(2);
        }
    }
    for s in &mut scale {
        *s = (*s / n).sqrt();
        if *s == 0.0 || !s.is_finite() {
            *s = 1.0;
        }
    }

    features
        .iter()
        .map(|f| {
            let mut out = [0.0; 4];
            for d in 0..4 {
                out[d] = (f[d] - mean[d]) / scale[d];
            }
            out
        })
        .collect()
}

fn neighborhoods(tree: &RTree<IndexedFeature>, points: &[[f64; 4]], eps: f64) -> Vec<Vec<usize>> {
    let eps_sq = eps * eps;
    let query = |p: &[f64; 4]| {
        let mut idx: Vec<usize> = tree.locate_within_distance(*p, eps_sq).map(|f| f.idx).collect();
        idx.sort_unstable();
        idx
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        points.par_iter().map(query).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        points.iter().map(query).collect()
    }
}

/// DBSCAN labels for `points`: `Some(cluster)` or `None` for noise.
///
/// Clusters are numbered from 0 in the order their first core point appears.
///
/// # Example
/// ```
/// use trip_flow::clustering::dbscan;
///
/// let points = vec![[0.0; 4], [0.0; 4], [0.0; 4], [9.0; 4]];
/// assert_eq!(dbscan(&points, 0.5, 3), vec![Some(0), Some(0), Some(0), None]);
/// ```
pub fn dbscan(points: &[[f64; 4]], eps: f64, min_samples: usize) -> Vec<Option<usize>> {
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(idx, &coords)| IndexedFeature { idx, coords })
            .collect(),
    );
    let neighbors = neighborhoods(&tree, points, eps);
    let is_core = |i: usize| neighbors[i].len() >= min_samples;

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut next_id = 0;

    for seed in 0..points.len() {
        if labels[seed].is_some() || !is_core(seed) {
            continue;
        }
        let id = next_id;
        next_id += 1;
        labels[seed] = Some(id);

        let mut queue: VecDeque<usize> = neighbors[seed].iter().copied().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_some() {
                continue;
            }
            labels[j] = Some(id);
            if is_core(j) {
                queue.extend(neighbors[j].iter().copied());
            }
        }
    }

    labels
}

// ============================================================================
// Route Summaries
// ============================================================================

fn summarize(id: usize, members: &[(GpsPoint, GpsPoint)], color: &str, config: &ClusterConfig) -> RouteCluster {
    let coordinates = members
        .iter()
        .take(config.max_route_pairs)
        .flat_map(|(p, d)| [p.to_lon_lat(), d.to_lon_lat()])
        .collect();

    let n = (members.len() * 2) as f64;
    let (lat_sum, lon_sum) = members.iter().fold((0.0, 0.0), |(lat, lon), (p, d)| {
        (lat + p.latitude + d.latitude, lon + p.longitude + d.longitude)
    });

    RouteCluster {
        id,
        name: format!("Route {}", id + 1),
        member_count: members.len(),
        coordinates,
        color: color.to_string(),
        weight: (1.0 + members.len() as f64 / 50.0).min(5.0),
        center: GpsPoint::new(lat_sum / n, lon_sum / n),
    }
}

/// Cluster `records` into representative pickup→dropoff routes.
///
/// Returns `None` when there are fewer than `min_samples` usable rows (trips
/// missing either coordinate are skipped) or when every row is noise.
pub fn cluster_routes(records: &[TripRecord], config: &ClusterConfig) -> Option<Vec<RouteCluster>> {
    let pairs: Vec<(GpsPoint, GpsPoint)> = records
        .iter()
        .filter_map(|r| Some((r.pickup?, r.dropoff?)))
        .collect();

    if pairs.len() < config.min_samples {
        debug!(
            "Skipping clustering: {} rows, {} required",
            pairs.len(),
            config.min_samples
        );
        return None;
    }

    let features: Vec<[f64; 4]> = pairs
        .iter()
        .map(|(p, d)| [p.latitude, p.longitude, d.latitude, d.longitude])
        .collect();
    let labels = dbscan(&standardize(&features), config.eps, config.min_samples);

    let cluster_count = labels.iter().flatten().max().map_or(0, |&max| max + 1);
    let mut members: Vec<Vec<(GpsPoint, GpsPoint)>> = vec![Vec::new(); cluster_count];
    let mut noise = 0;
    for (pair, label) in pairs.iter().zip(&labels) {
        match label {
            Some(id) => members[*id].push(*pair),
            None => noise += 1,
        }
    }

    debug!("DBSCAN found {} clusters, {} noise rows", cluster_count, noise);

    if cluster_count == 0 {
        return None;
    }

    let mut rng = config.color_seed.map(StdRng::seed_from_u64);
    let clusters = members
        .iter()
        .enumerate()
        .map(|(id, group)| {
            let color = match rng.as_mut() {
                Some(rng) => ROUTE_PALETTE[rng.gen_range(0..ROUTE_PALETTE.len())],
                None => ROUTE_PALETTE[id % ROUTE_PALETTE.len()],
            };
            summarize(id, group, color, config)
        })
        .collect();

    Some(clusters)
}
