//! # Geographic Utilities
//!
//! Planar coordinate helpers shared by zone classification, flow rendering,
//! route summaries and the pickup heatmap.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`euclidean_distance`] | Straight-line distance in (lat, lon) degree space |
//! | [`midpoint`] | Midpoint of two coordinates (flow display anchor) |
//! | [`compute_bounds`] | Bounding box of a set of points |
//! | [`compute_center`] | Arithmetic centroid of a set of points |
//! | [`square_ring`] | Closed `[lon, lat]` ring of a square around a center |
//! | [`meters_per_degree_lng`] | Longitude degree length at a latitude |
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 latitude/longitude in degrees. Distances are
//! deliberately NOT geodesic: zone assignment compares raw degree offsets, which
//! is adequate at city scale and keeps classification a cheap pure function.
//!
//! ```rust
//! use trip_flow::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(40.7831, -73.9712);
//! let b = GpsPoint::new(40.6782, -73.9442);
//!
//! let mid = geo_utils::midpoint(&a, &b);
//! assert!((mid.latitude - 40.73065).abs() < 1e-9);
//! assert!(geo_utils::euclidean_distance(&a, &b) > 0.1);
//! ```

use geo::{Distance, Euclidean, Point};
use crate::{GpsPoint, Bounds};

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Euclidean distance between two points, in degrees.
///
/// Latitude and longitude are treated as orthogonal axes of equal weight.
#[inline]
pub fn euclidean_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Euclidean::distance(point1, point2)
}

/// Midpoint of two coordinates in degree space.
#[inline]
pub fn midpoint(a: &GpsPoint, b: &GpsPoint) -> GpsPoint {
    GpsPoint::new(
        (a.latitude + b.latitude) / 2.0,
        (a.longitude + b.longitude) / 2.0,
    )
}

/// Length in meters of one degree of longitude at `latitude`.
///
/// Clamped so the value never collapses near the poles.
#[inline]
pub fn meters_per_degree_lng(latitude: f64) -> f64 {
    METERS_PER_DEGREE * latitude.to_radians().cos().max(0.1)
}

// =============================================================================
// Bounding Box / Centroid
// =============================================================================

/// Compute the bounding box of a set of points.
///
/// For empty input, returns a bounds with MIN/MAX values that contains nothing.
///
/// # Example
///
/// ```rust
/// use trip_flow::{GpsPoint, geo_utils};
///
/// let pts = vec![
///     GpsPoint::new(40.70, -74.00),
///     GpsPoint::new(40.80, -73.90),
/// ];
/// let bounds = geo_utils::compute_bounds(&pts);
/// assert_eq!(bounds.min_lat, 40.70);
/// assert_eq!(bounds.max_lng, -73.90);
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

/// Arithmetic mean of all latitudes and longitudes. Returns (0, 0) for empty input.
pub fn compute_center(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

/// Closed ring for a square of `half_extent` degrees around `center`.
///
/// Vertices are `[lon, lat]` pairs (GeoJSON order), starting at the south-west
/// corner and running counter-clockwise back to it.
pub fn square_ring(center: &GpsPoint, half_extent: f64) -> Vec<Vec<f64>> {
    let (lat, lon) = (center.latitude, center.longitude);
    vec![
        vec![lon - half_extent, lat - half_extent],
        vec![lon + half_extent, lat - half_extent],
        vec![lon + half_extent, lat + half_extent],
        vec![lon - half_extent, lat + half_extent],
        vec![lon - half_extent, lat - half_extent],
    ]
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_euclidean_distance_same_point() {
        let p = GpsPoint::new(40.7831, -73.9712);
        assert_eq!(euclidean_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = GpsPoint::new(40.0, -74.0);
        let b = GpsPoint::new(40.3, -73.6);
        assert!(approx_eq(euclidean_distance(&a, &b), 0.5, 1e-9));
    }

    #[test]
    fn test_midpoint() {
        let a = GpsPoint::new(40.0, -74.0);
        let b = GpsPoint::new(41.0, -73.0);
        let m = midpoint(&a, &b);
        assert!(approx_eq(m.latitude, 40.5, 1e-12));
        assert!(approx_eq(m.longitude, -73.5, 1e-12));
    }

    #[test]
    fn test_compute_bounds() {
        let pts = vec![
            GpsPoint::new(40.70, -74.00),
            GpsPoint::new(40.80, -73.90),
            GpsPoint::new(40.75, -73.95),
        ];
        let bounds = compute_bounds(&pts);
        assert_eq!(bounds.min_lat, 40.70);
        assert_eq!(bounds.max_lat, 40.80);
        assert_eq!(bounds.min_lng, -74.00);
        assert_eq!(bounds.max_lng, -73.90);
    }

    #[test]
    fn test_compute_center_empty() {
        let center = compute_center(&[]);
        assert_eq!(center.latitude, 0.0);
        assert_eq!(center.longitude, 0.0);
    }

    #[test]
    fn test_square_ring_is_closed_lon_lat() {
        let ring = square_ring(&GpsPoint::new(40.0, -74.0), 0.05);
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
        assert!(approx_eq(ring[0][0], -74.05, 1e-12));
        assert!(approx_eq(ring[0][1], 39.95, 1e-12));
        assert!(approx_eq(ring[2][0], -73.95, 1e-12));
        assert!(approx_eq(ring[2][1], 40.05, 1e-12));
    }

    #[test]
    fn test_meters_per_degree_lng_shrinks_with_latitude() {
        assert!(approx_eq(meters_per_degree_lng(0.0), METERS_PER_DEGREE, 1e-6));
        assert!(meters_per_degree_lng(40.7) < METERS_PER_DEGREE);
    }
}
