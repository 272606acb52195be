//! Geodesic helpers for deriving planar tolerances from metric ones
//!
//! Matching runs in the features' own coordinate space. These helpers are
//! only used at the edges of the library: to turn a tolerance in meters into
//! degree deltas around a scope center, and to flatten WGS84 features into a
//! locally isotropic plane.

use crate::feature::Feature;
use crate::vertex::Vertex;
use crate::Result;
use geo::{Distance, Geodesic, Point};

/// Step in degrees used when measuring the local metric scale
const DEGREE_PROBE: f64 = 0.001;

/// Ellipsoidal distance between two WGS84 positions in meters
///
/// # Arguments
/// * `lat1`, `lon1` - First position in degrees
/// * `lat2`, `lon2` - Second position in degrees
#[inline]
pub fn meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Geodesic.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Convert a metric tolerance into degree deltas around a center
///
/// # Arguments
/// * `center_x` - Longitude of the scope center in degrees
/// * `center_y` - Latitude of the scope center in degrees
/// * `meters` - Tolerance in meters
///
/// # Returns
/// `(dx, dy)`: the longitude and latitude deltas covering `meters` at the center
pub fn degree_tolerance(center_x: f64, center_y: f64, meters_tolerance: f64) -> (f64, f64) {
    let dx_m = meters(center_y, center_x, center_y, center_x + DEGREE_PROBE);
    let dy_m = meters(center_y, center_x, center_y + DEGREE_PROBE, center_x);
    (
        meters_tolerance * DEGREE_PROBE / dx_m,
        meters_tolerance * DEGREE_PROBE / dy_m,
    )
}

/// Local equirectangular plane around a scope center
///
/// Latitude is stretched so that one unit along x and one along y have the
/// same metric length near the center. Offsets and feature lengths pass
/// through unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalProjection {
    lat_factor: f64,
    distance_factor: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl LocalProjection {
    /// Measure the local scale at `center` (x = longitude, y = latitude)
    pub fn new(center: &Vertex) -> Self {
        let (tx, ty) = degree_tolerance(center.x, center.y, 1.0);
        Self {
            lat_factor: tx / ty,
            distance_factor: 1.0 / tx,
        }
    }

    /// Ratio applied to latitude when entering the plane
    #[inline]
    pub fn lat_factor(&self) -> f64 {
        self.lat_factor
    }

    /// Meters per plane unit near the center
    #[inline]
    pub fn distance_factor(&self) -> f64 {
        self.distance_factor
    }

    #[inline]
    pub fn to_euclid(&self, v: &Vertex) -> Vertex {
        Vertex::with_offset(v.x, v.y * self.lat_factor, v.z, v.o)
    }

    #[inline]
    pub fn to_wgs(&self, v: &Vertex) -> Vertex {
        Vertex::with_offset(v.x, v.y / self.lat_factor, v.z, v.o)
    }

    /// Project every vertex of a WGS84 feature into the plane
    pub fn feature_to_euclid<T: Clone>(&self, feature: &Feature<T>) -> Result<Feature<T>> {
        let vertices = feature.vertices().iter().map(|v| self.to_euclid(v)).collect();
        Feature::from_parametrized(feature.length(), vertices, feature.custom_data().clone())
    }

    pub fn feature_to_wgs<T: Clone>(&self, feature: &Feature<T>) -> Result<Feature<T>> {
        let vertices = feature.vertices().iter().map(|v| self.to_wgs(v)).collect();
        Feature::from_parametrized(feature.length(), vertices, feature.custom_data().clone())
    }

    /// Move a plane vertex by a metric offset
    ///
    /// # Arguments
    /// * `v` - Vertex in plane coordinates
    /// * `dx_m`, `dy_m` - Displacement in meters
    /// * `o` - Offset given to the result
    pub fn translate(&self, v: &Vertex, dx_m: f64, dy_m: f64, o: f64) -> Vertex {
        Vertex::with_offset(
            v.x + dx_m / self.distance_factor,
            v.y + dy_m / self.distance_factor,
            0.0,
            o,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_one_degree_latitude() {
        let d = meters(0.0, 0.0, 1.0, 0.0);
        // one degree of latitude at the equator is about 110.57 km
        assert!((d - 110_574.0).abs() < 50.0, "got {d}");
        assert_eq!(meters(45.0, 7.0, 45.0, 7.0), 0.0);
    }

    #[test]
    fn test_degree_tolerance_equator() {
        let (dx, dy) = degree_tolerance(0.0, 0.0, 1.0);
        assert!((dx - 8.98e-6).abs() < 1e-7, "dx {dx}");
        assert!((dy - 9.04e-6).abs() < 1e-7, "dy {dy}");
    }

    #[test]
    fn test_degree_tolerance_shrinks_with_latitude() {
        let (dx_equator, _) = degree_tolerance(10.0, 0.0, 5.0);
        let (dx_north, _) = degree_tolerance(10.0, 60.0, 5.0);
        // a degree of longitude is about half as long at 60 degrees north
        assert!(dx_north > 1.9 * dx_equator);
        assert!(dx_north < 2.1 * dx_equator);
    }

    #[test]
    fn test_local_projection_round_trip() {
        let projection = LocalProjection::new(&Vertex::new(13.4, 52.5));
        assert!(projection.lat_factor() > 1.5);
        let v = Vertex::with_offset(13.41, 52.52, 3.0, 0.25);
        let back = projection.to_wgs(&projection.to_euclid(&v));
        assert!((back.y - v.y).abs() < 1e-12);
        assert_eq!(back.x, v.x);
        assert_eq!(back.o, 0.25);
        assert_eq!(back.z, 3.0);
    }

    #[test]
    fn test_local_projection_translate() {
        let projection = LocalProjection::new(&Vertex::new(0.0, 45.0));
        let origin = Vertex::new(0.0, 45.0);
        let moved = projection.translate(&origin, 100.0, 0.0, 0.5);
        let measured = meters(origin.y, origin.x, origin.y, moved.x);
        assert!((measured - 100.0).abs() < 0.5, "got {measured}");
        assert_eq!(moved.o, 0.5);
    }

    #[test]
    fn test_feature_projection_keeps_offsets() {
        let projection = LocalProjection::new(&Vertex::new(2.0, 41.0));
        let feature = Feature::build_with_length(
            vec![Vertex::new(2.0, 41.0), Vertex::new(2.001, 41.0), Vertex::new(2.001, 41.002)],
            Some(310.0),
            7u32,
        )
        .unwrap();
        let plane = projection.feature_to_euclid(&feature).unwrap();
        assert_eq!(plane.length(), 310.0);
        assert_eq!(*plane.custom_data(), 7);
        for (a, b) in feature.vertices().iter().zip(plane.vertices()) {
            assert_eq!(a.o, b.o);
        }
        let back = projection.feature_to_wgs(&plane).unwrap();
        assert!((back.last_vertex().y - 41.002).abs() < 1e-12);
    }
}
