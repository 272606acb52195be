//! Adapters turning external geometries into parametrised vertices
//!
//! The core never parses files. Callers hand over coordinates through one of
//! the adapters below and get a vertex array with offsets assigned plus the
//! feature length, ready for [`Feature::from_parametrized`].
//!
//! [`Feature::from_parametrized`]: crate::Feature::from_parametrized

use crate::utils::meters;
use crate::vertex::Vertex;
use crate::{DataError, Result};
use geo::{Coord, LineString};

/// Conversion from an external geometry `G` into feature vertices
pub trait InputAdapter<G: ?Sized> {
    /// # Returns
    /// Vertices with offsets in `[0, 1]` and the total length of the geometry
    fn convert(&self, geometry: &G) -> Result<(Vec<Vertex>, f64)>;
}

/// Planar coordinates, length measured in coordinate units
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanAdapter;

/// WGS84 coordinates (x = longitude, y = latitude), length measured in meters
#[derive(Clone, Copy, Debug, Default)]
pub struct GeodeticAdapter;

/// Distance metric used to derive offsets
trait Metric {
    fn distance(&self, a: &Vertex, b: &Vertex) -> f64;
}

impl Metric for EuclideanAdapter {
    #[inline]
    fn distance(&self, a: &Vertex, b: &Vertex) -> f64 {
        a.distance_sq(b).sqrt()
    }
}

impl Metric for GeodeticAdapter {
    #[inline]
    fn distance(&self, a: &Vertex, b: &Vertex) -> f64 {
        meters(a.y, a.x, b.y, b.x)
    }
}

/// Validate raw vertices and assign offsets from cumulative distance
fn parametrize<M: Metric>(metric: &M, mut vertices: Vec<Vertex>) -> Result<(Vec<Vertex>, f64)> {
    #[cfg(feature = "profiling")]
    profiling::scope!("input::parametrize");

    if vertices.len() < 2 {
        return Err(DataError::TooFewVertices { count: vertices.len() });
    }
    if let Some(index) = vertices.iter().position(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteCoordinate { index });
    }

    let mut cumulative = Vec::with_capacity(vertices.len());
    let mut total = 0.0;
    cumulative.push(0.0);
    for pair in vertices.windows(2) {
        total += metric.distance(&pair[0], &pair[1]);
        cumulative.push(total);
    }
    if !(total > 0.0 && total.is_finite()) {
        return Err(DataError::DegenerateGeometry(format!("geometry length is {total}")));
    }

    for (v, d) in vertices.iter_mut().zip(cumulative) {
        v.o = d / total;
    }
    if let Some(last) = vertices.last_mut() {
        last.o = 1.0;
    }
    Ok((vertices, total))
}

fn from_coords(coords: &[Coord<f64>]) -> Vec<Vertex> {
    coords.iter().map(|c| Vertex::new(c.x, c.y)).collect()
}

fn from_track_segment(segment: &gpx::TrackSegment) -> Vec<Vertex> {
    segment
        .points
        .iter()
        .map(|w| {
            let p = w.point();
            Vertex::with_z(p.x(), p.y(), w.elevation.unwrap_or(0.0))
        })
        .collect()
}

macro_rules! impl_adapter {
    ($adapter:ty) => {
        impl InputAdapter<[Coord<f64>]> for $adapter {
            fn convert(&self, geometry: &[Coord<f64>]) -> Result<(Vec<Vertex>, f64)> {
                parametrize(self, from_coords(geometry))
            }
        }

        impl InputAdapter<LineString<f64>> for $adapter {
            fn convert(&self, geometry: &LineString<f64>) -> Result<(Vec<Vertex>, f64)> {
                parametrize(self, from_coords(&geometry.0))
            }
        }

        impl InputAdapter<gpx::TrackSegment> for $adapter {
            fn convert(&self, geometry: &gpx::TrackSegment) -> Result<(Vec<Vertex>, f64)> {
                parametrize(self, from_track_segment(geometry))
            }
        }
    };
}

impl_adapter!(EuclideanAdapter);
impl_adapter!(GeodeticAdapter);
