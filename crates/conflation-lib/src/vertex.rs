//! Immutable vertex with a parametric offset and 2D vector arithmetic

use std::ops::{Add, Mul, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A shape point of a feature
///
/// `o` is the normalized position of the vertex along its owning feature, in
/// `[0, 1]`. Vertices that do not belong to a feature (input points, vector
/// arithmetic results) carry `NaN` there; use [`Vertex::offset`] to read it
/// as an `Option`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub o: f64,
}

impl Vertex {
    /// Create a planar vertex without an offset
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            o: f64::NAN,
        }
    }

    /// Create a vertex with elevation but without an offset
    #[inline]
    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            o: f64::NAN,
        }
    }

    /// Create a fully specified vertex
    #[inline]
    pub const fn with_offset(x: f64, y: f64, z: f64, o: f64) -> Self {
        Self { x, y, z, o }
    }

    /// Copy of this vertex placed at another offset
    #[inline]
    pub const fn at_offset(&self, o: f64) -> Self {
        Self {
            x: self.x,
            y: self.y,
            z: self.z,
            o,
        }
    }

    /// Parametric offset, if the vertex belongs to a feature
    #[inline]
    pub fn offset(&self) -> Option<f64> {
        (!self.o.is_nan()).then_some(self.o)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    #[inline]
    pub fn dot(&self, other: &Vertex) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 2D cross product
    #[inline]
    pub fn cross(&self, other: &Vertex) -> f64 {
        self.x * other.y - self.y * other.x
    }

    #[inline]
    pub fn distance_sq(&self, other: &Vertex) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Compare planar coordinates with an absolute tolerance on each axis
    #[inline]
    pub fn equals_2d(&self, other: &Vertex, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    /// Planar coordinate, dropping elevation and offset
    #[inline]
    pub fn coord(&self) -> geo::Coord<f64> {
        geo::Coord {
            x: self.x,
            y: self.y,
        }
    }
}

impl Add for Vertex {
    type Output = Vertex;

    fn add(self, rhs: Vertex) -> Vertex {
        Vertex::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vertex {
    type Output = Vertex;

    fn sub(self, rhs: Vertex) -> Vertex {
        Vertex::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vertex {
    type Output = Vertex;

    fn mul(self, factor: f64) -> Vertex {
        Vertex::new(self.x * factor, self.y * factor)
    }
}

impl From<geo::Coord<f64>> for Vertex {
    fn from(c: geo::Coord<f64>) -> Self {
        Vertex::new(c.x, c.y)
    }
}

impl From<(f64, f64)> for Vertex {
    fn from((x, y): (f64, f64)) -> Self {
        Vertex::new(x, y)
    }
}

impl From<(f64, f64, f64)> for Vertex {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Vertex::with_z(x, y, z)
    }
}

impl From<Vertex> for geo::Coord<f64> {
    fn from(v: Vertex) -> Self {
        v.coord()
    }
}

/// Area of the triangle spanned by three vertices
pub fn triangle_area(v1: &Vertex, v2: &Vertex, v3: &Vertex) -> f64 {
    0.5 * (*v3 - *v2).cross(&(*v1 - *v2)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_ops() {
        let a = Vertex::new(1.0, 2.0);
        let b = Vertex::new(3.0, -1.0);

        let s = a + b;
        assert_eq!((s.x, s.y), (4.0, 1.0));
        let d = a - b;
        assert_eq!((d.x, d.y), (-2.0, 3.0));
        let m = a * 2.0;
        assert_eq!((m.x, m.y), (2.0, 4.0));

        assert_eq!(a.dot(&b), 1.0);
        assert_eq!(a.cross(&b), -7.0);
    }

    #[test]
    fn test_offset_is_optional() {
        let v = Vertex::new(1.0, 1.0);
        assert!(v.offset().is_none());
        assert_eq!(v.at_offset(0.25).offset(), Some(0.25));
    }

    #[test]
    fn test_triangle_area() {
        let area = triangle_area(
            &Vertex::new(0.0, 0.0),
            &Vertex::new(4.0, 0.0),
            &Vertex::new(0.0, 3.0),
        );
        assert!((area - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_equals_2d() {
        let a = Vertex::new(0.0, 0.0);
        assert!(a.equals_2d(&Vertex::new(0.0005, -0.0005), 0.001));
        assert!(!a.equals_2d(&Vertex::new(0.002, 0.0), 0.001));
    }
}
