//! Edge cursor walking a feature in either direction
//!
//! The matcher walks source and target features in lock-step, the target
//! possibly against its digitizing order. One [`Cursor`] type covers both
//! cases; the [`CursorDirection`] flag only changes the index arithmetic and
//! which end of the current edge counts as "first".

use crate::bbox::BoundingBox;
use crate::feature::Feature;
use crate::segment::{EdgeRef, SegmentRef};
use crate::vertex::Vertex;
use std::fmt;

/// Walking order of a [`Cursor`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorDirection {
    /// Digitizing order, edge indices increase
    Forward,
    /// Against digitizing order, edge indices decrease
    Backward,
}

/// Position on one edge of a feature plus a walking direction
pub struct Cursor<'a, T> {
    feature: &'a Feature<T>,
    position: usize,
    direction: CursorDirection,
}

impl<T> Clone for Cursor<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Cursor<'_, T> {}

impl<'a, T> Cursor<'a, T> {
    /// Cursor at the walking start of the whole feature
    pub fn new(feature: &'a Feature<T>, direction: CursorDirection) -> Self {
        let mut cursor = Self {
            feature,
            position: 0,
            direction,
        };
        cursor.reset();
        cursor
    }

    /// Cursor at the walking start of a segment
    ///
    /// The cursor is not bounded by the segment; it can walk on into the
    /// neighbouring segments.
    pub fn from_segment(segment: &SegmentRef<'a, T>, direction: CursorDirection) -> Self {
        let position = match direction {
            CursorDirection::Forward => segment.first_edge_index(),
            CursorDirection::Backward => segment.last_edge_index(),
        };
        Self {
            feature: segment.feature(),
            position,
            direction,
        }
    }

    #[inline]
    fn last_index(&self) -> usize {
        self.feature.edge_count() - 1
    }

    #[inline]
    fn edge(&self) -> EdgeRef<'a, T> {
        self.feature.edge_at(self.position)
    }

    #[inline]
    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    #[inline]
    pub fn feature(&self) -> &'a Feature<T> {
        self.feature
    }

    /// Index of the current edge within the feature
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.last_index());
    }

    /// Move to the first edge in walking order
    pub fn reset(&mut self) {
        self.position = match self.direction {
            CursorDirection::Forward => 0,
            CursorDirection::Backward => self.last_index(),
        };
    }

    /// Step one edge in walking order
    ///
    /// # Returns
    /// `false`, without moving, when already on the last edge
    pub fn next(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        match self.direction {
            CursorDirection::Forward => self.position += 1,
            CursorDirection::Backward => self.position -= 1,
        }
        true
    }

    /// Step one edge against walking order
    pub fn previous(&mut self) -> bool {
        match self.direction {
            CursorDirection::Forward if self.position != 0 => {
                self.position -= 1;
                true
            }
            CursorDirection::Backward if self.position < self.last_index() => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// Edges left after the current one in walking order
    pub fn steps_remain(&self) -> usize {
        match self.direction {
            CursorDirection::Forward => self.last_index() - self.position,
            CursorDirection::Backward => self.position,
        }
    }

    /// Whether the current edge is the last one in walking order
    #[inline]
    pub fn is_last(&self) -> bool {
        match self.direction {
            CursorDirection::Forward => self.position == self.last_index(),
            CursorDirection::Backward => self.position == 0,
        }
    }

    /// Vertex where the current edge starts in walking order
    #[inline]
    pub fn edge_first_vertex(&self) -> &'a Vertex {
        match self.direction {
            CursorDirection::Forward => self.edge().first_vertex(),
            CursorDirection::Backward => self.edge().last_vertex(),
        }
    }

    /// Vertex where the current edge ends in walking order
    #[inline]
    pub fn edge_last_vertex(&self) -> &'a Vertex {
        match self.direction {
            CursorDirection::Forward => self.edge().last_vertex(),
            CursorDirection::Backward => self.edge().first_vertex(),
        }
    }

    #[inline]
    pub fn tangent(&self) -> f64 {
        self.edge().tangent()
    }

    /// Tangent of the edge after the current one, `None` on the last edge
    pub fn view_next_tangent(&self) -> Option<f64> {
        if self.is_last() {
            return None;
        }
        let next = match self.direction {
            CursorDirection::Forward => self.position + 1,
            CursorDirection::Backward => self.position - 1,
        };
        Some(self.feature.edge_at(next).tangent())
    }

    #[inline]
    pub fn bbox(&self) -> &'a BoundingBox {
        self.edge().bbox()
    }

    /// Length of the current edge in feature length units
    #[inline]
    pub fn length(&self) -> f64 {
        self.edge().length()
    }

    /// See [`EdgeRef::lerp_vertex`]
    #[inline]
    pub fn lerp_vertex(&self, o: f64, tolerance: f64) -> Option<Vertex> {
        self.edge().lerp_vertex(o, tolerance)
    }

    #[inline]
    pub fn contains_offset(&self, o: f64) -> bool {
        self.edge().contains_offset(o)
    }
}

impl<T> fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self.edge_first_vertex();
        let last = self.edge_last_vertex();
        write!(
            f,
            "{{{:?} {} [({}, {}); ({}, {})], t: {}}}",
            self.direction,
            self.position,
            first.x,
            first.y,
            last.x,
            last.y,
            self.tangent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_feature() -> Feature<()> {
        Feature::build(
            vec![
                Vertex::new(0.0, 0.0),
                Vertex::new(1.0, 0.0),
                Vertex::new(2.0, 1.0),
                Vertex::new(3.0, 1.0),
            ],
            (),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_walk() {
        let f = create_test_feature();
        let mut c = Cursor::new(&f, CursorDirection::Forward);
        assert_eq!(c.position(), 0);
        assert_eq!(c.steps_remain(), 2);
        assert!(!c.previous());
        assert_eq!(c.edge_first_vertex().x, 0.0);
        assert_eq!(c.edge_last_vertex().x, 1.0);
        assert_eq!(c.view_next_tangent(), Some(f.edge(1).unwrap().tangent()));

        assert!(c.next());
        assert!(c.next());
        assert!(c.is_last());
        assert_eq!(c.view_next_tangent(), None);
        assert!(!c.next());
        assert_eq!(c.position(), 2);
        assert!(c.previous());
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_backward_walk() {
        let f = create_test_feature();
        let mut c = Cursor::new(&f, CursorDirection::Backward);
        assert_eq!(c.position(), 2);
        assert_eq!(c.steps_remain(), 2);
        // ends swap when walking backwards
        assert_eq!(c.edge_first_vertex().x, 3.0);
        assert_eq!(c.edge_last_vertex().x, 2.0);
        assert!(!c.previous());

        assert!(c.next());
        assert_eq!(c.view_next_tangent(), Some(f.edge(0).unwrap().tangent()));
        assert!(c.next());
        assert!(c.is_last());
        assert!(!c.next());
        assert_eq!(c.steps_remain(), 0);

        c.reset();
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn test_from_segment() {
        let f = create_test_feature();
        let segments: Vec<_> = f.segments().collect();
        let last = segments[segments.len() - 1];
        let c = Cursor::from_segment(&last, CursorDirection::Backward);
        assert_eq!(c.position(), last.last_edge_index());
        let c = Cursor::from_segment(&segments[0], CursorDirection::Forward);
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_edge_queries() {
        let f = create_test_feature();
        let mut c = Cursor::new(&f, CursorDirection::Backward);
        c.set_position(1);
        let expected_length = 2.0f64.sqrt();
        assert!((c.length() - expected_length).abs() < 1e-12);
        let mid = (f.vertices()[1].o + f.vertices()[2].o) / 2.0;
        assert!(c.contains_offset(mid));
        let p = c.lerp_vertex(mid, 0.0).unwrap();
        assert!((p.x - 1.5).abs() < 1e-12);
        assert_eq!(*c.bbox(), BoundingBox::new(1.0, 0.0, 2.0, 1.0));

        c.set_position(10);
        assert_eq!(c.position(), 2);
    }
}
