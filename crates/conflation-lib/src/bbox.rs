//! Axis-aligned bounding box and segment/box classification
//!
//! [`BoundingBox`] is the single box type used by edges, monotonic segments,
//! features and R-tree nodes. Boxes are small `Copy` values owned by whatever
//! holds them; growing one never affects another.

use crate::feature::Feature;
use crate::range::Range;
use crate::segment::EdgeRef;
use crate::vertex::Vertex;
use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Border crossings of one edge against a box
///
/// A box has four borders, so no edge produces more than four hits.
pub type IntersectionBuffer = SmallVec<[Coord<f64>; 4]>;

/// Classification of an edge against a box
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntersectionTest {
    /// Both edge ends lie inside (or on) the box
    Inside,
    /// The edge does not touch the box
    Outside,
    /// The edge crosses exactly one border
    Intersect,
    /// The edge crosses two or more borders, e.g. when it passes near a corner
    DoubleIntersect,
}

/// 2D axis-aligned bounding box
///
/// The empty box is `(+inf, +inf, -inf, -inf)`; extending it by anything
/// yields that thing's box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl BoundingBox {
    /// The empty sentinel box
    #[inline]
    pub const fn empty() -> Self {
        Self {
            x_min: f64::INFINITY,
            y_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_max: f64::NEG_INFINITY,
        }
    }

    /// Box spanned by two corners given in any order
    #[inline]
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x_min: x1.min(x2),
            y_min: y1.min(y2),
            x_max: x1.max(x2),
            y_max: y1.max(y2),
        }
    }

    /// Box spanned by two vertices
    #[inline]
    pub fn from_vertices(v1: &Vertex, v2: &Vertex) -> Self {
        Self::new(v1.x, v1.y, v2.x, v2.y)
    }

    /// Box of half-size `(dx, dy)` centred on a vertex
    #[inline]
    pub fn around(v: &Vertex, dx: f64, dy: f64) -> Self {
        Self {
            x_min: v.x - dx,
            y_min: v.y - dy,
            x_max: v.x + dx,
            y_max: v.y + dy,
        }
    }

    /// `true` for the empty sentinel (or anything that was never extended)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max
    }

    #[inline]
    pub fn x_min(&self) -> f64 {
        self.x_min
    }

    #[inline]
    pub fn y_min(&self) -> f64 {
        self.y_min
    }

    #[inline]
    pub fn x_max(&self) -> f64 {
        self.x_max
    }

    #[inline]
    pub fn y_max(&self) -> f64 {
        self.y_max
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Grow to include another box
    pub fn extend(&mut self, other: &BoundingBox) -> &mut Self {
        self.x_min = self.x_min.min(other.x_min);
        self.y_min = self.y_min.min(other.y_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_max = self.y_max.max(other.y_max);
        self
    }

    /// Grow to include a point
    pub fn extend_point(&mut self, x: f64, y: f64) -> &mut Self {
        self.x_min = self.x_min.min(x);
        self.y_min = self.y_min.min(y);
        self.x_max = self.x_max.max(x);
        self.y_max = self.y_max.max(y);
        self
    }

    #[inline]
    pub fn extend_vertex(&mut self, v: &Vertex) -> &mut Self {
        self.extend_point(v.x, v.y)
    }

    /// Expand every border outwards by `(dx, dy)`
    pub fn surround_by(&mut self, dx: f64, dy: f64) -> &mut Self {
        self.x_min -= dx;
        self.y_min -= dy;
        self.x_max += dx;
        self.y_max += dy;
        self
    }

    /// Expanded copy, see [`BoundingBox::surround_by`]
    #[inline]
    pub fn surrounded(mut self, dx: f64, dy: f64) -> Self {
        self.surround_by(dx, dy);
        self
    }

    /// Union of two boxes as a new box
    #[inline]
    pub fn union(mut self, other: &BoundingBox) -> Self {
        self.extend(other);
        self
    }

    /// Inclusive overlap test; touching boxes overlap
    #[inline]
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.x_max >= other.x_min
            && self.x_min <= other.x_max
            && self.y_max >= other.y_min
            && self.y_min <= other.y_max
    }

    #[inline]
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x_max >= other.x_max
            && self.x_min <= other.x_min
            && self.y_max >= other.y_max
            && self.y_min <= other.y_min
    }

    #[inline]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.x_max >= x && self.x_min <= x && self.y_max >= y && self.y_min <= y
    }

    #[inline]
    pub fn contains_vertex(&self, v: &Vertex) -> bool {
        self.contains_point(v.x, v.y)
    }

    /// Half-open containment: the max borders are excluded
    #[inline]
    pub fn contains_without_max(&self, v: &Vertex) -> bool {
        self.x_max > v.x && self.x_min <= v.x && self.y_max > v.y && self.y_min <= v.y
    }

    /// Squared distance from a point to the box, zero when inside
    pub fn distance_sq_to_point(&self, x: f64, y: f64) -> f64 {
        let mut ds = 0.0;
        let mut temp = self.x_min - x;
        if temp < 0.0 {
            temp = x - self.x_max;
        }
        if temp > 0.0 {
            ds += temp * temp;
        }
        temp = self.y_min - y;
        if temp < 0.0 {
            temp = y - self.y_max;
        }
        if temp > 0.0 {
            ds += temp * temp;
        }
        ds
    }

    /// Squared gap between two boxes, zero when they overlap
    pub fn distance_sq(&self, other: &BoundingBox) -> f64 {
        let mut ds = 0.0;
        let min = self.x_min.max(other.x_min);
        let max = self.x_max.min(other.x_max);
        if min > max {
            ds += (min - max) * (min - max);
        }
        let min = self.y_min.max(other.y_min);
        let max = self.y_max.min(other.y_max);
        if min > max {
            ds += (min - max) * (min - max);
        }
        ds
    }

    /// Intersection of two boxes, widened by a buffer on each axis
    ///
    /// # Returns
    /// `None` when the (buffered) intersection is empty
    pub fn cross(&self, other: &BoundingBox, buffer_x: f64, buffer_y: f64) -> Option<BoundingBox> {
        let x_min = self.x_min.max(other.x_min) - buffer_x;
        let x_max = self.x_max.min(other.x_max) + buffer_x;
        let y_min = self.y_min.max(other.y_min) - buffer_y;
        let y_max = self.y_max.min(other.y_max) + buffer_y;
        (x_max >= x_min && y_max >= y_min).then_some(BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Degenerate box of zero width and height
    #[inline]
    pub fn is_point(&self) -> bool {
        self.x_min == self.x_max && self.y_min == self.y_max
    }

    #[inline]
    pub fn area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (self.width() * self.height()).abs()
    }

    /// Area growth needed to also cover `other`; zero if already contained
    pub fn enlargement(&self, other: &BoundingBox) -> f64 {
        if self.contains(other) {
            return 0.0;
        }
        self.union(other).area() - self.area()
    }

    /// Classify the edge `p1 -> p2` against this box
    #[inline]
    pub fn intersect_status(&self, p1: &Vertex, p2: &Vertex) -> IntersectionTest {
        let mut hits = IntersectionBuffer::new();
        self.intersect_status_into(p1, p2, &mut hits)
    }

    /// Classify the edge `p1 -> p2` against this box, recording border hits
    ///
    /// `hits` is cleared first. Vertical borders are tested before horizontal
    /// ones, so an edge passing exactly through a corner reports that corner
    /// twice.
    pub fn intersect_status_into(
        &self,
        p1: &Vertex,
        p2: &Vertex,
        hits: &mut IntersectionBuffer,
    ) -> IntersectionTest {
        hits.clear();
        if self.contains_vertex(p1) && self.contains_vertex(p2) {
            return IntersectionTest::Inside;
        }

        let x_min = p1.x.min(p2.x);
        let y_min = p1.y.min(p2.y);
        let x_max = p1.x.max(p2.x);
        let y_max = p1.y.max(p2.y);
        if !(x_min <= self.x_max && x_max >= self.x_min && y_min <= self.y_max && y_max >= self.y_min)
        {
            return IntersectionTest::Outside;
        }

        let dx = p2.x - p1.x;
        let dy = p2.y - p1.y;
        if dx == 0.0 && x_min >= self.x_min && x_max <= self.x_max {
            // vertical
            for border in [self.y_min, self.y_max] {
                if y_min <= border && y_max >= border {
                    hits.push(Coord { x: x_min, y: border });
                }
            }
        } else if dy == 0.0 && y_min >= self.y_min && y_max <= self.y_max {
            // horizontal
            for border in [self.x_min, self.x_max] {
                if x_min <= border && x_max >= border {
                    hits.push(Coord { x: border, y: y_min });
                }
            }
        } else {
            for x_test in [self.x_min, self.x_max] {
                if x_test >= x_min && x_test <= x_max {
                    let y_test = p1.y + (x_test - p1.x) / dx * dy;
                    if y_test >= y_min && y_test <= y_max && y_test >= self.y_min && y_test <= self.y_max
                    {
                        hits.push(Coord {
                            x: x_test,
                            y: y_test,
                        });
                    }
                }
            }
            for y_test in [self.y_min, self.y_max] {
                if y_test >= y_min && y_test <= y_max {
                    let x_test = p1.x + (y_test - p1.y) / dy * dx;
                    if x_test >= x_min && x_test <= x_max && x_test >= self.x_min && x_test <= self.x_max
                    {
                        hits.push(Coord {
                            x: x_test,
                            y: y_test,
                        });
                    }
                }
            }
        }

        match hits.len() {
            0 => IntersectionTest::Outside,
            1 => IntersectionTest::Intersect,
            _ => IntersectionTest::DoubleIntersect,
        }
    }

    /// `true` if the edge is axis-parallel and lies on one of the borders' lines
    pub fn lies_on_border(&self, first: &Vertex, last: &Vertex) -> bool {
        (first.x == last.x && (last.x == self.x_max || last.x == self.x_min))
            || (first.y == last.y && (last.y == self.y_max || last.y == self.y_min))
    }

    /// Border crossings of a feature, ordered by offset along the feature
    ///
    /// Crossings sharing an offset are reported once. An edge running along
    /// a border contributes its last vertex and cancels its first one, so a
    /// run of border edges collapses to the point where it leaves the border.
    pub fn find_intersections<T>(&self, feature: &Feature<T>) -> Vec<Vertex> {
        #[cfg(feature = "profiling")]
        profiling::scope!("bbox::find_intersections");

        let mut res: Vec<Vertex> = Vec::new();
        if self.contains(feature.bbox()) || !self.overlaps(feature.bbox()) {
            return res;
        }

        let mut hits = IntersectionBuffer::new();
        for segment in feature.segments() {
            if self.contains(segment.bbox()) || !self.overlaps(segment.bbox()) {
                continue;
            }
            for edge in segment.edges() {
                let first = edge.first_vertex();
                let last = edge.last_vertex();
                if self.lies_on_border(first, last) {
                    remove_by_offset(&mut res, first.o);
                    insert_by_offset(&mut res, *last);
                    continue;
                }
                match self.intersect_status_into(first, last, &mut hits) {
                    IntersectionTest::Intersect => {
                        insert_by_offset(&mut res, crossing_vertex(&edge, hits[0]));
                    }
                    IntersectionTest::DoubleIntersect => {
                        insert_by_offset(&mut res, crossing_vertex(&edge, hits[0]));
                        // a corner hit is recorded twice, then the third hit is the real exit
                        if hits[0].x != hits[1].x {
                            insert_by_offset(&mut res, crossing_vertex(&edge, hits[1]));
                        } else if let Some(third) = hits.get(2) {
                            insert_by_offset(&mut res, crossing_vertex(&edge, *third));
                        }
                    }
                    IntersectionTest::Inside | IntersectionTest::Outside => {}
                }
            }
        }
        res
    }

    /// Parametric ranges of a feature lying inside this box
    ///
    /// The feature is cut at every border crossing and each piece whose
    /// midpoint falls inside the half-open box is reported.
    pub fn find_parts_in_scope<T>(&self, feature: &Feature<T>) -> Vec<Range> {
        let mut res = Vec::new();
        let mut o = 0.0;
        let push_if_inside = |from: f64, to: f64, res: &mut Vec<Range>| {
            let inside = feature
                .calculate_point(0.5 * (from + to), 0.0)
                .is_some_and(|mid| self.contains_without_max(&mid));
            let range = Range::new(from, to);
            if inside && res.last() != Some(&range) {
                res.push(range);
            }
        };
        for v in self.find_intersections(feature) {
            push_if_inside(o, v.o, &mut res);
            o = v.o;
        }
        push_if_inside(o, 1.0, &mut res);
        res
    }
}

/// Vertex on `edge` at the crossing point, with interpolated offset and elevation
fn crossing_vertex<T>(edge: &EdgeRef<'_, T>, at: Coord<f64>) -> Vertex {
    let first = edge.first_vertex();
    let last = edge.last_vertex();
    let dx = (last.x - first.x).abs();
    let dy = (last.y - first.y).abs();
    let factor = if dx > dy {
        (at.x - first.x).abs() / dx
    } else {
        (at.y - first.y).abs() / dy
    };
    let o = first.o + (last.o - first.o) * factor;
    let z = first.z + (last.z - first.z) * factor;
    Vertex::with_offset(at.x, at.y, z, o)
}

fn insert_by_offset(sorted: &mut Vec<Vertex>, v: Vertex) {
    if let Err(pos) = sorted.binary_search_by(|probe| probe.o.total_cmp(&v.o)) {
        sorted.insert(pos, v);
    }
}

fn remove_by_offset(sorted: &mut Vec<Vertex>, o: f64) {
    if let Ok(pos) = sorted.binary_search_by(|probe| probe.o.total_cmp(&o)) {
        sorted.remove(pos);
    }
}
