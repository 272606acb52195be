//! Edges and monotonic segments of a feature
//!
//! Both live in flat arrays owned by their [`Feature`]. The public handles
//! [`EdgeRef`] and [`SegmentRef`] are an index plus a borrowed feature, so
//! they are `Copy` and never outlive the geometry they describe.

use crate::bbox::{BoundingBox, IntersectionTest};
use crate::euclid;
use crate::feature::Feature;
use crate::vertex::Vertex;

/// Direction in which tangents evolve along a monotonic segment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TangentOrder {
    Stable,
    Ascending,
    Descending,
}

impl TangentOrder {
    #[inline]
    fn from_delta(dt: f64) -> Self {
        if dt < 0.0 {
            TangentOrder::Descending
        } else if dt > 0.0 {
            TangentOrder::Ascending
        } else {
            TangentOrder::Stable
        }
    }
}

/// Edge storage: box, index of the first vertex, tangent
#[derive(Clone, Debug)]
pub(crate) struct Edge {
    pub(crate) bbox: BoundingBox,
    pub(crate) first: usize,
    pub(crate) tangent: f64,
}

/// Monotonic segment storage: an inclusive run of edges
#[derive(Clone, Debug)]
pub(crate) struct MonotonicSegment {
    pub(crate) bbox: BoundingBox,
    pub(crate) first_edge: usize,
    pub(crate) last_edge: usize,
    pub(crate) tangent_range: [f64; 2],
    pub(crate) order: TangentOrder,
}

/// Derive edges from a vertex array
pub(crate) fn build_edges(vertices: &[Vertex]) -> Vec<Edge> {
    vertices
        .windows(2)
        .enumerate()
        .map(|(first, pair)| Edge {
            bbox: BoundingBox::from_vertices(&pair[0], &pair[1]),
            first,
            tangent: euclid::tangent(&pair[0], &pair[1]),
        })
        .collect()
}

/// Partition edges into maximal monotonic runs
///
/// A run ends where the sign of `dx` or `dy` flips, or where the tangent
/// order reverses. Tangent steps smaller than `tolerance` (measured both
/// from the previous edge and from the run's first edge) count as stable.
pub(crate) fn build_segments(vertices: &[Vertex], edges: &[Edge], tolerance: f64) -> Vec<MonotonicSegment> {
    let mut cuts: Vec<(TangentOrder, usize)> = Vec::new();
    let mut order = TangentOrder::Stable;
    let mut t_start = f64::NAN;
    let mut dx_prev = false;
    let mut dy_prev = false;

    for (i, edge) in edges.iter().enumerate() {
        let t_end = edge.tangent;
        let dx_pos = vertices[i + 1].x - vertices[i].x > 0.0;
        let dy_pos = vertices[i + 1].y - vertices[i].y > 0.0;
        if i == 0 {
            t_start = t_end;
        } else {
            let same_sign = dx_prev == dx_pos && dy_prev == dy_pos;
            let mut dt = t_end - edges[i - 1].tangent;
            let dts = t_end - t_start;
            if dts.abs() < tolerance && dt.abs() < tolerance {
                dt = 0.0;
            }
            let step = TangentOrder::from_delta(dt);
            if !same_sign {
                cuts.push((order, i));
                order = TangentOrder::Stable;
                t_start = t_end;
            } else if step != TangentOrder::Stable {
                if order == TangentOrder::Stable {
                    order = step;
                } else if order != step {
                    cuts.push((order, i));
                    order = TangentOrder::Stable;
                    t_start = t_end;
                }
            }
        }
        dx_prev = dx_pos;
        dy_prev = dy_pos;
    }
    cuts.push((order, edges.len()));

    let mut first_edge = 0;
    cuts.into_iter()
        .map(|(order, end)| {
            let last_edge = end - 1;
            let mut bbox = BoundingBox::empty();
            for edge in &edges[first_edge..end] {
                bbox.extend(&edge.bbox);
            }
            let t1 = edges[first_edge].tangent;
            let t2 = edges[last_edge].tangent;
            let segment = MonotonicSegment {
                bbox,
                first_edge,
                last_edge,
                tangent_range: [t1.min(t2), t1.max(t2)],
                order,
            };
            first_edge = end;
            segment
        })
        .collect()
}

/// Borrowed view of one edge of a feature
pub struct EdgeRef<'a, T> {
    feature: &'a Feature<T>,
    index: usize,
}

impl<T> Clone for EdgeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EdgeRef<'_, T> {}

impl<T> std::fmt::Debug for EdgeRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeRef")
            .field("index", &self.index)
            .field("first", self.first_vertex())
            .field("last", self.last_vertex())
            .field("tangent", &self.tangent())
            .finish()
    }
}

impl<'a, T> EdgeRef<'a, T> {
    #[inline]
    pub(crate) fn new(feature: &'a Feature<T>, index: usize) -> Self {
        Self { feature, index }
    }

    #[inline]
    fn data(&self) -> &'a Edge {
        self.feature.edge_data(self.index)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn feature(&self) -> &'a Feature<T> {
        self.feature
    }

    /// First vertex in digitizing order
    #[inline]
    pub fn first_vertex(&self) -> &'a Vertex {
        &self.feature.vertices()[self.data().first]
    }

    /// Last vertex in digitizing order
    #[inline]
    pub fn last_vertex(&self) -> &'a Vertex {
        &self.feature.vertices()[self.data().first + 1]
    }

    #[inline]
    pub fn tangent(&self) -> f64 {
        self.data().tangent
    }

    /// Edge box, including any tolerance expansion of the feature
    #[inline]
    pub fn bbox(&self) -> &'a BoundingBox {
        &self.data().bbox
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.feature.edge_count()
    }

    /// Planar travel direction, see [`euclid::heading`]
    #[inline]
    pub fn heading(&self) -> f64 {
        euclid::heading(self.first_vertex(), self.last_vertex())
    }

    /// Length in the feature's length units
    #[inline]
    pub fn length(&self) -> f64 {
        self.feature
            .parametric_to_absolute(self.last_vertex().o - self.first_vertex().o)
    }

    /// See [`euclid::lerp_vertex`]
    #[inline]
    pub fn lerp_vertex(&self, o: f64, tolerance: f64) -> Option<Vertex> {
        euclid::lerp_vertex(self.first_vertex(), self.last_vertex(), o, tolerance)
    }

    #[inline]
    pub fn contains_offset(&self, o: f64) -> bool {
        self.first_vertex().o <= o && self.last_vertex().o >= o
    }
}

/// Borrowed view of one monotonic segment of a feature
pub struct SegmentRef<'a, T> {
    feature: &'a Feature<T>,
    index: usize,
}

impl<T> Clone for SegmentRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SegmentRef<'_, T> {}

impl<T> std::fmt::Debug for SegmentRef<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data();
        f.debug_struct("SegmentRef")
            .field("index", &self.index)
            .field("edges", &(data.first_edge..=data.last_edge))
            .field("tangent_range", &data.tangent_range)
            .field("order", &data.order)
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, T> SegmentRef<'a, T> {
    #[inline]
    pub(crate) fn new(feature: &'a Feature<T>, index: usize) -> Self {
        Self { feature, index }
    }

    #[inline]
    fn data(&self) -> &'a MonotonicSegment {
        self.feature.segment_data(self.index)
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn feature(&self) -> &'a Feature<T> {
        self.feature
    }

    #[inline]
    pub fn bbox(&self) -> &'a BoundingBox {
        &self.data().bbox
    }

    /// Index of the first edge within the feature
    #[inline]
    pub fn first_edge_index(&self) -> usize {
        self.data().first_edge
    }

    /// Index of the last edge within the feature
    #[inline]
    pub fn last_edge_index(&self) -> usize {
        self.data().last_edge
    }

    #[inline]
    pub fn first_edge(&self) -> EdgeRef<'a, T> {
        EdgeRef::new(self.feature, self.data().first_edge)
    }

    #[inline]
    pub fn last_edge(&self) -> EdgeRef<'a, T> {
        EdgeRef::new(self.feature, self.data().last_edge)
    }

    /// Edge by position within the segment
    #[inline]
    pub fn edge(&self, i: usize) -> Option<EdgeRef<'a, T>> {
        (i < self.edge_count()).then(|| EdgeRef::new(self.feature, self.data().first_edge + i))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'a, T>> {
        let feature = self.feature;
        let data = self.data();
        (data.first_edge..=data.last_edge).map(move |i| EdgeRef::new(feature, i))
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.data().last_edge - self.data().first_edge + 1
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.edge_count() + 1
    }

    /// Vertex by position within the segment
    #[inline]
    pub fn vertex(&self, i: usize) -> Option<&'a Vertex> {
        if i < self.vertex_count() {
            self.feature.vertices().get(self.data().first_edge + i)
        } else {
            None
        }
    }

    #[inline]
    pub fn first_vertex(&self) -> &'a Vertex {
        self.first_edge().first_vertex()
    }

    #[inline]
    pub fn last_vertex(&self) -> &'a Vertex {
        self.last_edge().last_vertex()
    }

    /// Offset where the segment starts
    #[inline]
    pub fn start_offset(&self) -> f64 {
        self.first_vertex().o
    }

    /// Offset where the segment ends
    #[inline]
    pub fn end_offset(&self) -> f64 {
        self.last_vertex().o
    }

    /// `[min, max]` of the tangents of the segment's end edges
    #[inline]
    pub fn tangent_range(&self) -> [f64; 2] {
        self.data().tangent_range
    }

    #[inline]
    pub fn order(&self) -> TangentOrder {
        self.data().order
    }

    #[inline]
    pub fn contains_offset(&self, o: f64) -> bool {
        self.start_offset() <= o && self.end_offset() >= o
    }

    /// Closest point of the segment to `point`
    ///
    /// Only edges touching `tolerance_box` are considered. Orthogonal
    /// projections are preferred; an edge's first vertex is used when the
    /// projection falls outside it.
    ///
    /// # Returns
    /// The point on the feature with its offset, or `None` if no edge is
    /// within the tolerance box
    pub fn find_projection(&self, point: &Vertex, tolerance_box: &BoundingBox) -> Option<Vertex> {
        let mut min_d = f64::MAX;
        let mut offset = None;
        for edge in self.edges() {
            let first = edge.first_vertex();
            let last = edge.last_vertex();
            if tolerance_box.intersect_status(first, last) == IntersectionTest::Outside {
                continue;
            }
            match euclid::projection_offset_and_distance_sq(first, last, point) {
                Some((o, d)) if d < min_d => {
                    min_d = d;
                    offset = Some(o);
                }
                _ => {
                    if tolerance_box.contains_vertex(first) {
                        let d = first.distance_sq(point);
                        if d < min_d {
                            min_d = d;
                            offset = Some(first.o);
                        }
                    }
                }
            }
        }
        let last = self.last_vertex();
        if tolerance_box.contains_vertex(last) && last.distance_sq(point) < min_d {
            offset = Some(last.o);
        }
        offset.and_then(|o| self.feature.calculate_point(o, 0.0))
    }
}
