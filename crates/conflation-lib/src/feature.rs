//! Polyline feature: vertices, edges and monotonic segments in one arena
//!
//! A [`Feature`] owns its vertex array and the derived edge and segment
//! arrays. Edges and segments are reached through the borrowed handles in
//! [`crate::segment`]. Features are immutable once built; every operation
//! that changes the shape (extract, split, join, reverse, rewind) returns a
//! new feature.

use crate::bbox::BoundingBox;
use crate::input::InputAdapter;
use crate::segment::{self, Edge, EdgeRef, MonotonicSegment, SegmentRef};
use crate::vertex::Vertex;
use crate::{DataError, Result};

/// Tangent tolerance used to cut monotonic segments unless configured otherwise
pub const DEFAULT_SEGMENT_TOLERANCE: f64 = 0.09;

/// Polyline with parametric offsets and a caller-supplied payload
///
/// Invariants upheld by every constructor:
/// - at least two vertices with finite coordinates
/// - offsets are non-decreasing, the first is `0` and the last is `1`
/// - `length > 0`
/// - edges and segments cover the vertex array without gaps
#[derive(Clone, Debug)]
pub struct Feature<T> {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    segments: Vec<MonotonicSegment>,
    bbox: BoundingBox,
    length: f64,
    custom_data: T,
    tolerance: (f64, f64),
    build_tolerance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T> Feature<T> {
    /// Build a feature from raw planar vertices
    ///
    /// Offsets are assigned from cumulative planar distance and the feature
    /// length is the planar length.
    ///
    /// # Arguments
    /// * `vertices` - Shape points in digitizing order; incoming offsets are ignored
    /// * `custom_data` - Payload carried by the feature
    pub fn build(vertices: Vec<Vertex>, custom_data: T) -> Result<Self> {
        Self::build_with_length(vertices, None, custom_data)
    }

    /// Build a feature from raw vertices with an externally measured length
    ///
    /// Offsets are still derived from planar distance; `length_hint`, when
    /// given, replaces the planar length (e.g. a geodesic length in meters).
    pub fn build_with_length(mut vertices: Vec<Vertex>, length_hint: Option<f64>, custom_data: T) -> Result<Self> {
        check_vertices(&vertices)?;

        let mut cumulative = Vec::with_capacity(vertices.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in vertices.windows(2) {
            total += pair[0].distance_sq(&pair[1]).sqrt();
            cumulative.push(total);
        }
        if !(total > 0.0) {
            return Err(DataError::DegenerateGeometry("feature has zero length".to_string()));
        }
        for (v, d) in vertices.iter_mut().zip(cumulative) {
            v.o = d / total;
        }
        if let Some(last) = vertices.last_mut() {
            last.o = 1.0;
        }

        let length = match length_hint {
            Some(l) if l.is_finite() && l > 0.0 => l,
            Some(l) => {
                return Err(DataError::DegenerateGeometry(format!("invalid feature length {l}")));
            }
            None => total,
        };
        Ok(Self::assemble(length, vertices, custom_data, DEFAULT_SEGMENT_TOLERANCE))
    }

    /// Build a feature from any geometry an [`InputAdapter`] understands
    pub fn build_with<G: ?Sized, A: InputAdapter<G>>(adapter: &A, geometry: &G, custom_data: T) -> Result<Self> {
        let (vertices, length) = adapter.convert(geometry)?;
        Self::from_parametrized(length, vertices, custom_data)
    }

    /// Build a feature from vertices whose offsets are already assigned
    ///
    /// # Arguments
    /// * `length` - Feature length in the caller's units
    /// * `vertices` - Shape points with offsets from `0` to `1`
    pub fn from_parametrized(length: f64, vertices: Vec<Vertex>, custom_data: T) -> Result<Self> {
        check_vertices(&vertices)?;
        if !(length.is_finite() && length > 0.0) {
            return Err(DataError::DegenerateGeometry(format!("invalid feature length {length}")));
        }
        let mut previous = f64::NEG_INFINITY;
        for v in &vertices {
            if !v.o.is_finite() || v.o < previous {
                return Err(DataError::InvalidOffset(v.o));
            }
            previous = v.o;
        }
        let first = vertices[0].o;
        let last = vertices[vertices.len() - 1].o;
        if first != 0.0 {
            return Err(DataError::InvalidOffset(first));
        }
        if last != 1.0 {
            return Err(DataError::InvalidOffset(last));
        }
        Ok(Self::assemble(length, vertices, custom_data, DEFAULT_SEGMENT_TOLERANCE))
    }

    fn assemble(length: f64, vertices: Vec<Vertex>, custom_data: T, build_tolerance: f64) -> Self {
        let edges = segment::build_edges(&vertices);
        let segments = segment::build_segments(&vertices, &edges, build_tolerance);
        let mut bbox = BoundingBox::empty();
        for s in &segments {
            bbox.extend(&s.bbox);
        }
        Self {
            vertices,
            edges,
            segments,
            bbox,
            length,
            custom_data,
            tolerance: (0.0, 0.0),
            build_tolerance,
        }
    }

    /// New shape inheriting this feature's segmentation tolerance
    fn derive<U>(&self, length: f64, vertices: Vec<Vertex>, custom_data: U) -> Result<Feature<U>> {
        if vertices.len() < 2 {
            return Err(DataError::TooFewVertices { count: vertices.len() });
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(DataError::DegenerateGeometry(format!("invalid feature length {length}")));
        }
        Ok(Feature::assemble(length, vertices, custom_data, self.build_tolerance))
    }

    /// Re-cut the monotonic segments with another tangent tolerance
    ///
    /// Any tolerance expansion is applied again to the new segments.
    pub fn with_segment_tolerance(self, build_tolerance: f64) -> Self {
        let (dx, dy) = self.tolerance;
        let rebuilt = Self::assemble(self.length, self.vertices, self.custom_data, build_tolerance);
        if dx != 0.0 || dy != 0.0 {
            rebuilt.with_tolerance(dx, dy)
        } else {
            rebuilt
        }
    }

    /// Expand edge, segment and feature boxes by `dx`/`dy`
    ///
    /// Expansions accumulate; [`Feature::tolerance`] reports the total.
    pub fn with_tolerance(mut self, dx: f64, dy: f64) -> Self {
        for e in &mut self.edges {
            e.bbox.surround_by(dx, dy);
        }
        for s in &mut self.segments {
            s.bbox.surround_by(dx, dy);
        }
        self.bbox.surround_by(dx, dy);
        self.tolerance = (self.tolerance.0 + dx, self.tolerance.1 + dy);
        self
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn first_vertex(&self) -> &Vertex {
        &self.vertices[0]
    }

    #[inline]
    pub fn last_vertex(&self) -> &Vertex {
        &self.vertices[self.vertices.len() - 1]
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn edge(&self, i: usize) -> Option<EdgeRef<'_, T>> {
        (i < self.edges.len()).then(|| EdgeRef::new(self, i))
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeRef<'_, T>> {
        (0..self.edges.len()).map(move |i| EdgeRef::new(self, i))
    }

    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn segment(&self, i: usize) -> Option<SegmentRef<'_, T>> {
        (i < self.segments.len()).then(|| SegmentRef::new(self, i))
    }

    pub fn segments(&self) -> impl Iterator<Item = SegmentRef<'_, T>> {
        (0..self.segments.len()).map(move |i| SegmentRef::new(self, i))
    }

    #[inline]
    pub(crate) fn edge_data(&self, i: usize) -> &Edge {
        &self.edges[i]
    }

    #[inline]
    pub(crate) fn segment_data(&self, i: usize) -> &MonotonicSegment {
        &self.segments[i]
    }

    #[inline]
    pub(crate) fn edge_at(&self, i: usize) -> EdgeRef<'_, T> {
        EdgeRef::new(self, i)
    }

    /// Feature box, including any tolerance expansion
    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn custom_data(&self) -> &T {
        &self.custom_data
    }

    /// Accumulated box expansion as `(dx, dy)`
    #[inline]
    pub fn tolerance(&self) -> (f64, f64) {
        self.tolerance
    }

    /// Tangent tolerance the segments were cut with
    #[inline]
    pub fn build_tolerance(&self) -> f64 {
        self.build_tolerance
    }

    /// Whether the first and last vertex coincide
    #[inline]
    pub fn is_ring(&self) -> bool {
        let first = self.first_vertex();
        let last = self.last_vertex();
        first.x == last.x && first.y == last.y
    }

    #[inline]
    pub fn absolute_to_parametric(&self, distance: f64) -> f64 {
        distance / self.length
    }

    #[inline]
    pub fn parametric_to_absolute(&self, o: f64) -> f64 {
        o * self.length
    }

    /// Index of the edge containing offset `o`
    ///
    /// Offsets at or below `0` map to the first edge and offsets at or above
    /// `1` to the last. An offset equal to a vertex offset maps to the edge
    /// starting at that vertex.
    pub fn find_edge(&self, o: f64) -> usize {
        let last = self.edges.len() - 1;
        if o <= 0.0 {
            return 0;
        }
        if o >= 1.0 {
            return last;
        }
        self.vertices[1..].partition_point(|v| v.o <= o).min(last)
    }

    /// Point at offset `o`, snapping to a vertex within `tolerance`
    pub fn calculate_point(&self, o: f64, tolerance: f64) -> Option<Vertex> {
        self.edge_at(self.find_edge(o)).lerp_vertex(o, tolerance)
    }

    /// Vertex nearest to offset `o` along the feature
    pub fn closest_vertex(&self, o: f64) -> Vertex {
        let i = self.find_edge(o);
        let v1 = self.vertices[i];
        let v2 = self.vertices[i + 1];
        if o - v1.o < v2.o - o { v1 } else { v2 }
    }

    /// Planar geometry as a `geo` line string
    pub fn to_line_string(&self) -> geo::LineString<f64> {
        self.vertices.iter().map(Vertex::coord).collect()
    }

    /// Sub-feature between two offsets with another payload
    ///
    /// The offsets are ordered and clamped to `[0, 1]`. Ends within
    /// `tolerance` of an existing vertex snap to it. Offsets of the result
    /// are renormalized to `[0, 1]` and its length is scaled accordingly.
    ///
    /// # Returns
    /// The extracted feature, or [`DataError::EmptyRange`] if the range
    /// collapses to a point
    pub fn extract_with_data<U>(&self, o1: f64, o2: f64, tolerance: f64, custom_data: U) -> Result<Feature<U>> {
        let min = o1.min(o2).max(0.0);
        let max = o1.max(o2).min(1.0);
        if !(max > min) {
            return Err(DataError::EmptyRange { min: o1, max: o2 });
        }
        let pos0 = self.find_edge(min);
        let posn = self.find_edge(max);
        let v0 = self.edge_at(pos0).lerp_vertex(min, tolerance).ok_or(DataError::InvalidOffset(min))?;
        let vn = self.edge_at(posn).lerp_vertex(max, tolerance).ok_or(DataError::InvalidOffset(max))?;
        let l = vn.o - v0.o;
        if !(l > 0.0) {
            return Err(DataError::EmptyRange { min: o1, max: o2 });
        }

        let lerp_start = self.edge_at(pos0).last_vertex().o - v0.o > tolerance;
        let start = if lerp_start { pos0 } else { pos0 + 1 };
        let mut shape = Vec::with_capacity(posn.saturating_sub(start) + 2);
        shape.push(v0.at_offset(0.0));
        for p in start..posn {
            let v = self.edge_at(p).last_vertex();
            if v.o + tolerance >= vn.o {
                break;
            }
            shape.push(v.at_offset((v.o - v0.o) / l));
        }
        shape.push(vn.at_offset(1.0));

        self.derive(self.length * l, shape, custom_data)
    }

    /// Sub-feature between two offsets
    ///
    /// A range covering the whole feature within `tolerance` returns an
    /// unchanged copy.
    pub fn extract(&self, o1: f64, o2: f64, tolerance: f64) -> Result<Self>
    where
        T: Clone,
    {
        let min = o1.min(o2);
        let max = o1.max(o2);
        if min <= tolerance && max >= 1.0 - tolerance {
            return Ok(self.clone());
        }
        self.extract_with_data(o1, o2, tolerance, self.custom_data.clone())
    }

    /// Cut the feature at an interior offset, giving each part its payload
    pub fn split_with_data<U>(&self, o: f64, head_data: U, tail_data: U) -> Result<(Feature<U>, Feature<U>)> {
        if !(o > 0.0 && o < 1.0) {
            return Err(DataError::InvalidOffset(o));
        }
        let e = self.find_edge(o);
        let cut = self.edge_at(e).lerp_vertex(o, 0.0).ok_or(DataError::InvalidOffset(o))?;

        let mut head: Vec<Vertex> = self.vertices[..e].iter().map(|v| v.at_offset(v.o / o)).collect();
        if self.vertices[e].o < o {
            let v = self.vertices[e];
            head.push(v.at_offset(v.o / o));
        }
        head.push(cut.at_offset(1.0));

        let l2 = 1.0 - o;
        let mut tail = Vec::with_capacity(self.vertices.len() - e + 1);
        tail.push(cut.at_offset(0.0));
        tail.extend(self.vertices[e + 1..].iter().map(|v| v.at_offset((v.o - o) / l2)));

        let head = self.derive(self.length * o, head, head_data)?;
        let tail = self.derive(self.length * l2, tail, tail_data)?;
        Ok((head, tail))
    }

    /// Cut the feature at an interior offset
    pub fn split(&self, o: f64) -> Result<(Self, Self)>
    where
        T: Clone,
    {
        self.split_with_data(o, self.custom_data.clone(), self.custom_data.clone())
    }

    /// Concatenate two features
    ///
    /// The tail's first vertex is assumed to coincide with the head's last
    /// vertex and is dropped. Offsets are weighted by the part lengths.
    pub fn join<A, B>(head: &Feature<A>, tail: &Feature<B>, custom_data: T) -> Result<Self> {
        let length = head.length + tail.length;
        let head_factor = head.length / length;
        let tail_factor = tail.length / length;
        let mut shape = Vec::with_capacity(head.vertices.len() + tail.vertices.len() - 1);
        shape.extend(head.vertices.iter().map(|v| v.at_offset(v.o * head_factor)));
        shape.extend(
            tail.vertices[1..]
                .iter()
                .map(|v| v.at_offset(head_factor + v.o * tail_factor)),
        );
        if let Some(last) = shape.last_mut() {
            last.o = 1.0;
        }
        head.derive(length, shape, custom_data)
    }

    /// Same shape travelled the other way, offsets mirrored as `1 - o`
    pub fn reverse(&self) -> Self
    where
        T: Clone,
    {
        let shape = self.vertices.iter().rev().map(|v| v.at_offset(1.0 - v.o)).collect();
        let reversed = Self::assemble(self.length, shape, self.custom_data.clone(), self.build_tolerance);
        let (dx, dy) = self.tolerance;
        if dx != 0.0 || dy != 0.0 {
            reversed.with_tolerance(dx, dy)
        } else {
            reversed
        }
    }

    /// Ring starting and ending at vertex `i`
    ///
    /// # Returns
    /// [`DataError::NotARing`] if the ends do not coincide,
    /// [`DataError::VertexOutOfRange`] if `i` is not a vertex index
    pub fn rewind(&self, i: usize) -> Result<Self>
    where
        T: Clone,
    {
        let last = self.vertices.len() - 1;
        if !self.is_ring() {
            return Err(DataError::NotARing);
        }
        if i > last {
            return Err(DataError::VertexOutOfRange {
                index: i,
                count: self.vertices.len(),
            });
        }
        if i == 0 || i == last {
            return Ok(self.clone());
        }
        let base = self.vertices[i].o;
        let mut shape = vec![Vertex::new(0.0, 0.0); last + 1];
        shape[0] = self.vertices[i].at_offset(0.0);
        shape[last] = self.vertices[i].at_offset(1.0);
        for (j, v) in self.vertices[..last].iter().enumerate() {
            if j < i {
                shape[last - i + j] = v.at_offset(1.0 - base + v.o);
            } else if j > i {
                shape[j - i] = v.at_offset(v.o - base);
            }
        }
        self.derive(self.length, shape, self.custom_data.clone())
    }
}

fn check_vertices(vertices: &[Vertex]) -> Result<()> {
    if vertices.len() < 2 {
        return Err(DataError::TooFewVertices { count: vertices.len() });
    }
    if let Some(index) = vertices.iter().position(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteCoordinate { index });
    }
    Ok(())
}
