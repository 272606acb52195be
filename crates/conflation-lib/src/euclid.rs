//! Planar geometry: tangents, interpolation, projections and intersections
//!
//! Every function here is pure. Tolerance-sensitive comparisons take the
//! tolerance as an explicit argument; nothing relies on a hidden epsilon.
//! Degenerate inputs (parallel edges, zero-length edges, projections falling
//! outside an edge) produce `None`.

use crate::bbox::BoundingBox;
use crate::feature::Feature;
use crate::segment::SegmentRef;
use crate::vertex::Vertex;
use geo::Coord;
use std::cmp::Ordering;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Crossing of two edges, as a vertex on each of them
///
/// Both vertices share coordinates; offsets and elevation are interpolated
/// along their own edge.
pub type Crossing = (Vertex, Vertex);

#[inline]
pub fn same_with_tolerance(v1: f64, v2: f64, tolerance: f64) -> bool {
    (v2 - v1).abs() <= tolerance
}

/// Three-way comparison treating values within `tolerance` as equal
#[inline]
pub fn compare_with_tolerance(d1: f64, d2: f64, tolerance: f64) -> Ordering {
    let d = d1 - d2;
    if tolerance >= d.abs() {
        Ordering::Equal
    } else if d > 0.0 {
        Ordering::Greater
    } else {
        Ordering::Less
    }
}

/// Tangent angle of the edge `v1 -> v2`, in `(-pi/2, pi/2]`
///
/// Measured from the y axis as `atan(dx / dy)`; edges with `dy == 0` map to
/// `pi/2`. Opposite edges share a tangent.
#[inline]
pub fn tangent(v1: &Vertex, v2: &Vertex) -> f64 {
    let dx = v2.x - v1.x;
    let dy = v2.y - v1.y;
    if dy != 0.0 { (dx / dy).atan() } else { FRAC_PI_2 }
}

/// Angular difference of two tangents, aware of the `pi` period
#[inline]
pub fn tangent_diff(t1: f64, t2: f64) -> f64 {
    let d = (t1 - t2).abs();
    d.min((d - PI).abs())
}

#[inline]
pub fn compare_tangent_with_tolerance(t1: f64, t2: f64, tolerance: f64) -> Ordering {
    if tangent_diff(t1, t2) <= tolerance {
        Ordering::Equal
    } else {
        t1.total_cmp(&t2)
    }
}

/// Overlap test for two `[min, max]` tangent ranges
///
/// Tangents wrap at `+-pi/2`, so a range ending near `pi/2` also overlaps
/// one starting near `-pi/2`.
pub fn tangent_ranges_overlap(r1: [f64; 2], r2: [f64; 2], tolerance: f64) -> bool {
    let d1 = r1[0].max(r2[0]);
    let d2 = r1[1].min(r2[1]);
    if d2 >= d1 || (d1 - d2) <= tolerance {
        return true;
    }
    (r1[1] > FRAC_PI_2 - tolerance && r2[0] < -FRAC_PI_2 + tolerance)
        || (r2[1] > FRAC_PI_2 - tolerance && r1[0] < -FRAC_PI_2 + tolerance)
}

/// Travel direction of the edge `v1 -> v2` as `atan2(dy, dx)`
#[inline]
pub fn heading(v1: &Vertex, v2: &Vertex) -> f64 {
    (v2.y - v1.y).atan2(v2.x - v1.x)
}

/// Wrap an angle into `[-pi, pi]`
#[inline]
pub fn normalize_angle(a: f64) -> f64 {
    let r = a.rem_euclid(TAU);
    if r > PI { r - TAU } else { r }
}

/// Vertex at offset `o` on the edge `v1 -> v2`
///
/// An existing vertex is returned when `o` is within `tolerance` of its
/// offset. Otherwise the point is interpolated, provided `o` lies between
/// the edge's offsets.
pub fn lerp_vertex(v1: &Vertex, v2: &Vertex, o: f64, tolerance: f64) -> Option<Vertex> {
    if same_with_tolerance(v1.o, o, tolerance) {
        return Some(*v1);
    }
    if same_with_tolerance(v2.o, o, tolerance) {
        return Some(*v2);
    }
    if o < v1.o || o > v2.o {
        return None;
    }
    let factor = (o - v1.o) / (v2.o - v1.o);
    Some(Vertex::with_offset(
        v1.x + (v2.x - v1.x) * factor,
        v1.y + (v2.y - v1.y) * factor,
        v1.z + (v2.z - v1.z) * factor,
        o,
    ))
}

/// Linear interpolation of a value attached to two offsets
#[inline]
pub fn lerp_value(val1: f64, o1: f64, val2: f64, o2: f64, o0: f64) -> f64 {
    let factor = (o0 - o1) / (o2 - o1);
    val1 + (val2 - val1) * factor
}

/// Clamp into the interval spanned by `bound1` and `bound2`, in either order
pub fn clamp_between(value: f64, bound1: f64, bound2: f64) -> f64 {
    if bound2 > bound1 {
        value.clamp(bound1, bound2)
    } else if value < bound2 {
        bound2
    } else if value > bound1 {
        bound1
    } else {
        value
    }
}

/// Offset of the point `(x, y)` lying on the edge `v1 -> v2`
///
/// The position is measured along the dominant axis and clamped to the
/// edge's offsets to absorb rounding.
pub fn calc_offset(v1: &Vertex, v2: &Vertex, x: f64, y: f64) -> f64 {
    let dx = v2.x - v1.x;
    let dy = v2.y - v1.y;
    if dx == 0.0 && dy == 0.0 {
        return v1.o;
    }
    let factor = if dx.abs() > dy.abs() {
        (x - v1.x) / dx
    } else {
        (y - v1.y) / dy
    };
    clamp_between(v1.o + (v2.o - v1.o) * factor, v1.o, v2.o)
}

/// Orthogonal projection of `p` onto the edge `v1 -> v2`
///
/// # Returns
/// `None` unless the projection parameter lies in `[0, 1]`
pub fn projection_point(v1: &Vertex, v2: &Vertex, p: &Vertex) -> Option<Coord<f64>> {
    let dx = v2.x - v1.x;
    let dy = v2.y - v1.y;
    let u = ((p.x - v1.x) * dx + (p.y - v1.y) * dy) / (dx * dx + dy * dy);
    (0.0..=1.0).contains(&u).then(|| Coord {
        x: v1.x + u * dx,
        y: v1.y + u * dy,
    })
}

/// Projection of `p` onto the edge as `(offset, squared distance)`
pub fn projection_offset_and_distance_sq(v1: &Vertex, v2: &Vertex, p: &Vertex) -> Option<(f64, f64)> {
    let xy = projection_point(v1, v2, p)?;
    let dx = (v2.x - v1.x).abs();
    let dy = (v2.y - v1.y).abs();
    let factor = if dx > dy {
        (xy.x - v1.x).abs() / dx
    } else {
        (xy.y - v1.y).abs() / dy
    };
    let o = v1.o + (v2.o - v1.o) * factor;
    Some((o, distance_sq(xy, p)))
}

/// Squared planar distance between a coordinate and a vertex
#[inline]
pub fn distance_sq(c: Coord<f64>, v: &Vertex) -> f64 {
    let dx = v.x - c.x;
    let dy = v.y - c.y;
    dx * dx + dy * dy
}

/// Squared distance from `(x, y)` to the infinite line through two points
pub fn distance_to_line_sq(x1: f64, y1: f64, x2: f64, y2: f64, x: f64, y: f64) -> f64 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    let le = dy * (x - x1) - (y - y1) * dx;
    le * le / (dx * dx + dy * dy)
}

/// Unsigned area enclosed by a ring feature (shoelace formula)
pub fn polygon_area<T>(ring: &Feature<T>) -> f64 {
    let shape = ring.vertices();
    let mut res = 0.0;
    for (i, v2) in shape.iter().enumerate() {
        let v1 = if i > 0 { &shape[i - 1] } else { &shape[shape.len() - 1] };
        res += (v1.x - v2.x) * (v1.y + v2.y);
    }
    res.abs() / 2.0
}

/// Ray-casting point-in-ring test
pub fn ring_contains<T>(ring: &Feature<T>, point: &Vertex) -> bool {
    let mut counter = 0usize;
    for segment in ring.segments() {
        let sb = segment.bbox();
        if !(sb.x_max() > point.x && sb.y_max() > point.y && sb.y_min() <= point.y) {
            continue;
        }
        for edge in segment.edges() {
            let first = edge.first_vertex();
            let last = edge.last_vertex();
            let eb = BoundingBox::from_vertices(first, last);
            if eb.x_max() > point.x && eb.y_max() > point.y && eb.y_min() <= point.y {
                let delta = *last - *first;
                if delta.y != 0.0 {
                    let x = last.x - (last.y - point.y) * delta.x / delta.y;
                    if x > point.x {
                        counter += 1;
                    }
                } else {
                    counter += 1;
                }
            }
        }
    }
    counter % 2 != 0
}

/// Crossing point of the edges `a0 -> a1` and `b0 -> b1`
///
/// Solved with the 2x2 determinant. Touching at an end counts as a crossing.
///
/// # Returns
/// `None` for parallel edges (zero determinant) or when the crossing lies
/// outside either edge
pub fn edges_intersection(a0: &Vertex, a1: &Vertex, b0: &Vertex, b1: &Vertex) -> Option<Crossing> {
    let s10_x = a1.x - a0.x;
    let s10_y = a1.y - a0.y;
    let s32_x = b1.x - b0.x;
    let s32_y = b1.y - b0.y;
    let denom = s10_x * s32_y - s32_x * s10_y;
    if denom == 0.0 {
        return None;
    }

    let denom_positive = denom > 0.0;
    let s02_x = a0.x - b0.x;
    let s02_y = a0.y - b0.y;
    let s_numer = s10_x * s02_y - s10_y * s02_x;
    if (s_numer < 0.0) == denom_positive {
        return None;
    }

    let t_numer = s32_x * s02_y - s32_y * s02_x;
    if (t_numer < 0.0) == denom_positive
        || (s_numer > denom) == denom_positive
        || (t_numer > denom) == denom_positive
    {
        return None;
    }

    let t = t_numer / denom;
    let x = a0.x + t * s10_x;
    let y = a0.y + t * s10_y;
    let oa = calc_offset(a0, a1, x, y);
    let ob = calc_offset(b0, b1, x, y);
    Some((
        Vertex::with_offset(x, y, lerp_value(a0.z, a0.o, a1.z, a1.o, oa), oa),
        Vertex::with_offset(x, y, lerp_value(b0.z, b0.o, b1.z, b1.o, ob), ob),
    ))
}

/// First crossing found between two monotonic segments
pub fn segments_intersection<A, B>(sa: &SegmentRef<'_, A>, sb: &SegmentRef<'_, B>) -> Option<Crossing> {
    let cross = sa.bbox().cross(sb.bbox(), 0.0, 0.0)?;
    for ea in sa.edges() {
        if !ea.bbox().overlaps(&cross) {
            continue;
        }
        for eb in sb.edges() {
            if eb.bbox().overlaps(&cross) && eb.bbox().overlaps(ea.bbox()) {
                let found = edges_intersection(
                    ea.first_vertex(),
                    ea.last_vertex(),
                    eb.first_vertex(),
                    eb.last_vertex(),
                );
                if found.is_some() {
                    return found;
                }
            }
        }
    }
    None
}

/// Crossings between two features, at most one per pair of monotonic segments
pub fn intersections<A, B>(a: &Feature<A>, b: &Feature<B>) -> Vec<Crossing> {
    #[cfg(feature = "profiling")]
    profiling::scope!("euclid::intersections");

    let Some(scope) = a.bbox().cross(b.bbox(), 0.0, 0.0) else {
        return Vec::new();
    };
    let candidates: Vec<_> = b
        .segments()
        .filter(|sb| scope.overlaps(sb.bbox()))
        .collect();
    a.segments()
        .filter(|sa| scope.overlaps(sa.bbox()))
        .flat_map(|sa| {
            candidates
                .iter()
                .filter_map(move |sb| segments_intersection(&sa, sb))
        })
        .collect()
}

/// Crossings of a feature with itself
///
/// Adjacent monotonic segments cannot cross each other and are skipped.
pub fn self_intersections<T>(feature: &Feature<T>) -> Vec<Crossing> {
    let segments: Vec<_> = feature.segments().collect();
    let mut res = Vec::new();
    for (i, sa) in segments.iter().enumerate() {
        for sb in segments.iter().skip(i + 2) {
            if sa.bbox().overlaps(sb.bbox()) {
                res.extend(segments_intersection(sa, sb));
            }
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64, y: f64) -> Vertex {
        Vertex::new(x, y)
    }

    fn vo(x: f64, y: f64, o: f64) -> Vertex {
        Vertex::with_offset(x, y, 0.0, o)
    }

    #[test]
    fn test_tangent() {
        assert_eq!(tangent(&v(0.0, 0.0), &v(1.0, 0.0)), FRAC_PI_2);
        assert_eq!(tangent(&v(0.0, 0.0), &v(0.0, 1.0)), 0.0);
        assert!((tangent(&v(0.0, 0.0), &v(1.0, 1.0)) - PI / 4.0).abs() < 1e-12);
        // opposite edges share a tangent
        assert_eq!(tangent(&v(0.0, 0.0), &v(1.0, 2.0)), tangent(&v(1.0, 2.0), &v(0.0, 0.0)));
    }

    #[test]
    fn test_tangent_diff_wraps() {
        assert!((tangent_diff(FRAC_PI_2 - 0.01, -FRAC_PI_2 + 0.01) - 0.02).abs() < 1e-12);
        assert!((tangent_diff(0.1, -0.1) - 0.2).abs() < 1e-12);
        assert_eq!(compare_tangent_with_tolerance(0.1, 0.15, 0.09), Ordering::Equal);
        assert_eq!(compare_tangent_with_tolerance(0.5, 0.1, 0.09), Ordering::Greater);
    }

    #[test]
    fn test_compare_with_tolerance() {
        assert_eq!(compare_with_tolerance(1.0, 1.05, 0.1), Ordering::Equal);
        assert_eq!(compare_with_tolerance(1.0, 1.5, 0.1), Ordering::Less);
        assert_eq!(compare_with_tolerance(2.0, 1.5, 0.1), Ordering::Greater);
    }

    #[test]
    fn test_tangent_ranges_overlap() {
        assert!(tangent_ranges_overlap([0.0, 0.5], [0.4, 1.0], 0.0));
        assert!(tangent_ranges_overlap([0.0, 0.5], [0.55, 1.0], 0.09));
        assert!(!tangent_ranges_overlap([0.0, 0.5], [0.7, 1.0], 0.09));
        // across +-pi/2
        assert!(tangent_ranges_overlap([1.0, FRAC_PI_2], [-FRAC_PI_2 + 0.01, -1.0], 0.09));
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI / 2.0) + FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(-3.0 * PI / 2.0) - FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_vertex() {
        let a = vo(0.0, 0.0, 0.0);
        let b = vo(10.0, 0.0, 1.0);
        let m = lerp_vertex(&a, &b, 0.5, 0.0).unwrap();
        assert!((m.x - 5.0).abs() < 1e-12);
        assert_eq!(m.o, 0.5);
        // snaps to an existing vertex within tolerance
        assert_eq!(lerp_vertex(&a, &b, 0.99, 0.02).unwrap().x, 10.0);
        assert!(lerp_vertex(&a, &b, 1.5, 0.0).is_none());
    }

    #[test]
    fn test_calc_offset_clamps() {
        let a = vo(0.0, 0.0, 0.2);
        let b = vo(10.0, 1.0, 0.4);
        assert!((calc_offset(&a, &b, 5.0, 0.5) - 0.3).abs() < 1e-12);
        assert_eq!(calc_offset(&a, &b, 20.0, 2.0), 0.4);
        // reversed bounds
        assert_eq!(clamp_between(0.5, 0.4, 0.2), 0.4);
        assert_eq!(clamp_between(0.1, 0.4, 0.2), 0.2);
        assert_eq!(clamp_between(0.3, 0.4, 0.2), 0.3);
    }

    #[test]
    fn test_projection() {
        let a = vo(0.0, 0.0, 0.0);
        let b = vo(10.0, 0.0, 1.0);
        let p = projection_point(&a, &b, &v(3.0, 2.0)).unwrap();
        assert_eq!((p.x, p.y), (3.0, 0.0));
        assert!(projection_point(&a, &b, &v(-1.0, 2.0)).is_none());
        assert!(projection_point(&a, &a, &v(1.0, 1.0)).is_none());

        let (o, d) = projection_offset_and_distance_sq(&a, &b, &v(3.0, 2.0)).unwrap();
        assert!((o - 0.3).abs() < 1e-12);
        assert!((d - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_distance_to_line() {
        assert!((distance_to_line_sq(0.0, 0.0, 10.0, 0.0, 5.0, 3.0) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_edges_intersection() {
        let (on_a, on_b) = edges_intersection(
            &vo(0.0, 0.0, 0.0),
            &vo(10.0, 10.0, 1.0),
            &vo(0.0, 10.0, 0.0),
            &vo(10.0, 0.0, 1.0),
        )
        .unwrap();
        assert!((on_a.x - 5.0).abs() < 1e-12 && (on_a.y - 5.0).abs() < 1e-12);
        assert!((on_a.o - 0.5).abs() < 1e-12);
        assert!((on_b.o - 0.5).abs() < 1e-12);

        // parallel
        assert!(
            edges_intersection(&v(0.0, 0.0), &v(1.0, 0.0), &v(0.0, 1.0), &v(1.0, 1.0)).is_none()
        );
        // out of range
        assert!(
            edges_intersection(&v(0.0, 0.0), &v(1.0, 1.0), &v(3.0, 0.0), &v(2.0, 1.0)).is_none()
        );
    }

    #[test]
    fn test_intersections_between_features() {
        let a = Feature::build(vec![v(0.0, 0.0), v(10.0, 0.0)], 1).unwrap();
        let b = Feature::build(vec![v(2.0, -1.0), v(2.0, 1.0), v(6.0, 1.0), v(6.0, -1.0)], 2).unwrap();
        let found = intersections(&a, &b);
        assert_eq!(found.len(), 2);
        let mut xs: Vec<f64> = found.iter().map(|(on_a, _)| on_a.x).collect();
        xs.sort_by(f64::total_cmp);
        assert!((xs[0] - 2.0).abs() < 1e-12);
        assert!((xs[1] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_self_intersections() {
        let f = Feature::build(
            vec![v(0.0, 0.0), v(10.0, 0.0), v(10.0, 10.0), v(5.0, 10.0), v(5.0, -5.0)],
            1,
        )
        .unwrap();
        let found = self_intersections(&f);
        assert_eq!(found.len(), 1);
        let (p, q) = found[0];
        assert!((p.x - 5.0).abs() < 1e-12 && p.y.abs() < 1e-12);
        assert!(p.o < q.o);

        let straight = Feature::build(vec![v(0.0, 0.0), v(1.0, 1.0), v(2.0, 3.0)], 1).unwrap();
        assert!(self_intersections(&straight).is_empty());
    }

    #[test]
    fn test_ring_contains_and_area() {
        let ring = Feature::build(
            vec![v(0.0, 0.0), v(4.0, 0.0), v(4.0, 3.0), v(0.0, 3.0), v(0.0, 0.0)],
            1,
        )
        .unwrap();
        assert!(ring_contains(&ring, &v(2.0, 1.0)));
        assert!(!ring_contains(&ring, &v(5.0, 1.0)));
        assert!(!ring_contains(&ring, &v(2.0, 4.0)));
        assert!((polygon_area(&ring) - 12.0).abs() < 1e-12);
    }
}
