//! Parametric ranges and range-to-range references
//!
//! A [`Range`] is an interval of normalized offsets on one feature. A
//! [`RangeReference`] ties a range on its owner to a range on some target,
//! remembering whether both run in the same parametric direction.
//! [`FeatureRangeReference`] is the specialization the matcher produces,
//! with a shared [`Feature`] as target.

use crate::euclid::compare_with_tolerance;
use crate::feature::Feature;
use crate::Result;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interval `[min, max]` of parametric offsets
///
/// Ranges order by ascending `min`, then by descending `max`, so a wider
/// range sorts before the ranges it contains when both start together.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// The whole feature, `[0, 1]`
    pub const FULL: Range = Range { min: 0.0, max: 1.0 };

    /// Range with the bounds taken as given
    #[inline]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range spanning two offsets in any order
    #[inline]
    pub fn ordered(o1: f64, o2: f64) -> Self {
        Self::new(o1.min(o2), o1.max(o2))
    }

    #[inline]
    pub fn min_offset(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max_offset(&self) -> f64 {
        self.max
    }

    /// Ordered and inside `[0, 1]`
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min <= self.max && self.min >= 0.0 && self.max <= 1.0
    }

    /// Same range reordered and clamped into `[0, 1]`
    pub fn clamped(&self) -> Self {
        let r = Self::ordered(self.min, self.max);
        Self::new(r.min.clamp(0.0, 1.0), r.max.clamp(0.0, 1.0))
    }

    #[inline]
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn is_full_range(&self) -> bool {
        self.min == 0.0 && self.max == 1.0
    }

    /// Share of `other` covered by this range, 0 when `other` is empty
    pub fn overlap_factor(&self, other: &Range) -> f64 {
        let size = other.size();
        if size <= 0.0 {
            return 0.0;
        }
        self.intersection(other).size().max(0.0) / size
    }

    pub fn is_matched_by_overlap_factor(&self, other: &Range, threshold: f64) -> bool {
        self.overlap_factor(other) >= threshold
    }

    /// Inclusion test; touching bounds count as inside
    #[inline]
    pub fn contains(&self, other: &Range) -> bool {
        self.min <= other.min && self.max >= other.max
    }

    pub fn contains_with_tolerance(&self, other: &Range, tolerance: f64) -> bool {
        self.min - other.min < tolerance && self.max - other.max > -tolerance
    }

    #[inline]
    pub fn contains_offset(&self, o: f64) -> bool {
        self.min <= o && self.max >= o
    }

    pub fn contains_offset_with_tolerance(&self, o: f64, tolerance: f64) -> bool {
        self.min - tolerance <= o && self.max + tolerance >= o
    }

    pub fn contains_offset_without_touch(&self, o: f64) -> bool {
        self.min < o && self.max > o
    }

    /// Strict overlap; ranges sharing only a bound do not overlap
    pub fn is_overlapped(&self, other: &Range) -> bool {
        self.min.max(other.min) < self.max.min(other.max)
    }

    /// Whether one range ends within `tolerance` of where the other starts
    pub fn is_touched(&self, other: &Range, tolerance: f64) -> bool {
        (self.min - other.max).abs() <= tolerance || (self.max - other.min).abs() <= tolerance
    }

    /// Range of the same size starting at zero
    pub fn aligned_to_zero(&self) -> Self {
        Self::new(0.0, self.size())
    }

    pub fn split(&self, o: f64) -> (Range, Range) {
        (Self::new(self.min, o), Self::new(o, self.max))
    }

    /// Common part of two ranges; `min > max` when they are disjoint
    pub fn intersection(&self, other: &Range) -> Self {
        Self::new(self.min.max(other.min), self.max.min(other.max))
    }

    /// Smallest range covering both
    pub fn union(&self, other: &Range) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Map offset `o` from range `from` into this range
    ///
    /// # Arguments
    /// * `o` - Offset expressed in the same space as `from`
    /// * `from` - Range `o` is measured against
    /// * `same_direction` - Whether both ranges run the same way
    pub fn reproject_from(&self, o: f64, from: &Range, same_direction: bool) -> f64 {
        let factor = self.size() / from.size();
        if same_direction {
            self.min + (o - from.min) * factor
        } else {
            self.max - (o - from.min) * factor
        }
    }

    /// Map an offset of `[0, 1]` into this range
    pub fn reproject_full_range_offset(&self, o: f64, same_direction: bool) -> f64 {
        if same_direction {
            self.min + o * self.size()
        } else {
            self.max - o * self.size()
        }
    }

    /// Ordering with bounds within `tolerance` treated as equal
    pub fn cmp_with_tolerance(&self, other: &Range, tolerance: f64) -> Ordering {
        compare_with_tolerance(self.min, other.min, tolerance)
            .then_with(|| compare_with_tolerance(self.max, other.max, tolerance))
    }
}

impl PartialEq for Range {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Range {}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min
            .total_cmp(&other.min)
            .then_with(|| other.max.total_cmp(&self.max))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Link from a range on an owning entity to a range on a target
#[derive(Clone, Debug)]
pub struct RangeReference<T> {
    range: Range,
    target: T,
    target_range: Range,
    same_direction: bool,
}

impl<T> RangeReference<T> {
    /// # Arguments
    /// * `range` - Range on the owner of the reference
    /// * `target` - Referenced entity
    /// * `target_range` - Range on the target, always stored with `min <= max`
    /// * `same_direction` - Whether the target range runs from min to max
    ///   while the owner range does
    pub fn new(range: Range, target: T, target_range: Range, same_direction: bool) -> Self {
        Self {
            range,
            target,
            target_range,
            same_direction,
        }
    }

    #[inline]
    pub fn range(&self) -> &Range {
        &self.range
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[inline]
    pub fn target_range(&self) -> &Range {
        &self.target_range
    }

    #[inline]
    pub fn is_same_direction(&self) -> bool {
        self.same_direction
    }

    /// Flip the direction flag
    pub fn revert(&mut self) {
        self.same_direction = !self.same_direction;
    }

    /// Offset on the owner corresponding to a target offset
    pub fn target_to_parent(&self, o: f64) -> f64 {
        self.range.reproject_from(o, &self.target_range, self.same_direction)
    }

    /// Offset on the target corresponding to an owner offset
    pub fn parent_to_target(&self, o: f64) -> f64 {
        self.target_range.reproject_from(o, &self.range, self.same_direction)
    }

    /// Cut the target range at a relative offset
    ///
    /// `o` is measured along the reference in `[0, 1]`. The two parts are
    /// returned in the order the owner range travels through them.
    pub fn split_target_range(&self, o: f64) -> (Self, Self)
    where
        T: Clone,
    {
        let os = self.target_range.reproject_from(o, &Range::FULL, self.same_direction);
        let lower = Range::new(self.target_range.min_offset(), os);
        let upper = Range::new(os, self.target_range.max_offset());
        let make = |r: Range| Self::new(self.range, self.target.clone(), r, self.same_direction);
        if self.same_direction {
            (make(lower), make(upper))
        } else {
            (make(upper), make(lower))
        }
    }
}

impl<T: fmt::Display> fmt::Display for RangeReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {} at {}", self.range, self.target, self.target_range)
    }
}

/// Range reference whose target is a shared feature
pub type FeatureRangeReference<T> = RangeReference<Arc<Feature<T>>>;

impl<T> RangeReference<Arc<Feature<T>>> {
    /// Reference covering the whole owner
    pub fn new_full(target: Arc<Feature<T>>, target_range: Range) -> Self {
        Self::new(Range::FULL, target, target_range, true)
    }

    /// Narrow the reference to part of its owner range
    ///
    /// The target range is reprojected from `sub`; ends that land within
    /// `tolerance_meters` of the current target ends snap onto them.
    ///
    /// # Arguments
    /// * `aligned` - Owner range of the new reference
    /// * `sub` - Part of the current owner range to keep
    /// * `tolerance_meters` - Snapping distance in target length units
    pub fn extract_from_source_range(&self, aligned: Range, sub: Range, tolerance_meters: f64) -> Self {
        let tr = self.target_range;
        let mut o0 = tr.reproject_from(sub.min_offset(), &self.range, self.same_direction);
        let mut o1 = tr.reproject_from(sub.max_offset(), &self.range, self.same_direction);
        let tolerance = self.target.absolute_to_parametric(tolerance_meters);
        let (near0, near1) = if self.same_direction {
            (tr.min_offset(), tr.max_offset())
        } else {
            (tr.max_offset(), tr.min_offset())
        };
        if (o0 - near0).abs() < tolerance {
            o0 = near0;
        }
        if (o1 - near1).abs() < tolerance {
            o1 = near1;
        }
        let target_range = if self.same_direction {
            Range::new(o0, o1)
        } else {
            Range::new(o1, o0)
        };
        Self::new(aligned, Arc::clone(&self.target), target_range, self.same_direction)
    }

    /// Target geometry restricted to the target range
    pub fn extract_geometry(&self) -> Result<Feature<T>>
    where
        T: Clone,
    {
        self.target
            .extract(self.target_range.min_offset(), self.target_range.max_offset(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::Vertex;
    use std::collections::BTreeSet;

    fn r(min: f64, max: f64) -> Range {
        Range::new(min, max)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn create_test_target() -> Arc<Feature<&'static str>> {
        // 100 units along x
        Arc::new(Feature::build(vec![Vertex::new(0.0, 0.0), Vertex::new(100.0, 0.0)], "target").unwrap())
    }

    #[test]
    fn test_range_basics() {
        let a = r(0.2, 0.6);
        assert!(a.is_valid());
        assert!(!r(0.6, 0.2).is_valid());
        assert!(!r(-0.1, 0.5).is_valid());
        assert_close(a.size(), 0.4);
        assert!(Range::FULL.is_full_range());
        assert_eq!(r(0.6, 0.2).clamped(), r(0.2, 0.6));
        assert_eq!(r(-0.5, 1.5).clamped(), Range::FULL);
        assert_eq!(Range::ordered(0.9, 0.1), r(0.1, 0.9));
        assert_eq!(format!("{a}"), "[0.2, 0.6]");
    }

    #[test]
    fn test_containment_and_overlap() {
        let a = r(0.2, 0.6);
        assert!(a.contains(&r(0.2, 0.4)));
        assert!(!a.contains(&r(0.1, 0.4)));
        assert!(a.contains_with_tolerance(&r(0.15, 0.4), 0.1));
        assert!(a.contains_offset(0.6));
        assert!(!a.contains_offset_without_touch(0.6));
        assert!(a.contains_offset_with_tolerance(0.65, 0.1));

        assert!(a.is_overlapped(&r(0.5, 0.9)));
        assert!(!a.is_overlapped(&r(0.6, 0.9)));
        assert!(a.is_touched(&r(0.6, 0.9), 0.0));
        assert!(a.is_touched(&r(0.0, 0.19), 0.02));
        assert!(!a.is_touched(&r(0.7, 0.9), 0.05));

        assert_close(a.overlap_factor(&r(0.4, 0.8)), 0.5);
        assert_eq!(a.overlap_factor(&r(0.7, 0.8)), 0.0);

        let b = r(0.25, 0.75);
        assert_eq!(b.overlap_factor(&r(0.5, 1.0)), 0.5);
        assert!(b.is_matched_by_overlap_factor(&r(0.5, 1.0), 0.5));
        assert!(!b.is_matched_by_overlap_factor(&r(0.5, 1.0), 0.6));
    }

    #[test]
    fn test_overlap_factor_of_empty_range() {
        let a = r(0.2, 0.6);
        assert_eq!(a.overlap_factor(&r(0.4, 0.4)), 0.0);
        assert_eq!(a.overlap_factor(&r(0.7, 0.7)), 0.0);
        assert!(!a.is_matched_by_overlap_factor(&r(0.4, 0.4), 0.0001));
    }

    #[test]
    fn test_offset_accessors_on_owned_range() {
        let target = r(0.2, 0.6);
        let (lo, hi) = (target.min_offset(), target.max_offset());
        assert_eq!((lo, hi), (0.2, 0.6));
        assert_eq!(Range::FULL.max_offset(), 1.0);
        // ordering still comes from Ord
        assert_eq!(std::cmp::max(r(0.1, 0.3), r(0.5, 0.7)), r(0.5, 0.7));
        assert_eq!(target.min(r(0.1, 0.9)), r(0.1, 0.9));
    }

    #[test]
    fn test_set_operations() {
        let a = r(0.2, 0.6);
        let b = r(0.4, 0.9);
        assert_eq!(a.intersection(&b), r(0.4, 0.6));
        assert_eq!(a.union(&b), r(0.2, 0.9));
        assert_eq!(a.split(0.3), (r(0.2, 0.3), r(0.3, 0.6)));
        let z = a.aligned_to_zero();
        assert_eq!(z.min_offset(), 0.0);
        assert_close(z.max_offset(), 0.4);
    }

    #[test]
    fn test_ordering() {
        let set: BTreeSet<Range> = [r(0.5, 0.7), r(0.1, 0.3), r(0.1, 0.9), r(0.1, 0.3)].into_iter().collect();
        let ordered: Vec<Range> = set.into_iter().collect();
        assert_eq!(ordered, vec![r(0.1, 0.9), r(0.1, 0.3), r(0.5, 0.7)]);

        assert_eq!(r(0.1, 0.3).cmp_with_tolerance(&r(0.105, 0.295), 0.01), Ordering::Equal);
        assert_eq!(r(0.1, 0.3).cmp_with_tolerance(&r(0.2, 0.3), 0.01), Ordering::Less);
    }

    #[test]
    fn test_reprojection() {
        let target = r(0.2, 0.6);
        assert_close(target.reproject_from(0.5, &Range::FULL, true), 0.4);
        assert_close(target.reproject_from(0.5, &Range::FULL, false), 0.4);
        assert_close(target.reproject_from(0.25, &Range::FULL, false), 0.5);
        assert_close(target.reproject_from(0.5, &r(0.5, 1.0), true), 0.2);
        assert_close(target.reproject_full_range_offset(0.25, true), 0.3);
        assert_close(target.reproject_full_range_offset(0.25, false), 0.5);
    }

    #[test]
    fn test_reference_offsets() {
        let rr = RangeReference::new(r(0.0, 0.5), "x", r(0.5, 1.0), false);
        assert_close(rr.parent_to_target(0.0), 1.0);
        assert_close(rr.parent_to_target(0.5), 0.5);
        assert_close(rr.target_to_parent(0.75), 0.25);

        let mut flipped = rr.clone();
        flipped.revert();
        assert!(flipped.is_same_direction());
        assert_eq!(format!("{rr}"), "[0, 0.5] to x at [0.5, 1]");
    }

    #[test]
    fn test_split_target_range() {
        let rr = RangeReference::new(Range::FULL, 7, r(0.2, 0.6), true);
        let (a, b) = rr.split_target_range(0.25);
        assert_close(a.target_range().max_offset(), 0.3);
        assert_eq!(a.target_range().min_offset(), 0.2);
        assert_close(b.target_range().min_offset(), 0.3);

        let rr = RangeReference::new(Range::FULL, 7, r(0.2, 0.6), false);
        let (a, b) = rr.split_target_range(0.25);
        // travelling backwards, the upper part comes first
        assert_close(a.target_range().min_offset(), 0.5);
        assert_eq!(a.target_range().max_offset(), 0.6);
        assert_close(b.target_range().max_offset(), 0.5);
    }

    #[test]
    fn test_extract_from_source_range() {
        let target = create_test_target();
        let frr = FeatureRangeReference::new(r(0.0, 0.5), Arc::clone(&target), r(0.2, 0.7), true);
        let sub = frr.extract_from_source_range(Range::FULL, r(0.1, 0.3), 0.0);
        assert_eq!(*sub.range(), Range::FULL);
        assert_close(sub.target_range().min_offset(), 0.3);
        assert_close(sub.target_range().max_offset(), 0.5);

        // 0.4 units from the target end snaps with a 1 unit tolerance
        let sub = frr.extract_from_source_range(Range::FULL, r(0.1, 0.496), 1.0);
        assert_eq!(sub.target_range().max_offset(), 0.7);

        let opposite = FeatureRangeReference::new(r(0.0, 0.5), Arc::clone(&target), r(0.2, 0.7), false);
        let sub = opposite.extract_from_source_range(r(0.0, 0.2), r(0.0, 0.2), 0.0);
        assert!(!sub.is_same_direction());
        assert_close(sub.target_range().min_offset(), 0.5);
        assert_close(sub.target_range().max_offset(), 0.7);
    }

    #[test]
    fn test_split_feature_reference_and_geometry() {
        let target = create_test_target();
        let frr = FeatureRangeReference::new_full(Arc::clone(&target), r(0.2, 0.6));
        let (a, b) = frr.split_target_range(0.5);
        assert_close(a.target_range().max_offset(), 0.4);
        assert_close(b.target_range().min_offset(), 0.4);

        let geometry = frr.extract_geometry().unwrap();
        assert_close(geometry.length(), 40.0);
        assert_close(geometry.first_vertex().x, 20.0);
        assert_close(geometry.last_vertex().x, 60.0);
        assert_eq!(*geometry.custom_data(), "target");
    }
}
