//! Matcher - indexed candidate features and the per-feature matching loop
//!
//! Candidate features are cut into monotonic segments and stored in an
//! [`RTree`]. Matching a source feature queries the tree segment by segment,
//! pairs the source segment with every candidate segment it could run along
//! and keeps the widest non-redundant ranges per candidate feature.

use crate::bbox::BoundingBox;
use crate::euclid;
use crate::feature::{Feature, DEFAULT_SEGMENT_TOLERANCE};
use crate::pair::sync_edges_and_match_first_point;
use crate::range::{FeatureRangeReference, Range};
use crate::rtree::{IndexItem, RTree, MIN_CHILDREN};
use crate::segment::SegmentRef;
use crate::utils;
use crate::vertex::Vertex;
use crate::{DataError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tolerances and index settings for matching
///
/// Distances are in the features' coordinate units unless noted. The
/// defaults suit WGS84 degrees at mid latitudes, where 6e-6 degrees is
/// roughly half a meter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Largest tangent difference, in radians, between edges walked together
    /// Default: 0.09
    pub tangent_tolerance: f64,
    /// Largest angle between two edges for their features to be considered parallel
    /// Default: 0.08
    pub heading_tolerance: f64,
    /// Tolerance along x (longitude)
    /// Default: 6e-6
    pub x_tolerance: f64,
    /// Tolerance along y (latitude)
    /// Default: 6e-6
    pub y_tolerance: f64,
    /// Matches shorter than this, in source length units, are dropped
    /// Default: 0.2
    pub min_shared_length: f64,
    /// Matched ranges must be longer than this many length units on both sides
    /// Default: 0.01
    pub range_tolerance_meters: f64,
    /// Fan-out of the segment index
    /// Default: 3
    pub max_children_per_node: usize,
    /// Tangent tolerance used to cut features into monotonic segments
    /// Default: 0.09
    pub segment_build_tolerance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Default for Config {
    fn default() -> Self {
        Self {
            tangent_tolerance: 0.09,
            heading_tolerance: 0.08,
            x_tolerance: 6e-6,
            y_tolerance: 6e-6,
            min_shared_length: 0.2,
            range_tolerance_meters: 0.01,
            max_children_per_node: 3,
            segment_build_tolerance: DEFAULT_SEGMENT_TOLERANCE,
        }
    }
}

impl Config {
    /// Squared distance under which two points coincide
    #[inline]
    pub fn distance_square_tolerance(&self) -> f64 {
        0.5 * (self.x_tolerance * self.x_tolerance + self.y_tolerance * self.y_tolerance)
    }

    /// Replace the x/y tolerances with degree deltas covering `meters` around a scope center
    ///
    /// # Arguments
    /// * `center_x` - Longitude of the scope center
    /// * `center_y` - Latitude of the scope center
    /// * `meters` - Tolerance in meters
    pub fn with_metric_tolerance(mut self, center_x: f64, center_y: f64, meters: f64) -> Self {
        let (dx, dy) = utils::degree_tolerance(center_x, center_y, meters);
        self.x_tolerance = dx;
        self.y_tolerance = dy;
        self
    }

    /// Reject negative or non-finite tolerances and unusable fan-outs
    pub fn validate(&self) -> Result<()> {
        let tolerances = [
            ("tangent_tolerance", self.tangent_tolerance),
            ("heading_tolerance", self.heading_tolerance),
            ("x_tolerance", self.x_tolerance),
            ("y_tolerance", self.y_tolerance),
            ("min_shared_length", self.min_shared_length),
            ("range_tolerance_meters", self.range_tolerance_meters),
            ("segment_build_tolerance", self.segment_build_tolerance),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(DataError::InvalidConfig(format!("{name} must be finite and >= 0, got {value}")));
            }
        }
        if self.max_children_per_node < MIN_CHILDREN {
            return Err(DataError::InvalidConfig(format!(
                "max_children_per_node must be at least {MIN_CHILDREN}, got {}",
                self.max_children_per_node
            )));
        }
        Ok(())
    }
}

/// Index entry: one monotonic segment of a shared feature
#[derive(Debug)]
pub struct SegmentOfFeature<T> {
    feature: Arc<Feature<T>>,
    index: usize,
}

impl<T> Clone for SegmentOfFeature<T> {
    fn clone(&self) -> Self {
        Self {
            feature: Arc::clone(&self.feature),
            index: self.index,
        }
    }
}

impl<T> SegmentOfFeature<T> {
    /// # Arguments
    /// * `index` - Must be below the feature's segment count
    pub fn new(feature: Arc<Feature<T>>, index: usize) -> Self {
        debug_assert!(index < feature.segment_count());
        Self { feature, index }
    }

    #[inline]
    pub fn feature(&self) -> &Arc<Feature<T>> {
        &self.feature
    }

    #[inline]
    pub fn segment(&self) -> SegmentRef<'_, T> {
        SegmentRef::new(&self.feature, self.index)
    }
}

impl<T> IndexItem for SegmentOfFeature<T> {
    fn bbox(&self) -> BoundingBox {
        *self.segment().bbox()
    }
}

/// Matches of one source feature: source range to target references
pub type FeatureMatches<T> = BTreeMap<Range, Vec<FeatureRangeReference<T>>>;

/// Projections of one query point onto indexed features
#[derive(Debug, Clone)]
pub struct PointProjectionReferences<T> {
    /// The query point
    pub point: Vertex,
    /// Closest point on each nearby segment with the feature it lies on
    pub projections: Vec<(Vertex, Arc<Feature<T>>)>,
}

/// Accepted references of one candidate feature keyed by source range
type Distribution<T> = BTreeMap<Range, FeatureRangeReference<T>>;

/// Segment index over candidate features plus the matching configuration
///
/// `T` identifies an indexed feature: two indexed features must not share
/// custom data. Sources come from another dataset and may reuse it.
pub struct Matcher<T> {
    index: RTree<SegmentOfFeature<T>>,
    features: Vec<Arc<Feature<T>>>,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<T: Ord + Clone> Matcher<T> {
    /// Create an empty matcher
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index: RTree::new(config.max_children_per_node),
            features: Vec::new(),
            config,
        })
    }

    /// Create a matcher and index every feature of `scope`
    pub fn build<I>(scope: I, config: Config) -> Result<Self>
    where
        I: IntoIterator<Item = Feature<T>>,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("matcher::build");

        let mut matcher = Self::new(config)?;
        for feature in scope {
            matcher.insert(feature);
        }
        tracing::debug!(
            features = matcher.features.len(),
            segments = matcher.index.len(),
            depth = matcher.index.depth(),
            "matcher index built"
        );
        Ok(matcher)
    }

    /// Index a candidate feature
    ///
    /// The feature is re-segmented with the configured build tolerance if
    /// needed and its boxes are widened by the x/y tolerances.
    ///
    /// # Returns
    /// The shared handle now referenced by the index
    pub fn insert(&mut self, feature: Feature<T>) -> Arc<Feature<T>> {
        let feature = Arc::new(self.prepare(feature));
        for index in 0..feature.segment_count() {
            self.index.insert(SegmentOfFeature::new(Arc::clone(&feature), index));
        }
        self.features.push(Arc::clone(&feature));
        feature
    }

    fn needs_preparation(&self, feature: &Feature<T>) -> bool {
        feature.build_tolerance() != self.config.segment_build_tolerance || feature.tolerance() == (0.0, 0.0)
    }

    fn prepare(&self, feature: Feature<T>) -> Feature<T> {
        let feature = if feature.build_tolerance() != self.config.segment_build_tolerance {
            feature.with_segment_tolerance(self.config.segment_build_tolerance)
        } else {
            feature
        };
        if feature.tolerance() == (0.0, 0.0) {
            feature.with_tolerance(self.config.x_tolerance, self.config.y_tolerance)
        } else {
            feature
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of indexed features
    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Indexed features in insertion order
    #[inline]
    pub fn features(&self) -> &[Arc<Feature<T>>] {
        &self.features
    }

    #[inline]
    pub fn index(&self) -> &RTree<SegmentOfFeature<T>> {
        &self.index
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.features.clear();
    }

    /// Match every source feature against the index
    ///
    /// # Returns
    /// Matched references per source custom data; sources without any match
    /// are left out
    pub fn match_features<'s, I>(&self, sources: I) -> BTreeMap<T, Vec<FeatureRangeReference<T>>>
    where
        I: IntoIterator<Item = &'s Feature<T>>,
        T: 's,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("matcher::match_features");

        let mut result = BTreeMap::new();
        for source in sources {
            let references: Vec<_> = self.match_feature(source).into_values().flatten().collect();
            if !references.is_empty() {
                result.insert(source.custom_data().clone(), references);
            }
        }
        result
    }

    /// Find the ranges of indexed features running along `source`
    ///
    /// Candidates are visited per target feature in order of their start
    /// offsets. Before moving on to the next target, the ranges found so far
    /// are flushed into that target's coverage, dropping those inside an
    /// already kept range.
    ///
    /// # Returns
    /// Source ranges mapped to the target references covering them
    pub fn match_feature(&self, source: &Feature<T>) -> FeatureMatches<T> {
        #[cfg(feature = "profiling")]
        profiling::scope!("matcher::match_feature");

        let prepared;
        let source = if self.needs_preparation(source) {
            prepared = self.prepare(source.clone());
            &prepared
        } else {
            source
        };

        let mut coverage: BTreeMap<T, Distribution<T>> = BTreeMap::new();
        let mut matched_ranges: BTreeMap<T, FeatureRangeReference<T>> = BTreeMap::new();
        let mut distribution: Distribution<T> = BTreeMap::new();
        let mut current: Option<&T> = None;

        for segment in source.segments() {
            let mut candidates = self.index.query(segment.bbox());
            candidates.sort_by(|a, b| {
                a.feature
                    .custom_data()
                    .cmp(b.feature.custom_data())
                    .then_with(|| a.segment().start_offset().total_cmp(&b.segment().start_offset()))
                    .then_with(|| a.index.cmp(&b.index))
            });

            // blocks a match running through offset 1 back to 0 on a ring
            let mut over_zero: Option<FeatureRangeReference<T>> = None;
            for candidate in candidates {
                let target_data = candidate.feature.custom_data();
                if current != Some(target_data) {
                    over_zero = None;
                    if let Some(last) = take_last_match_and_update_coverage(&mut coverage, &distribution) {
                        matched_ranges.insert(last.target().custom_data().clone(), last);
                    }
                    current = Some(target_data);
                    distribution = BTreeMap::new();
                }

                let target = candidate.segment();
                if is_range_matched(matched_ranges.get(target_data), &segment, &target) {
                    continue;
                }
                let crosses = segment.bbox().cross(target.bbox(), 0.0, 0.0).is_some_and(|c| !c.is_point());
                if !crosses
                    || !euclid::tangent_ranges_overlap(
                        segment.tangent_range(),
                        target.tangent_range(),
                        self.config.tangent_tolerance,
                    )
                {
                    continue;
                }

                for start in sync_edges_and_match_first_point(&segment, &target, &self.config) {
                    if over_zero.as_ref().is_some_and(|r| r.range().contains_offset(start.sample_start())) {
                        continue;
                    }
                    let Some(reference) = start.match_tail(&candidate.feature, &self.config) else {
                        continue;
                    };
                    let reaches_end = if reference.is_same_direction() {
                        reference.target_range().max_offset() == 1.0
                    } else {
                        reference.target_range().min_offset() == 0.0
                    };
                    let shared = reference.range().size() * source.length();
                    if shared > self.config.min_shared_length {
                        distribution.entry(*reference.range()).or_insert_with(|| reference.clone());
                    }
                    if reaches_end {
                        over_zero = Some(reference);
                    }
                }
            }
            take_last_match_and_update_coverage(&mut coverage, &distribution);
        }

        let mut pairs = FeatureMatches::new();
        for references in coverage.values() {
            let mut previous: Option<Range> = None;
            for reference in references.values() {
                let range = *reference.range();
                if previous.is_none_or(|p| !p.contains(&range)) {
                    pairs.entry(range).or_insert_with(Vec::new).push(reference.clone());
                    previous = Some(range);
                }
            }
        }
        tracing::debug!(
            ranges = pairs.len(),
            targets = coverage.len(),
            length = source.length(),
            "source feature matched"
        );
        pairs
    }

    /// Project keyed points onto the indexed features
    ///
    /// # Arguments
    /// * `points` - Query points with the key the result is reported under
    /// * `dx`, `dy` - Half size of the search box around each point
    ///
    /// # Returns
    /// For each key with at least one nearby segment, the point and the
    /// closest point on every such segment
    pub fn find_projections<K, I>(&self, points: I, dx: f64, dy: f64) -> BTreeMap<K, PointProjectionReferences<T>>
    where
        K: Ord,
        I: IntoIterator<Item = (K, Vertex)>,
    {
        let mut result = BTreeMap::new();
        for (key, point) in points {
            let hot_spot = BoundingBox::around(&point, dx, dy);
            let projections: Vec<_> = self
                .index
                .query(&hot_spot)
                .into_iter()
                .filter_map(|s| {
                    s.segment()
                        .find_projection(&point, &hot_spot)
                        .map(|p| (p, Arc::clone(&s.feature)))
                })
                .collect();
            if !projections.is_empty() {
                result.insert(key, PointProjectionReferences { point, projections });
            }
        }
        result
    }
}

/// Flush one target's accepted references into its coverage
///
/// References are taken in range order; one inside the previously kept
/// range is redundant.
///
/// # Returns
/// The last reference kept, if any
fn take_last_match_and_update_coverage<T: Ord + Clone>(
    coverage: &mut BTreeMap<T, Distribution<T>>,
    distribution: &Distribution<T>,
) -> Option<FeatureRangeReference<T>> {
    let first = distribution.values().next()?;
    let feature_coverage = coverage.entry(first.target().custom_data().clone()).or_default();
    let mut best: Option<Range> = None;
    let mut last = None;
    for reference in distribution.values() {
        let range = *reference.range();
        if best.is_none_or(|b| !b.contains(&range)) {
            feature_coverage.entry(range).or_insert_with(|| reference.clone());
            best = Some(range);
            last = Some(reference);
        }
    }
    last.cloned()
}

/// Whether both segments start inside the last match with their target
fn is_range_matched<T>(
    last_match: Option<&FeatureRangeReference<T>>,
    source: &SegmentRef<'_, T>,
    target: &SegmentRef<'_, T>,
) -> bool {
    let Some(last) = last_match else {
        return false;
    };
    let target_start = if last.is_same_direction() {
        target.start_offset()
    } else {
        target.end_offset()
    };
    last.range().contains_offset(source.start_offset()) && last.target_range().contains_offset(target_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            x_tolerance: 0.001,
            y_tolerance: 0.001,
            ..Config::default()
        }
    }

    fn create_test_feature(points: &[(f64, f64)], id: u32) -> Feature<u32> {
        let vertices = points.iter().map(|&p| Vertex::from(p)).collect();
        Feature::build(vertices, id).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tangent_tolerance, 0.09);
        assert_eq!(config.heading_tolerance, 0.08);
        assert_eq!(config.max_children_per_node, 3);
        assert!(config.validate().is_ok());
        assert!((config.distance_square_tolerance() - 3.6e-11).abs() < 1e-20);
    }

    #[test]
    fn test_config_validate() {
        let negative = Config {
            x_tolerance: -1.0,
            ..Config::default()
        };
        assert!(matches!(negative.validate(), Err(DataError::InvalidConfig(_))));

        let narrow = Config {
            max_children_per_node: 1,
            ..Config::default()
        };
        assert!(matches!(narrow.validate(), Err(DataError::InvalidConfig(_))));
        assert!(Matcher::<u32>::new(narrow).is_err());

        let nan = Config {
            heading_tolerance: f64::NAN,
            ..Config::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_config_metric_tolerance() {
        let config = Config::default().with_metric_tolerance(0.0, 0.0, 1.0);
        assert!((config.x_tolerance - 8.98e-6).abs() < 1e-7);
        assert!((config.y_tolerance - 9.04e-6).abs() < 1e-7);
        assert_eq!(config.tangent_tolerance, Config::default().tangent_tolerance);
    }

    #[test]
    fn test_insert_expands_tolerance() {
        let config = create_test_config();
        let mut matcher = Matcher::new(config.clone()).unwrap();
        assert!(matcher.is_empty());
        let shared = matcher.insert(create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1));
        assert_eq!(shared.tolerance(), (0.001, 0.001));
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.index().len(), shared.segment_count());
        assert!(matcher.index().validate());

        matcher.clear();
        assert!(matcher.is_empty());
        assert!(matcher.index().is_empty());
    }

    #[test]
    fn test_parallel_candidate_matches_full_range() {
        let config = create_test_config();
        let matcher = Matcher::build([create_test_feature(&[(0.0, 0.0001), (10.0, 0.0001)], 2)], config).unwrap();
        let source = create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1);

        let matches = matcher.match_feature(&source);
        assert_eq!(matches.len(), 1);
        let references = &matches[&Range::FULL];
        assert_eq!(references.len(), 1);
        assert_eq!(*references[0].target_range(), Range::FULL);
        assert!(references[0].is_same_direction());
        assert_eq!(*references[0].target().custom_data(), 2);
    }

    #[test]
    fn test_reversed_candidate_matches_opposite() {
        let matcher = Matcher::build([create_test_feature(&[(10.0, 0.0), (0.0, 0.0)], 2)], Config::default()).unwrap();
        let source = create_test_feature(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)], 1);

        let matches = matcher.match_feature(&source);
        assert_eq!(matches.len(), 1);
        let (range, references) = matches.iter().next().unwrap();
        assert_eq!(*range, Range::FULL);
        assert_eq!(references.len(), 1);
        assert_eq!(*references[0].target_range(), Range::FULL);
        assert!(!references[0].is_same_direction());
    }

    #[test]
    fn test_short_match_is_dropped() {
        let config = Config {
            min_shared_length: 20.0,
            ..create_test_config()
        };
        let matcher = Matcher::build([create_test_feature(&[(0.0, 0.0001), (10.0, 0.0001)], 2)], config).unwrap();
        let source = create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1);
        assert!(matcher.match_feature(&source).is_empty());
    }

    #[test]
    fn test_source_sharing_target_data_still_matches() {
        let config = create_test_config();
        let matcher = Matcher::build([create_test_feature(&[(0.0, 0.0001), (10.0, 0.0001)], 1)], config).unwrap();
        let source = create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1);

        let matches = matcher.match_feature(&source);
        assert_eq!(matches.len(), 1);
        let references = &matches[&Range::FULL];
        assert_eq!(references.len(), 1);
        assert_eq!(*references[0].target_range(), Range::FULL);
        assert_eq!(*references[0].target().custom_data(), 1);
    }

    #[test]
    fn test_unrelated_candidates_do_not_match() {
        let config = create_test_config();
        let matcher = Matcher::build(
            [
                create_test_feature(&[(5.0, -5.0), (5.0, 5.0)], 2),
                create_test_feature(&[(0.0, 3.0), (10.0, 3.0)], 3),
            ],
            config,
        )
        .unwrap();
        let source = create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1);
        assert!(matcher.match_feature(&source).is_empty());
    }

    #[test]
    fn test_match_is_independent_of_insertion_order() {
        let config = create_test_config();
        let candidates = vec![
            create_test_feature(&[(0.0, 0.0001), (10.0, 0.0001)], 2),
            create_test_feature(&[(5.0, -0.0002), (15.0, -0.0002)], 3),
            create_test_feature(&[(10.0, 0.0), (0.0, 0.0)], 4),
            create_test_feature(&[(5.0, -5.0), (5.0, 5.0)], 5),
        ];
        let source = create_test_feature(&[(0.0, 0.0), (4.0, 0.0), (10.0, 0.0)], 1);

        let forward = Matcher::build(candidates.clone(), config.clone()).unwrap();
        let backward = Matcher::build(candidates.into_iter().rev(), config).unwrap();

        let describe = |m: &FeatureMatches<u32>| -> Vec<(Range, Vec<(u32, Range, bool)>)> {
            m.iter()
                .map(|(range, refs)| {
                    let refs = refs
                        .iter()
                        .map(|r| (*r.target().custom_data(), *r.target_range(), r.is_same_direction()))
                        .collect();
                    (*range, refs)
                })
                .collect()
        };
        let a = describe(&forward.match_feature(&source));
        let b = describe(&backward.match_feature(&source));
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_match_features_groups_by_source() {
        let config = create_test_config();
        let matcher = Matcher::build([create_test_feature(&[(0.0, 0.0001), (10.0, 0.0001)], 10)], config).unwrap();
        let sources = [
            create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 1),
            create_test_feature(&[(0.0, 50.0), (10.0, 50.0)], 2),
        ];
        let result = matcher.match_features(&sources);
        assert_eq!(result.len(), 1);
        assert_eq!(result[&1].len(), 1);
        assert_eq!(*result[&1][0].target().custom_data(), 10);
    }

    #[test]
    fn test_find_projections() {
        let config = create_test_config();
        let matcher = Matcher::build([create_test_feature(&[(0.0, 0.0), (10.0, 0.0)], 7)], config).unwrap();
        let points = vec![
            ("near", Vertex::new(5.0, 0.0005)),
            ("far", Vertex::new(5.0, 3.0)),
        ];
        let result = matcher.find_projections(points, 0.001, 0.001);
        assert_eq!(result.len(), 1);
        let near = &result["near"];
        assert_eq!(near.projections.len(), 1);
        let (p, feature) = &near.projections[0];
        assert!((p.x - 5.0).abs() < 1e-9);
        assert_eq!(p.y, 0.0);
        assert!((p.o - 0.5).abs() < 1e-9);
        assert_eq!(*feature.custom_data(), 7);
    }
}
