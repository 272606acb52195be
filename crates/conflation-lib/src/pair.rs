//! Geometric matching of one source segment against one target segment
//!
//! Matching runs in three steps:
//! 1. [`match_direction`] finds the most parallel pair of overlapping edges
//!    and decides whether the target runs with or against the source.
//! 2. [`sync_edges_and_match_first_point`] walks both segments looking for
//!    aligned start points and returns every hypothesis as a
//!    [`MatchingContext`], best first.
//! 3. [`MatchingContext::match_tail`] walks on from a start point while the
//!    two features stay within tolerance and reports the matched ranges.
//!
//! The source is always walked in digitizing order; the target cursor runs
//! backwards when the directions are opposite.

use crate::bbox::{BoundingBox, IntersectionTest};
use crate::cursor::{Cursor, CursorDirection};
use crate::euclid;
use crate::feature::Feature;
use crate::matcher::Config;
use crate::range::{FeatureRangeReference, Range};
use crate::segment::SegmentRef;
use crate::vertex::Vertex;
use std::cmp::Ordering;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

/// Parametric sense of the target relative to the source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchDirection {
    Same,
    Opposite,
}

/// Decide how the target segment runs relative to the source segment
///
/// # Returns
/// `None` when no pair of overlapping edges is parallel within the heading
/// tolerance
pub fn match_direction<A, B>(
    source: &SegmentRef<'_, A>,
    target: &SegmentRef<'_, B>,
    config: &Config,
) -> Option<MatchDirection> {
    let mut min_dt = f64::MAX;
    let mut best = None;
    for a in source.edges() {
        for b in target.edges() {
            let dt = euclid::tangent_diff(a.tangent(), b.tangent());
            if dt < min_dt && a.bbox().overlaps(b.bbox()) {
                min_dt = dt;
                best = Some((a, b));
            }
        }
    }
    let (a, b) = best?;
    if min_dt >= config.heading_tolerance {
        return None;
    }
    let dh = euclid::normalize_angle(a.heading() - b.heading());
    Some(if dh.abs() < FRAC_PI_2 {
        MatchDirection::Same
    } else {
        MatchDirection::Opposite
    })
}

/// Start hypothesis for tail matching
///
/// Holds both cursors at the edges where the start points were found and
/// the offsets of those points.
pub struct MatchingContext<'a, T> {
    source: Cursor<'a, T>,
    target: Cursor<'a, T>,
    sample_start: f64,
    candidate_start: f64,
    start_distance_sq: f64,
}

/// Cursor moved last while looking for the next sync point
#[derive(Clone, Copy, PartialEq, Eq)]
enum LastMove {
    Source,
    Target,
}

#[inline]
fn within_xy(a: &Vertex, b: &Vertex, config: &Config) -> bool {
    euclid::same_with_tolerance(a.x, b.x, config.x_tolerance) && euclid::same_with_tolerance(a.y, b.y, config.y_tolerance)
}

#[inline]
fn within_distance(distance_sq: f64, config: &Config) -> bool {
    distance_sq <= config.distance_square_tolerance()
}

#[inline]
fn tangents_match(t1: f64, t2: f64, config: &Config) -> bool {
    euclid::compare_tangent_with_tolerance(t1, t2, config.tangent_tolerance) == Ordering::Equal
}

/// Whether the tolerance box around `v` touches the cursor's current edge
#[inline]
fn reaches<T>(v: &Vertex, cursor: &Cursor<'_, T>, config: &Config) -> bool {
    BoundingBox::around(v, config.x_tolerance, config.y_tolerance)
        .intersect_status(cursor.edge_first_vertex(), cursor.edge_last_vertex())
        != IntersectionTest::Outside
}

/// Find every aligned start point of two segments
///
/// One cursor (the primary) walks its segment while the other stays put;
/// when the primary runs out, it rewinds and the secondary steps once. The
/// primary is the cursor whose far end lies farther from the other's start.
///
/// # Returns
/// Start hypotheses ordered by start distance, then by source offset
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn sync_edges_and_match_first_point<'a, T>(
    source: &SegmentRef<'a, T>,
    target: &SegmentRef<'a, T>,
    config: &Config,
) -> Vec<MatchingContext<'a, T>> {
    let mut starts = Vec::new();
    let Some(direction) = match_direction(source, target, config) else {
        return starts;
    };

    let target_direction = match direction {
        MatchDirection::Same => CursorDirection::Forward,
        MatchDirection::Opposite => CursorDirection::Backward,
    };
    let src = Cursor::from_segment(source, CursorDirection::Forward);
    let trg = Cursor::from_segment(target, target_direction);

    let along_target = src.edge_last_vertex().distance_sq(trg.edge_first_vertex())
        > src.edge_first_vertex().distance_sq(trg.edge_last_vertex());
    // cursors[0] walks the source, cursors[1] the target
    let mut cursors = [src, trg];
    let (primary, secondary) = if along_target { (1, 0) } else { (0, 1) };
    let (max_steps, second_max_steps) = if along_target {
        (target.edge_count(), source.edge_count())
    } else {
        (source.edge_count(), target.edge_count())
    };
    let sync_start = cursors[primary].position();

    let mut has_more = true;
    let mut steps = 0;
    let mut second_steps = 0;
    let mut first_iteration = true;
    loop {
        if !first_iteration && (!has_more || steps >= max_steps) {
            if second_steps >= second_max_steps {
                break;
            }
            cursors[primary].set_position(sync_start);
            steps = 0;
            cursors[secondary].next();
            second_steps += 1;
        }
        steps += 1;
        first_iteration = false;

        let [si, ti] = cursors;
        if !tangents_match(si.tangent(), ti.tangent(), config) || !si.bbox().overlaps(ti.bbox()) {
            has_more = cursors[primary].next();
            continue;
        }

        let sample = si.edge_first_vertex();
        let candidate = ti.edge_first_vertex();
        if within_xy(sample, candidate, config) {
            let d1 = sample.distance_sq(candidate);
            tracing::trace!(sample = sample.o, candidate = candidate.o, d1, "start vertices coincide");
            starts.push(MatchingContext::new(si, ti, sample.o, candidate.o, d1));

            // the far end of the primary edge may be a closer start
            let cs = cursors[secondary].edge_first_vertex();
            let ce = cursors[primary].edge_last_vertex();
            if within_xy(cs, ce, config) {
                let d2 = cs.distance_sq(ce);
                let next_parallel = cursors[primary]
                    .view_next_tangent()
                    .is_some_and(|t| tangents_match(cursors[secondary].tangent(), t, config));
                if d2 < d1 && !cursors[primary].is_last() && next_parallel {
                    has_more = cursors[primary].next();
                    continue;
                }
            }
            continue;
        }

        match euclid::projection_point(ti.edge_first_vertex(), ti.edge_last_vertex(), sample) {
            Some(p) => {
                let d = euclid::distance_sq(p, sample);
                if !within_distance(d, config) {
                    has_more = cursors[primary].next();
                    continue;
                }
                let o = euclid::calc_offset(ti.edge_first_vertex(), ti.edge_last_vertex(), p.x, p.y);
                tracing::trace!(sample = sample.o, candidate = o, d, "source start projects on target");
                starts.push(MatchingContext::new(si, ti, sample.o, o, d));

                let next_parallel = ti
                    .view_next_tangent()
                    .is_some_and(|t| tangents_match(si.tangent(), t, config));
                if within_distance(euclid::distance_sq(p, ti.edge_last_vertex()), config)
                    && !ti.is_last()
                    && next_parallel
                {
                    has_more = cursors[1].next();
                }
            }
            None => {
                let projected = euclid::projection_point(si.edge_first_vertex(), si.edge_last_vertex(), candidate)
                    .map(|p| (p, euclid::distance_sq(p, candidate)))
                    .filter(|&(_, d)| within_distance(d, config));
                match projected {
                    Some((p, d)) => {
                        let o = euclid::calc_offset(si.edge_first_vertex(), si.edge_last_vertex(), p.x, p.y);
                        tracing::trace!(sample = o, candidate = candidate.o, d, "target start projects on source");
                        starts.push(MatchingContext::new(si, ti, o, candidate.o, d));
                    }
                    None => has_more = cursors[primary].next(),
                }
            }
        }
    }

    starts.sort_by(|a, b| a.cmp_rank(b));
    starts.dedup_by(|a, b| a.cmp_rank(b) == Ordering::Equal);
    starts
}

impl<'a, T> MatchingContext<'a, T> {
    fn new(source: Cursor<'a, T>, target: Cursor<'a, T>, sample_start: f64, candidate_start: f64, d: f64) -> Self {
        Self {
            source,
            target,
            sample_start,
            candidate_start,
            start_distance_sq: d,
        }
    }

    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.start_distance_sq
            .total_cmp(&other.start_distance_sq)
            .then_with(|| self.sample_start.total_cmp(&other.sample_start))
    }

    /// Offset of the start point on the source
    #[inline]
    pub fn sample_start(&self) -> f64 {
        self.sample_start
    }

    /// Offset of the start point on the target
    #[inline]
    pub fn candidate_start(&self) -> f64 {
        self.candidate_start
    }

    /// Squared distance between the two start points
    #[inline]
    pub fn start_distance_sq(&self) -> f64 {
        self.start_distance_sq
    }

    #[inline]
    pub fn source(&self) -> &Cursor<'a, T> {
        &self.source
    }

    #[inline]
    pub fn target(&self) -> &Cursor<'a, T> {
        &self.target
    }

    /// Walk both features from the start point for as long as they match
    ///
    /// Each round advances the cursors until their edge ends line up again
    /// (a resync), then records the matched end offsets, through vertex
    /// coincidence or a projection in either direction. Matching stops when
    /// no resync is possible or a feature ends.
    ///
    /// # Arguments
    /// * `target` - Shared handle of the feature the target cursor walks
    ///
    /// # Returns
    /// The matched ranges, or `None` when either side is shorter than the
    /// range tolerance
    pub fn match_tail(mut self, target: &Arc<Feature<T>>, config: &Config) -> Option<FeatureRangeReference<T>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("pair::match_tail");
        debug_assert!(std::ptr::eq(Arc::as_ptr(target), self.target.feature()));

        let si = &mut self.source;
        let ti = &mut self.target;
        let mut sample_end = f64::NAN;
        let mut candidate_end = f64::NAN;
        let mut prev_sample = f64::NAN;
        let mut prev_candidate = f64::NAN;
        let mut stop_matching = false;
        let mut first_time = true;

        while !stop_matching && (first_time || !(si.is_last() || ti.is_last())) {
            first_time = false;
            let mut in_sync = false;
            let mut start_sync = false;
            let mut min_dx = f64::MAX;
            let mut min_dy = f64::MAX;
            let mut last_move = None;

            while !in_sync {
                let s_end = si.edge_last_vertex();
                let c_end = ti.edge_last_vertex();
                let dx = (s_end.x - c_end.x).abs();
                let dy = (s_end.y - c_end.y).abs();
                if start_sync || (dx < config.x_tolerance && dy < config.y_tolerance) {
                    if min_dx >= dx && min_dy >= dy {
                        min_dx = dx;
                        min_dy = dy;
                        in_sync = ti.is_last();
                    } else {
                        ti.previous();
                        in_sync = true;
                    }
                    start_sync = true;
                }
                if in_sync {
                    break;
                }

                if ti.is_last() {
                    if !start_sync {
                        if reaches(s_end, ti, config) {
                            if si.is_last() {
                                in_sync = true;
                                break;
                            }
                            last_move = Some(LastMove::Source);
                            si.next();
                            continue;
                        } else if reaches(c_end, si, config) {
                            in_sync = true;
                        } else if let Some(last) = last_move {
                            match last {
                                LastMove::Source => si.previous(),
                                LastMove::Target => ti.previous(),
                            };
                            in_sync = true;
                        }
                    }
                    break;
                }

                if start_sync {
                    ti.next();
                } else if reaches(s_end, ti, config) {
                    if si.is_last() {
                        in_sync = true;
                        break;
                    }
                    last_move = Some(LastMove::Source);
                    si.next();
                } else if reaches(c_end, si, config) {
                    last_move = Some(LastMove::Target);
                    ti.next();
                } else {
                    if let Some(last) = last_move {
                        match last {
                            LastMove::Source => si.previous(),
                            LastMove::Target => ti.previous(),
                        };
                        in_sync = true;
                    }
                    break;
                }
            }

            if !in_sync {
                tracing::trace!(source = si.position(), target = ti.position(), "no resync");
                stop_matching = true;
                continue;
            }

            let mut sample_vertex = si.edge_last_vertex();
            let mut candidate_vertex = ti.edge_last_vertex();
            if within_xy(sample_vertex, candidate_vertex, config) {
                prev_sample = sample_end;
                prev_candidate = candidate_end;
                sample_end = sample_vertex.o;
                candidate_end = candidate_vertex.o;
                first_time = ti.next() || si.next();
                continue;
            }

            match euclid::projection_point(ti.edge_first_vertex(), ti.edge_last_vertex(), sample_vertex) {
                Some(p) => {
                    if within_distance(euclid::distance_sq(p, sample_vertex), config) {
                        prev_sample = sample_end;
                        prev_candidate = candidate_end;
                        candidate_end = euclid::calc_offset(ti.edge_first_vertex(), ti.edge_last_vertex(), p.x, p.y);
                        sample_end = sample_vertex.o;
                    }
                }
                None => {
                    let projected =
                        euclid::projection_point(si.edge_first_vertex(), si.edge_last_vertex(), candidate_vertex)
                            .filter(|&p| within_distance(euclid::distance_sq(p, candidate_vertex), config));
                    if let Some(p) = projected {
                        prev_sample = sample_end;
                        prev_candidate = candidate_end;
                        sample_end = euclid::calc_offset(si.edge_first_vertex(), si.edge_last_vertex(), p.x, p.y);
                        candidate_end = candidate_vertex.o;
                    } else if !si.is_last() || !ti.is_last() {
                        // one more edge on either side may still close the gap
                        if !si.is_last() {
                            si.next();
                            sample_vertex = si.edge_last_vertex();
                        } else {
                            ti.next();
                            candidate_vertex = ti.edge_last_vertex();
                        }
                        if within_xy(sample_vertex, candidate_vertex, config) {
                            prev_sample = sample_end;
                            prev_candidate = candidate_end;
                            sample_end = sample_vertex.o;
                            candidate_end = candidate_vertex.o;
                        }
                    }
                }
            }
            stop_matching = true;
        }

        let source = si.feature();
        let sample_start = self.sample_start;
        let candidate_start = self.candidate_start;
        let accepted = !sample_start.is_nan()
            && !sample_end.is_nan()
            && (candidate_end - candidate_start).abs() > target.absolute_to_parametric(config.range_tolerance_meters)
            && (sample_end - sample_start).abs() > source.absolute_to_parametric(config.range_tolerance_meters);
        if !accepted {
            tracing::trace!(sample_start, sample_end, candidate_start, candidate_end, "tail rejected");
            return None;
        }

        // a point matched twice within tolerance keeps its closer partner
        if !prev_candidate.is_nan() && !prev_sample.is_nan() {
            if prev_candidate == candidate_end {
                let points = (
                    target.calculate_point(prev_candidate, 0.0),
                    source.calculate_point(prev_sample, 0.0),
                    source.calculate_point(sample_end, 0.0),
                );
                if let (Some(cp), Some(s1), Some(s2)) = points {
                    if cp.distance_sq(&s1) < cp.distance_sq(&s2) {
                        sample_end = prev_sample;
                    }
                }
            } else if prev_sample == sample_end {
                let points = (
                    source.calculate_point(prev_sample, 0.0),
                    target.calculate_point(prev_candidate, 0.0),
                    target.calculate_point(candidate_end, 0.0),
                );
                if let (Some(sp), Some(c1), Some(c2)) = points {
                    if sp.distance_sq(&c1) < sp.distance_sq(&c2) {
                        candidate_end = prev_candidate;
                    }
                }
            }
        }

        tracing::trace!(sample_start, sample_end, candidate_start, candidate_end, "tail matched");
        Some(FeatureRangeReference::new(
            Range::ordered(sample_start, sample_end),
            Arc::clone(target),
            Range::ordered(candidate_start, candidate_end),
            candidate_start < candidate_end,
        ))
    }
}
