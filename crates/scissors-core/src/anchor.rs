//! Auto-anchor planner: recursive subdivision of long or weak spans.
//!
//! When the straight-line distance between two seeds exceeds a threshold
//! scaled by image complexity, the planner samples candidate midpoints
//! along the line, keeps the ones sitting on a sufficiently strong edge
//! that is also a ridge across the line, scores them and recurses on both
//! halves around the winner. The planner is a pure function of the field,
//! the endpoints and a short hint of the already-committed path; the
//! session splices its output in afterwards.
//!
//! # Termination
//!
//! Every accepted midpoint is strictly closer to both endpoints than they
//! are to each other, so each recursive span is strictly shorter. On a
//! finite grid that alone bounds the depth; [`AnchorConfig::max_depth`] is
//! an additional hard cap.

use serde::{Deserialize, Serialize};

use crate::cost::{delta, turn_cosine};
use crate::gradient::GradientField;
use crate::search::SegmentSearch;
use crate::types::{GridCoord, PathSegment, ScissorsError};

/// Planner tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Whether the planner runs at all. When `false` every segment is a
    /// single direct search.
    pub enabled: bool,

    /// Span length (pixels) that a maximally complex image tolerates
    /// without subdivision.
    pub base_threshold: f64,

    /// Extra span length granted to low-complexity images:
    /// `threshold = base_threshold + (1 - complexity) * complexity_span`.
    pub complexity_span: f64,

    /// Candidates must exceed this fraction of the field's maximum
    /// gradient magnitude.
    pub gradient_floor: f64,

    /// First sampling offset along the line, as a fraction of its length.
    pub sample_start: f64,

    /// Last sampling offset (inclusive).
    pub sample_end: f64,

    /// Distance between sampling offsets.
    pub sample_step: f64,

    /// Score weight of the normalized gradient magnitude.
    pub gradient_weight: f64,

    /// Score weight of direction consistency with the committed tail.
    pub direction_weight: f64,

    /// Score penalty weight of the committed tail's curvature.
    pub curvature_weight: f64,

    /// Hard cap on recursion depth.
    pub max_depth: u32,
}

impl AnchorConfig {
    /// Default span length for a maximally complex image.
    pub const DEFAULT_BASE_THRESHOLD: f64 = 100.0;
    /// Default extra span length for a flat image.
    pub const DEFAULT_COMPLEXITY_SPAN: f64 = 200.0;
    /// Default gradient floor.
    pub const DEFAULT_GRADIENT_FLOOR: f64 = 0.2;
    /// Default first sampling offset.
    pub const DEFAULT_SAMPLE_START: f64 = 0.2;
    /// Default last sampling offset.
    pub const DEFAULT_SAMPLE_END: f64 = 0.8;
    /// Default sampling step.
    pub const DEFAULT_SAMPLE_STEP: f64 = 0.1;
    /// Default gradient weight.
    pub const DEFAULT_GRADIENT_WEIGHT: f64 = 0.7;
    /// Default direction-consistency weight.
    pub const DEFAULT_DIRECTION_WEIGHT: f64 = 0.3;
    /// Default curvature penalty weight.
    pub const DEFAULT_CURVATURE_WEIGHT: f64 = 0.2;
    /// Default recursion cap.
    pub const DEFAULT_MAX_DEPTH: u32 = 16;

    /// Check for values the planner cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ScissorsError> {
        let non_negative = [
            ("base_threshold", self.base_threshold),
            ("complexity_span", self.complexity_span),
            ("gradient_weight", self.gradient_weight),
            ("direction_weight", self.direction_weight),
            ("curvature_weight", self.curvature_weight),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ScissorsError::InvalidConfig(format!(
                    "auto_anchor.{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.gradient_floor) {
            return Err(ScissorsError::InvalidConfig(format!(
                "auto_anchor.gradient_floor must be within [0, 1], got {}",
                self.gradient_floor
            )));
        }
        if !(self.sample_start > 0.0
            && self.sample_start <= self.sample_end
            && self.sample_end < 1.0)
        {
            return Err(ScissorsError::InvalidConfig(format!(
                "auto_anchor sampling range must satisfy 0 < start <= end < 1, got [{}, {}]",
                self.sample_start, self.sample_end
            )));
        }
        if !self.sample_step.is_finite() || self.sample_step <= 0.0 {
            return Err(ScissorsError::InvalidConfig(format!(
                "auto_anchor.sample_step must be positive, got {}",
                self.sample_step
            )));
        }
        Ok(())
    }

    /// Sampling offsets from `sample_start` to `sample_end` inclusive.
    fn offsets(&self) -> impl Iterator<Item = f64> + '_ {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = ((self.sample_end - self.sample_start) / self.sample_step + 1e-9).floor() as usize;
        #[allow(clippy::cast_precision_loss)]
        (0..=count).map(move |k| (k as f64).mul_add(self.sample_step, self.sample_start))
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_threshold: Self::DEFAULT_BASE_THRESHOLD,
            complexity_span: Self::DEFAULT_COMPLEXITY_SPAN,
            gradient_floor: Self::DEFAULT_GRADIENT_FLOOR,
            sample_start: Self::DEFAULT_SAMPLE_START,
            sample_end: Self::DEFAULT_SAMPLE_END,
            sample_step: Self::DEFAULT_SAMPLE_STEP,
            gradient_weight: Self::DEFAULT_GRADIENT_WEIGHT,
            direction_weight: Self::DEFAULT_DIRECTION_WEIGHT,
            curvature_weight: Self::DEFAULT_CURVATURE_WEIGHT,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// The last (at most three) distinct coordinates of the committed path,
/// oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailHint(Vec<GridCoord>);

impl TailHint {
    /// Number of coordinates kept.
    pub const LEN: usize = 3;

    /// No committed history.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Tail of a single path.
    #[must_use]
    pub fn from_path(path: &[GridCoord]) -> Self {
        Self::from_segments(std::iter::once(path))
    }

    /// Tail of consecutive segments, skipping repeated junction points.
    #[must_use]
    pub fn from_segments<'a, I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a [GridCoord]>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut rev: Vec<GridCoord> = Vec::with_capacity(Self::LEN);
        'outer: for segment in segments.into_iter().rev() {
            for &c in segment.iter().rev() {
                if rev.last() != Some(&c) {
                    rev.push(c);
                    if rev.len() == Self::LEN {
                        break 'outer;
                    }
                }
            }
        }
        rev.reverse();
        Self(rev)
    }

    /// Coordinates, oldest first.
    #[must_use]
    pub fn coords(&self) -> &[GridCoord] {
        &self.0
    }

    /// Direction consistency of stepping from the tail to `candidate`:
    /// cosine of the angle between the last committed step and the
    /// vector from the last committed point to the candidate. 1 when the
    /// tail holds fewer than two points.
    #[must_use]
    pub fn direction_consistency(&self, candidate: GridCoord) -> f64 {
        match self.0.as_slice() {
            [.., a, b] => turn_cosine(*a, *b, candidate),
            _ => 1.0,
        }
    }

    /// Curvature of the last three committed points, 0 with fewer.
    #[must_use]
    pub fn curvature(&self) -> f64 {
        match self.0.as_slice() {
            [.., a, b, c] => curvature(*a, *b, *c),
            _ => 0.0,
        }
    }
}

/// Three-point curvature `2 |v1 x v2| / (|v1| |v2|)` with `v1 = b - a`
/// and `v2 = c - b`; 0 when either vector is degenerate.
#[must_use]
pub fn curvature(a: GridCoord, b: GridCoord, c: GridCoord) -> f64 {
    let (x1, y1) = delta(a, b);
    let (x2, y2) = delta(b, c);
    let l1 = x1.hypot(y1);
    let l2 = x2.hypot(y2);
    if l1 < 1e-6 || l2 < 1e-6 {
        return 0.0;
    }
    2.0 * x1.mul_add(y2, -(y1 * x2)).abs() / (l1 * l2)
}

/// A midpoint that survived the gradient floor and the ridge test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Where the midpoint sits.
    pub coord: GridCoord,
    /// Its gradient magnitude.
    pub magnitude: f64,
    /// Weighted score; the highest wins.
    pub score: f64,
}

/// Segments from start to end plus the anchors inserted between them.
///
/// `segments.len() == anchors.len() + 1`; segment `i` ends where segment
/// `i + 1` starts, and `anchors[i]` is that shared point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPath {
    /// Chained segments.
    pub segments: Vec<PathSegment>,
    /// Inserted anchors in path order.
    pub anchors: Vec<GridCoord>,
}

impl PlannedPath {
    /// A single unsubdivided segment.
    #[must_use]
    pub fn direct(segment: PathSegment) -> Self {
        Self {
            segments: vec![segment],
            anchors: Vec::new(),
        }
    }

    fn concat(mut self, other: Self, mid: GridCoord) -> Self {
        self.anchors.push(mid);
        self.anchors.extend(other.anchors);
        self.segments.extend(other.segments);
        self
    }

    /// All coordinates from start to end with junction duplicates removed.
    #[must_use]
    pub fn coords(&self) -> Vec<GridCoord> {
        let mut out: Vec<GridCoord> = Vec::new();
        for segment in &self.segments {
            for &c in segment.coords() {
                if out.last() != Some(&c) {
                    out.push(c);
                }
            }
        }
        out
    }

    /// The whole plan as one segment.
    #[must_use]
    pub fn flatten(&self) -> PathSegment {
        PathSegment::new(self.coords())
    }
}

/// Recursive midpoint planner over a fixed field and configuration.
#[derive(Debug, Clone, Copy)]
pub struct AutoAnchorPlanner<'a> {
    field: &'a GradientField,
    config: &'a AnchorConfig,
}

impl<'a> AutoAnchorPlanner<'a> {
    /// Planner for `field` under `config`.
    #[must_use]
    pub const fn new(field: &'a GradientField, config: &'a AnchorConfig) -> Self {
        Self { field, config }
    }

    /// Span length below which no subdivision happens.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        (1.0 - self.field.complexity())
            .mul_add(self.config.complexity_span, self.config.base_threshold)
    }

    /// Surviving midpoint candidates between `start` and `end`, scored
    /// against `tail`, in sampling order.
    #[must_use]
    pub fn candidates(&self, start: GridCoord, end: GridCoord, tail: &TailHint) -> Vec<Candidate> {
        let (dx, dy) = delta(start, end);
        let span = dx.hypot(dy);
        if span < 1e-9 || self.field.is_degenerate() {
            return Vec::new();
        }
        let (sx, sy) = (f64::from(start.x), f64::from(start.y));
        let normal = (-dy / span, dx / span);
        let floor = self.config.gradient_floor * self.field.max_magnitude();

        let mut seen: Vec<GridCoord> = Vec::new();
        let mut out = Vec::new();
        for t in self.config.offsets() {
            // Between two in-bounds endpoints, so never negative.
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let coord = GridCoord::new(
                t.mul_add(dx, sx).round() as u32,
                t.mul_add(dy, sy).round() as u32,
            );
            if coord == start || coord == end || seen.contains(&coord) {
                continue;
            }
            seen.push(coord);
            if !self.field.contains(coord) {
                continue;
            }
            if coord.distance(start) >= span || coord.distance(end) >= span {
                continue;
            }
            let magnitude = self.field.magnitude(coord);
            if magnitude <= floor || !self.is_ridge(coord, normal) {
                continue;
            }
            out.push(Candidate {
                coord,
                magnitude,
                score: self.score(coord, tail),
            });
        }
        out
    }

    /// No neighbour displaced along `normal` is strictly stronger.
    fn is_ridge(&self, coord: GridCoord, normal: (f64, f64)) -> bool {
        let m = self.field.magnitude(coord);
        [-1.0, 1.0].into_iter().all(|k: f64| {
            let nx = k.mul_add(normal.0, f64::from(coord.x)).round();
            let ny = k.mul_add(normal.1, f64::from(coord.y)).round();
            if nx < 0.0 || ny < 0.0 {
                return true;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = GridCoord::new(nx as u32, ny as u32);
            n == coord || !self.field.contains(n) || self.field.magnitude(n) <= m
        })
    }

    /// Weighted score of a candidate:
    /// `wg * magnitude / max + wd * direction_consistency - wc * |curvature|`.
    #[must_use]
    pub fn score(&self, coord: GridCoord, tail: &TailHint) -> f64 {
        let max = self.field.max_magnitude();
        let gradient = if max > 0.0 {
            self.field.magnitude(coord) / max
        } else {
            0.0
        };
        let c = &self.config;
        c.gradient_weight.mul_add(
            gradient,
            c.direction_weight.mul_add(
                tail.direction_consistency(coord),
                -c.curvature_weight * tail.curvature().abs(),
            ),
        )
    }

    /// Best-scoring candidate, first in sampling order on ties.
    #[must_use]
    pub fn best_candidate(
        &self,
        start: GridCoord,
        end: GridCoord,
        tail: &TailHint,
    ) -> Option<Candidate> {
        self.candidates(start, end, tail)
            .into_iter()
            .reduce(|best, c| if c.score > best.score { c } else { best })
    }

    /// Plan the path from `start` to `end`.
    ///
    /// Spans shorter than [`threshold`](Self::threshold), spans with no
    /// surviving candidate and spans at the depth cap are searched
    /// directly. Otherwise the best candidate becomes an anchor and both
    /// halves are planned recursively; the second half sees the tail of
    /// the first as its history.
    ///
    /// # Errors
    ///
    /// Propagates [`ScissorsError`] from `search`.
    pub fn plan<S: SegmentSearch + ?Sized>(
        &self,
        search: &S,
        start: GridCoord,
        end: GridCoord,
        tail: &TailHint,
    ) -> Result<PlannedPath, ScissorsError> {
        self.plan_at(search, start, end, tail, 0)
    }

    fn plan_at<S: SegmentSearch + ?Sized>(
        &self,
        search: &S,
        start: GridCoord,
        end: GridCoord,
        tail: &TailHint,
        depth: u32,
    ) -> Result<PlannedPath, ScissorsError> {
        let span = start.distance(end);
        let threshold = self.threshold();
        if !self.config.enabled || span < threshold || depth >= self.config.max_depth {
            return Ok(PlannedPath::direct(search.search(start, end)?));
        }
        let Some(mid) = self.best_candidate(start, end, tail) else {
            tracing::debug!(%start, %end, span, "no anchor candidate, searching directly");
            return Ok(PlannedPath::direct(search.search(start, end)?));
        };
        tracing::debug!(
            %start,
            %end,
            anchor = %mid.coord,
            score = mid.score,
            depth,
            "inserting auto anchor"
        );
        let first = self.plan_at(search, start, mid.coord, tail, depth + 1)?;
        let first_tail = TailHint::from_segments(first.segments.iter().map(PathSegment::coords));
        let second = self.plan_at(search, mid.coord, end, &first_tail, depth + 1)?;
        Ok(first.concat(second, mid.coord))
    }
}
