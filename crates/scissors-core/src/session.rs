//! The lasso session: seeds, committed segments and the live segment.
//!
//! # States
//!
//! ```text
//! Idle --seed--> Collecting <--pointer near first seed--> Closing
//!                    |                                       |
//!                    +------- click near first seed ---------+--> Completed
//! ```
//!
//! Cancel returns any state to `Idle`. Undo pops the most recent commit
//! (a user seed with any auto anchors the planner inserted before it, or
//! the closing segment) and falls back to `Idle` once no seeds remain.
//!
//! # Commits
//!
//! A seed commit is split in two so the search can run off-thread:
//! [`Session::begin_seed`] snaps the click and returns a [`SegmentJob`];
//! [`Session::apply`] splices the finished [`SegmentResponse`] in. Every
//! operation that changes the seed list bumps a generation counter, and
//! `apply` ignores responses issued under an older generation, so a
//! cancel or undo never races with a late result.
//! [`Session::place_seed`] runs both halves synchronously.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::anchor::TailHint;
use crate::cache::{CachedSearch, PathCache};
use crate::cost::CostFunctionKind;
use crate::diagnostics::{Clock, Counters, SessionDiagnostics, SystemClock};
use crate::gradient::GradientField;
use crate::search::{SearchStats, SegmentSearch, find_path_with};
use crate::snap::{adaptive_radius, snap, to_grid};
use crate::types::{GridCoord, PathSegment, Point, ScissorsError, SeedPoint, SessionConfig};
use crate::worker::{self, SegmentJob, SegmentRequest, SegmentResponse};

/// Where the session is in the tracing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No seeds.
    Idle,
    /// At least one seed placed; the contour is open.
    Collecting,
    /// Open contour with the pointer within the closing radius of the
    /// first seed.
    Closing,
    /// The contour has been closed.
    Completed,
}

/// What [`Session::begin_seed`] decided to do with a click.
#[derive(Debug)]
pub enum SeedOutcome {
    /// First seed of the contour, committed immediately.
    Started(GridCoord),
    /// A segment must be computed; hand the job to a worker (or
    /// [`worker::run_job`]) and pass the response to [`Session::apply`].
    Pending(SegmentJob),
    /// The click changes nothing: it repeats the last seed, or lands near
    /// the first seed before enough seeds exist to close.
    Ignored,
}

/// The effect of a seed placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// First seed committed.
    Started,
    /// A seed was appended, preceded by `auto_anchors` planner anchors.
    Extended {
        /// Auto anchors inserted before the new seed.
        auto_anchors: usize,
    },
    /// The contour was closed.
    Closed,
    /// Nothing changed.
    Ignored,
    /// The response belonged to a superseded request and was dropped.
    Stale,
}

/// Result of [`Session::move_live`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdate {
    /// The live segment was recomputed.
    Updated,
    /// Skipped: less than the live interval since the last update.
    Throttled,
    /// Skipped: no open contour to extend.
    Inactive,
}

/// Seeds and segments added by one commit, so undo can remove exactly
/// those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Commit {
    seeds: usize,
    segments: usize,
}

/// An interactive tracing session over one gradient field.
pub struct Session<C: Clock = SystemClock> {
    config: SessionConfig,
    field: Arc<GradientField>,
    cache: Arc<PathCache>,
    clock: C,
    state: SessionState,
    seeds: Vec<SeedPoint>,
    segments: Vec<PathSegment>,
    commits: Vec<Commit>,
    live: Option<PathSegment>,
    last_live: Option<C::Instant>,
    last_live_stats: Option<SearchStats>,
    generation: u64,
    pending: Option<SegmentRequest>,
    counters: Counters,
}

impl Session<SystemClock> {
    /// Start a session over `field` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] if `config` is invalid.
    pub fn new(field: GradientField, config: SessionConfig) -> Result<Self, ScissorsError> {
        Self::with_clock(field, config, SystemClock)
    }
}

impl<C: Clock> Session<C> {
    /// Start a session over `field` with a custom clock.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] if `config` is invalid.
    pub fn with_clock(
        field: GradientField,
        config: SessionConfig,
        clock: C,
    ) -> Result<Self, ScissorsError> {
        config.validate()?;
        let cache = Arc::new(PathCache::new(config.cache_capacity)?);
        Ok(Self {
            config,
            field: Arc::new(field),
            cache,
            clock,
            state: SessionState::Idle,
            seeds: Vec::new(),
            segments: Vec::new(),
            commits: Vec::new(),
            live: None,
            last_live: None,
            last_live_stats: None,
            generation: 0,
            pending: None,
            counters: Counters::default(),
        })
    }

    // --- Accessors ---

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the contour has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Completed
    }

    /// Seeds in placement order, auto anchors included.
    #[must_use]
    pub fn seeds(&self) -> &[SeedPoint] {
        &self.seeds
    }

    /// Committed segments. Segment `i` runs from seed `i` to seed `i + 1`;
    /// when closed, the last one runs from the last seed to the first.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The uncommitted segment following the pointer, if any.
    #[must_use]
    pub const fn live_segment(&self) -> Option<&PathSegment> {
        self.live.as_ref()
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The gradient field being traced.
    #[must_use]
    pub const fn field(&self) -> &Arc<GradientField> {
        &self.field
    }

    /// The path cache paired with the field.
    #[must_use]
    pub const fn cache(&self) -> &Arc<PathCache> {
        &self.cache
    }

    /// The clock driving live-move throttling.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Current generation. Bumped by every request and every operation
    /// that invalidates in-flight requests.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The request awaiting [`apply`](Self::apply), if any.
    #[must_use]
    pub const fn pending(&self) -> Option<&SegmentRequest> {
        self.pending.as_ref()
    }

    /// Flattened committed path, suitable for polygon rasterization.
    ///
    /// Junction points shared by consecutive segments appear once, and a
    /// closed contour does not repeat its first point at the end. A
    /// session holding a single seed yields just that seed.
    #[must_use]
    pub fn committed_path(&self) -> Vec<GridCoord> {
        let mut out: Vec<GridCoord> = Vec::new();
        if self.segments.is_empty() {
            out.extend(self.seeds.first().map(|s| s.coord));
            return out;
        }
        for segment in &self.segments {
            for &c in segment.coords() {
                if out.last() != Some(&c) {
                    out.push(c);
                }
            }
        }
        if self.is_closed() && out.len() > 1 && out.first() == out.last() {
            out.pop();
        }
        out
    }

    // --- Seed placement ---

    /// Snap a raw point the way the session is configured to.
    fn snap_raw(&self, raw: Point) -> Result<GridCoord, ScissorsError> {
        let coord = to_grid(raw, &self.field).ok_or_else(|| {
            ScissorsError::InvalidState(format!(
                "cannot place ({}, {}) on a {}x{} field",
                raw.x,
                raw.y,
                self.field.width(),
                self.field.height()
            ))
        })?;
        if !self.config.snap_enabled {
            return Ok(coord);
        }
        let radius = if self.config.adaptive_snap {
            adaptive_radius(
                &self.field,
                coord,
                self.config.snap_radius,
                self.config.snap_edge_threshold,
            )
        } else {
            self.config.snap_radius
        };
        Ok(snap(coord, &self.field, radius))
    }

    fn near_first_seed(&self, coord: GridCoord) -> bool {
        self.seeds
            .first()
            .is_some_and(|first| coord.distance(first.coord) < self.config.closing_radius)
    }

    fn can_close(&self) -> bool {
        self.seeds.len() >= self.config.min_seeds_to_close
    }

    fn tail(&self) -> TailHint {
        TailHint::from_segments(self.segments.iter().map(PathSegment::coords))
    }

    /// Snap a click and decide what it does.
    ///
    /// The first click commits immediately. A click within the closing
    /// radius of the first seed requests the closing segment once enough
    /// seeds exist. Any other click requests the segment from the last
    /// seed to the snapped position. Nothing is appended until the
    /// response is [`apply`](Self::apply)-ed; a newer request supersedes
    /// an older pending one.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidState`] when the contour is already
    /// closed or the field is empty.
    pub fn begin_seed(&mut self, raw: Point) -> Result<SeedOutcome, ScissorsError> {
        if self.is_closed() {
            return Err(ScissorsError::InvalidState(
                "contour is closed; undo or cancel before placing seeds".to_string(),
            ));
        }
        let coord = self.snap_raw(raw)?;

        let Some(last) = self.seeds.last().map(|s| s.coord) else {
            self.bump_generation();
            self.seeds.push(SeedPoint::user(coord));
            self.commits.push(Commit {
                seeds: 1,
                segments: 0,
            });
            self.state = SessionState::Collecting;
            tracing::info!(seed = %coord, "contour started");
            return Ok(SeedOutcome::Started(coord));
        };

        let closing = self.near_first_seed(coord);
        if closing && !self.can_close() {
            tracing::debug!(
                seed = %coord,
                seeds = self.seeds.len(),
                "click near first seed ignored: too few seeds to close"
            );
            return Ok(SeedOutcome::Ignored);
        }
        if !closing && coord == last {
            return Ok(SeedOutcome::Ignored);
        }

        let end = if closing {
            self.seeds.first().map_or(coord, |s| s.coord)
        } else {
            coord
        };
        self.bump_generation();
        let request = SegmentRequest {
            generation: self.generation,
            start: last,
            end,
            closing,
        };
        if let Some(previous) = self.pending.replace(request) {
            self.counters.dropped_clicks += 1;
            tracing::info!(
                dropped = %previous.end,
                superseded = previous.generation,
                generation = request.generation,
                "click dropped: superseded by a newer click before its segment was applied"
            );
        }
        Ok(SeedOutcome::Pending(self.job(request)))
    }

    fn job(&self, request: SegmentRequest) -> SegmentJob {
        SegmentJob {
            request,
            field: Arc::clone(&self.field),
            cache: Arc::clone(&self.cache),
            cost: self.config.cost_function,
            anchor: self.config.auto_anchor.clone(),
            tail: self.tail(),
        }
    }

    /// Splice a finished response into the session.
    ///
    /// Responses to anything but the latest pending request are dropped
    /// as [`Placement::Stale`].
    ///
    /// # Errors
    ///
    /// Returns the computation's error when it failed. The seeds and
    /// segments are left exactly as they were.
    pub fn apply(&mut self, response: SegmentResponse) -> Result<Placement, ScissorsError> {
        let SegmentResponse {
            request,
            outcome,
            elapsed,
        } = response;
        if self.pending != Some(request) {
            self.counters.stale_responses += 1;
            tracing::warn!(
                generation = request.generation,
                current = self.generation,
                "discarding stale segment result"
            );
            return Ok(Placement::Stale);
        }
        self.pending = None;

        let plan = match outcome {
            Ok(plan) => plan,
            Err(e) => {
                self.counters.failed_responses += 1;
                tracing::warn!(error = %e, start = %request.start, end = %request.end, "segment computation failed");
                return Err(e);
            }
        };
        self.counters.record_segment(elapsed);

        let auto_anchors = plan.anchors.len();
        let seeds_added = auto_anchors + usize::from(!request.closing);
        self.seeds
            .extend(plan.anchors.iter().copied().map(SeedPoint::auto));
        if !request.closing {
            self.seeds.push(SeedPoint::user(request.end));
        }
        let segments_added = plan.segments.len();
        self.segments.extend(plan.segments);
        self.commits.push(Commit {
            seeds: seeds_added,
            segments: segments_added,
        });
        self.live = None;

        if request.closing {
            self.state = SessionState::Completed;
            tracing::info!(
                seeds = self.seeds.len(),
                segments = self.segments.len(),
                "contour closed"
            );
            Ok(Placement::Closed)
        } else {
            self.state = SessionState::Collecting;
            tracing::info!(
                seed = %request.end,
                auto_anchors,
                seeds = self.seeds.len(),
                "seed placed"
            );
            Ok(Placement::Extended { auto_anchors })
        }
    }

    /// Place a seed, computing its segment on the calling thread.
    ///
    /// # Errors
    ///
    /// Same as [`begin_seed`](Self::begin_seed) and
    /// [`apply`](Self::apply).
    pub fn place_seed(&mut self, raw: Point) -> Result<Placement, ScissorsError> {
        match self.begin_seed(raw)? {
            SeedOutcome::Started(_) => Ok(Placement::Started),
            SeedOutcome::Ignored => Ok(Placement::Ignored),
            SeedOutcome::Pending(job) => self.apply(worker::run_job(job)),
        }
    }

    // --- Live segment ---

    /// Recompute the live segment from the last seed to the snapped
    /// pointer position, at most once per live interval.
    ///
    /// Also toggles between `Collecting` and `Closing` depending on
    /// whether the pointer is within the closing radius of the first seed
    /// (once enough seeds exist to close).
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidState`] for a point that cannot be
    /// mapped onto the field, and propagates search errors.
    pub fn move_live(&mut self, raw: Point) -> Result<LiveUpdate, ScissorsError> {
        if !matches!(self.state, SessionState::Collecting | SessionState::Closing) {
            return Ok(LiveUpdate::Inactive);
        }
        let Some(last) = self.seeds.last().map(|s| s.coord) else {
            return Ok(LiveUpdate::Inactive);
        };
        let interval = Duration::from_millis(self.config.live_interval_ms);
        if let Some(previous) = self.last_live
            && self.clock.elapsed(&previous) < interval
        {
            self.counters.live_throttled += 1;
            return Ok(LiveUpdate::Throttled);
        }

        let started = self.clock.now();
        let target = self.snap_raw(raw)?;
        let closing = self.near_first_seed(target) && self.can_close();
        self.state = if closing {
            SessionState::Closing
        } else {
            SessionState::Collecting
        };
        let result = find_path_with(&self.field, &self.config.cost_function, last, target)?;
        self.last_live_stats = Some(result.stats);
        self.live = Some(result.path);
        self.counters.live_updates += 1;
        self.counters.live_time += self.clock.elapsed(&started);
        self.last_live = Some(started);
        Ok(LiveUpdate::Updated)
    }

    // --- Undo / cancel / replace ---

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Drop in-flight work and the live segment and clear the cache.
    fn reset_transient(&mut self) {
        self.bump_generation();
        self.pending = None;
        self.live = None;
        self.last_live = None;
        self.cache.invalidate_all();
    }

    /// Remove the most recent commit.
    ///
    /// From `Completed` this reopens the contour by removing the closing
    /// segment. Otherwise it pops the last user seed together with its
    /// segment and any auto anchors inserted for it. Returns `false` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(commit) = self.commits.pop() else {
            return false;
        };
        let seeds_left = self.seeds.len().saturating_sub(commit.seeds);
        let segments_left = self.segments.len().saturating_sub(commit.segments);
        self.seeds.truncate(seeds_left);
        self.segments.truncate(segments_left);
        self.reset_transient();
        self.state = if self.seeds.is_empty() {
            SessionState::Idle
        } else {
            SessionState::Collecting
        };
        tracing::info!(
            seeds = self.seeds.len(),
            segments = self.segments.len(),
            state = ?self.state,
            "undo"
        );
        true
    }

    /// Clear seeds, segments and the cache, returning to `Idle`.
    pub fn cancel(&mut self) {
        self.seeds.clear();
        self.segments.clear();
        self.commits.clear();
        self.reset_transient();
        self.state = SessionState::Idle;
        tracing::info!("session cancelled");
    }

    /// Swap in the field of a new image.
    ///
    /// A fresh cache replaces the old one (which in-flight jobs may
    /// still hold), and the session restarts from `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] if the cache cannot be
    /// rebuilt; the session is left untouched.
    pub fn replace_field(&mut self, field: GradientField) -> Result<(), ScissorsError> {
        let cache = Arc::new(PathCache::new(self.config.cache_capacity)?);
        let (width, height) = (field.width(), field.height());
        self.field = Arc::new(field);
        self.cache = cache;
        self.seeds.clear();
        self.segments.clear();
        self.commits.clear();
        self.reset_transient();
        self.state = SessionState::Idle;
        tracing::info!(width, height, "image replaced");
        Ok(())
    }

    /// Switch cost model and recompute every committed segment under it.
    ///
    /// A fresh cache replaces the old one. Jobs still in flight hold the
    /// old cache, so their old-cost paths never reach the new one.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] for invalid weights, or a
    /// search error from [`recompute_all`](Self::recompute_all); on error
    /// the previous cost model, cache and segments are kept.
    pub fn set_cost_function(&mut self, cost: CostFunctionKind) -> Result<(), ScissorsError> {
        cost.validate()?;
        let cache = Arc::new(PathCache::new(self.config.cache_capacity)?);
        let previous = std::mem::replace(&mut self.config.cost_function, cost);
        let previous_cache = std::mem::replace(&mut self.cache, cache);
        if let Err(e) = self.recompute_all() {
            self.config.cost_function = previous;
            self.cache = previous_cache;
            return Err(e);
        }
        tracing::info!(?cost, "cost function switched");
        Ok(())
    }

    /// Clear the cache and recompute every committed segment from the
    /// seed list. Seeds (auto anchors included) stay where they are.
    ///
    /// # Errors
    ///
    /// Propagates search errors; segments are only replaced once all of
    /// them have been recomputed.
    pub fn recompute_all(&mut self) -> Result<(), ScissorsError> {
        self.reset_transient();
        let search = CachedSearch::new(&self.field, &self.config.cost_function, &self.cache);
        let mut segments = Vec::with_capacity(self.segments.len());
        for pair in self.seeds.windows(2) {
            segments.push(search.search(pair[0].coord, pair[1].coord)?);
        }
        if self.is_closed()
            && let (Some(first), Some(last)) = (self.seeds.first(), self.seeds.last())
        {
            segments.push(search.search(last.coord, first.coord)?);
        }
        tracing::info!(segments = segments.len(), "recomputed committed segments");
        self.segments = segments;
        Ok(())
    }

    // --- Diagnostics ---

    /// Snapshot of the session's metrics.
    #[must_use]
    pub fn diagnostics(&self) -> SessionDiagnostics {
        let auto_seeds = self.seeds.iter().filter(|s| s.auto_generated).count();
        let path = self.committed_path();
        let mut path_length: f64 = path.windows(2).map(|w| w[0].distance(w[1])).sum();
        if self.is_closed()
            && let (Some(first), Some(last)) = (path.first(), path.last())
        {
            path_length += last.distance(*first);
        }
        let c = self.counters;
        SessionDiagnostics {
            image_width: self.field.width(),
            image_height: self.field.height(),
            complexity: self.field.complexity(),
            state: self.state,
            user_seeds: self.seeds.len() - auto_seeds,
            auto_seeds,
            segments: self.segments.len(),
            committed_points: path.len(),
            path_length,
            segments_computed: c.segments_computed,
            segment_time: c.segment_time,
            slowest_segment: c.slowest_segment,
            stale_responses: c.stale_responses,
            failed_responses: c.failed_responses,
            dropped_clicks: c.dropped_clicks,
            live_updates: c.live_updates,
            live_throttled: c.live_throttled,
            live_time: c.live_time,
            last_live_search: self.last_live_stats,
            cache: self.cache.stats(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use image::GrayImage;

    use super::*;
    use crate::diagnostics::ManualClock;
    use crate::gradient::build_gradient_field;

    fn flat_config() -> SessionConfig {
        SessionConfig {
            snap_enabled: false,
            ..SessionConfig::default()
        }
    }

    fn session(size: u32) -> Session<ManualClock> {
        let field = build_gradient_field(&GrayImage::new(size, size));
        Session::with_clock(field, flat_config(), ManualClock::new()).unwrap()
    }

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let field = build_gradient_field(&GrayImage::new(4, 4));
        let config = SessionConfig {
            cache_capacity: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            Session::new(field, config),
            Err(ScissorsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn first_seed_starts_collecting() {
        let mut s = session(32);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.place_seed(p(3.0, 4.0)).unwrap(), Placement::Started);
        assert_eq!(s.state(), SessionState::Collecting);
        assert_eq!(s.seeds(), &[SeedPoint::user(GridCoord::new(3, 4))]);
        assert!(s.segments().is_empty());
        assert_eq!(s.committed_path(), vec![GridCoord::new(3, 4)]);
    }

    #[test]
    fn segments_chain_between_seeds() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(20.0, 0.0)).unwrap();
        s.place_seed(p(20.0, 20.0)).unwrap();
        assert_eq!(s.seeds().len(), 3);
        assert_eq!(s.segments().len(), 2);
        assert_eq!(s.segments()[0].last(), s.segments()[1].first());
        assert_eq!(s.segments()[0].first(), Some(GridCoord::new(0, 0)));
        assert_eq!(s.segments()[1].last(), Some(GridCoord::new(20, 20)));
    }

    #[test]
    fn repeated_click_is_ignored() {
        let mut s = session(16);
        s.place_seed(p(5.0, 5.0)).unwrap();
        assert_eq!(s.place_seed(p(5.2, 4.8)).unwrap(), Placement::Ignored);
        assert_eq!(s.seeds().len(), 1);
    }

    #[test]
    fn click_near_first_seed_closes_after_three_seeds() {
        let mut s = session(64);
        s.place_seed(p(10.0, 10.0)).unwrap();
        s.place_seed(p(50.0, 10.0)).unwrap();
        // Too few seeds to close: ignored.
        assert_eq!(s.place_seed(p(12.0, 11.0)).unwrap(), Placement::Ignored);
        s.place_seed(p(50.0, 50.0)).unwrap();
        assert_eq!(s.place_seed(p(12.0, 11.0)).unwrap(), Placement::Closed);
        assert!(s.is_closed());
        assert_eq!(s.segments().len(), s.seeds().len());
        assert_eq!(s.segments().last().unwrap().last(), Some(GridCoord::new(10, 10)));
        let path = s.committed_path();
        assert_eq!(path.first(), Some(&GridCoord::new(10, 10)));
        assert_ne!(path.last(), Some(&GridCoord::new(10, 10)));
    }

    #[test]
    fn placing_after_close_is_rejected() {
        let mut s = session(64);
        for (x, y) in [(10.0, 10.0), (50.0, 10.0), (50.0, 50.0), (11.0, 10.0)] {
            s.place_seed(p(x, y)).unwrap();
        }
        assert!(matches!(
            s.place_seed(p(30.0, 30.0)),
            Err(ScissorsError::InvalidState(_))
        ));
    }

    #[test]
    fn undo_from_completed_reopens() {
        let mut s = session(64);
        for (x, y) in [(10.0, 10.0), (50.0, 10.0), (50.0, 50.0), (11.0, 10.0)] {
            s.place_seed(p(x, y)).unwrap();
        }
        assert!(s.undo());
        assert_eq!(s.state(), SessionState::Collecting);
        assert_eq!(s.seeds().len(), 3);
        assert_eq!(s.segments().len(), 2);
    }

    #[test]
    fn undo_to_empty_returns_to_idle() {
        let mut s = session(16);
        s.place_seed(p(1.0, 1.0)).unwrap();
        assert!(s.undo());
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.undo());
    }

    #[test]
    fn cancel_clears_everything() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(9.0, 9.0)).unwrap();
        assert!(!s.cache().is_empty());
        s.cancel();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.seeds().is_empty());
        assert!(s.segments().is_empty());
        assert!(s.cache().is_empty());
        assert!(s.committed_path().is_empty());
    }

    #[test]
    fn stale_response_is_dropped() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        let SeedOutcome::Pending(job) = s.begin_seed(p(10.0, 0.0)).unwrap() else {
            panic!("expected a pending job");
        };
        let response = worker::run_job(job);
        s.undo();
        assert_eq!(s.apply(response).unwrap(), Placement::Stale);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.seeds().is_empty());
        assert_eq!(s.diagnostics().stale_responses, 1);
    }

    #[test]
    fn newer_request_supersedes_pending_one() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        let SeedOutcome::Pending(old) = s.begin_seed(p(10.0, 0.0)).unwrap() else {
            panic!("expected a pending job");
        };
        let SeedOutcome::Pending(new) = s.begin_seed(p(0.0, 10.0)).unwrap() else {
            panic!("expected a pending job");
        };
        assert_eq!(s.apply(worker::run_job(old)).unwrap(), Placement::Stale);
        assert_eq!(
            s.apply(worker::run_job(new)).unwrap(),
            Placement::Extended { auto_anchors: 0 }
        );
        assert_eq!(s.seeds().last().unwrap().coord, GridCoord::new(0, 10));
        assert_eq!(s.diagnostics().dropped_clicks, 1);
    }

    #[test]
    fn failed_response_leaves_state_untouched() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        let SeedOutcome::Pending(job) = s.begin_seed(p(10.0, 0.0)).unwrap() else {
            panic!("expected a pending job");
        };
        let response = SegmentResponse {
            request: job.request,
            outcome: Err(ScissorsError::Worker("boom".to_string())),
            elapsed: Duration::ZERO,
        };
        assert!(matches!(s.apply(response), Err(ScissorsError::Worker(_))));
        assert_eq!(s.seeds().len(), 1);
        assert!(s.segments().is_empty());
        assert!(s.pending().is_none());
        assert_eq!(s.diagnostics().failed_responses, 1);
    }

    #[test]
    fn live_move_is_throttled() {
        let mut s = session(32);
        assert_eq!(s.move_live(p(5.0, 5.0)).unwrap(), LiveUpdate::Inactive);
        s.place_seed(p(0.0, 0.0)).unwrap();
        assert_eq!(s.move_live(p(5.0, 5.0)).unwrap(), LiveUpdate::Updated);
        assert_eq!(s.live_segment().unwrap().last(), Some(GridCoord::new(5, 5)));
        assert_eq!(s.move_live(p(6.0, 6.0)).unwrap(), LiveUpdate::Throttled);
        s.clock().advance(Duration::from_millis(50));
        assert_eq!(s.move_live(p(6.0, 6.0)).unwrap(), LiveUpdate::Updated);
        assert_eq!(s.live_segment().unwrap().last(), Some(GridCoord::new(6, 6)));
        let diag = s.diagnostics();
        assert_eq!((diag.live_updates, diag.live_throttled), (2, 1));
    }

    #[test]
    fn live_move_near_first_seed_enters_closing() {
        let mut s = session(64);
        for (x, y) in [(10.0, 10.0), (50.0, 10.0), (50.0, 50.0)] {
            s.place_seed(p(x, y)).unwrap();
        }
        s.move_live(p(12.0, 12.0)).unwrap();
        assert_eq!(s.state(), SessionState::Closing);
        s.clock().advance(Duration::from_millis(50));
        s.move_live(p(30.0, 40.0)).unwrap();
        assert_eq!(s.state(), SessionState::Collecting);
    }

    #[test]
    fn committing_clears_live_segment() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.move_live(p(5.0, 5.0)).unwrap();
        s.place_seed(p(5.0, 5.0)).unwrap();
        assert!(s.live_segment().is_none());
    }

    #[test]
    fn replace_field_resets_session() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(9.0, 0.0)).unwrap();
        let old_cache = Arc::clone(s.cache());
        s.replace_field(build_gradient_field(&GrayImage::new(8, 8)))
            .unwrap();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(s.seeds().is_empty());
        assert!(!Arc::ptr_eq(&old_cache, s.cache()));
        assert_eq!(s.field().width(), 8);
    }

    #[test]
    fn set_cost_function_recomputes_segments() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(20.0, 7.0)).unwrap();
        let kind = CostFunctionKind::DirectionWeighted(crate::cost::DirectionWeightedConfig::default());
        s.set_cost_function(kind).unwrap();
        assert_eq!(s.config().cost_function, kind);
        assert_eq!(s.segments().len(), 1);
        assert_eq!(s.segments()[0].first(), Some(GridCoord::new(0, 0)));
        assert_eq!(s.segments()[0].last(), Some(GridCoord::new(20, 7)));
        assert!(s.segments()[0].is_connected());
    }

    #[test]
    fn cost_switch_keeps_in_flight_paths_out_of_cache() {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            image::Luma([u8::try_from((x * 37 + y * 91 + x * y) % 256).unwrap()])
        });
        let mut config = flat_config();
        config.auto_anchor.enabled = false;
        let mut s =
            Session::with_clock(build_gradient_field(&img), config, ManualClock::new()).unwrap();
        let (start, end) = (GridCoord::new(0, 0), GridCoord::new(27, 13));
        s.place_seed(p(0.0, 0.0)).unwrap();
        let SeedOutcome::Pending(old) = s.begin_seed(p(27.0, 13.0)).unwrap() else {
            panic!("expected a pending job");
        };

        let kind = CostFunctionKind::DirectionWeighted(crate::cost::DirectionWeightedConfig::default());
        s.set_cost_function(kind).unwrap();
        // The old job finishes after the switch, writing into the old cache.
        let late = worker::run_job(old);
        assert!(!s.cache().contains(start, end));
        assert_eq!(s.apply(late).unwrap(), Placement::Stale);

        s.place_seed(p(27.0, 13.0)).unwrap();
        let expected = find_path_with(s.field(), &kind, start, end).unwrap().path;
        assert_eq!(s.segments()[0], expected);
    }

    #[test]
    fn failed_cost_switch_keeps_previous_cache() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(9.0, 9.0)).unwrap();
        let cache = Arc::clone(s.cache());
        let invalid = CostFunctionKind::DirectionWeighted(crate::cost::DirectionWeightedConfig {
            edge_weight: -1.0,
            ..crate::cost::DirectionWeightedConfig::default()
        });
        assert!(s.set_cost_function(invalid).is_err());
        assert!(Arc::ptr_eq(&cache, s.cache()));
        assert_eq!(s.config().cost_function, CostFunctionKind::InverseGradient);
    }

    #[test]
    fn out_of_field_click_is_clamped() {
        let mut s = session(16);
        s.place_seed(p(-4.0, 40.0)).unwrap();
        assert_eq!(s.seeds()[0].coord, GridCoord::new(0, 15));
    }

    #[test]
    fn snapping_moves_click_onto_edge() {
        let img = GrayImage::from_fn(32, 32, |x, _| image::Luma(if x < 16 { [0] } else { [255] }));
        let field = build_gradient_field(&img);
        let mut s = Session::with_clock(field, SessionConfig::default(), ManualClock::new()).unwrap();
        s.place_seed(p(12.0, 16.0)).unwrap();
        let x = s.seeds()[0].coord.x;
        assert!(x == 15 || x == 16, "expected snap onto the edge, got x = {x}");
    }

    #[test]
    fn diagnostics_count_seeds_and_segments() {
        let mut s = session(32);
        s.place_seed(p(0.0, 0.0)).unwrap();
        s.place_seed(p(10.0, 0.0)).unwrap();
        let d = s.diagnostics();
        assert_eq!(d.user_seeds, 2);
        assert_eq!(d.auto_seeds, 0);
        assert_eq!(d.segments, 1);
        // Diagonal steps are discounted on a flat field, so the route may
        // zig-zag, but it always takes ten steps.
        assert_eq!(d.committed_points, 11);
        assert!(d.path_length >= 10.0 - 1e-9);
        assert!(d.path_length <= 10.0 * std::f64::consts::SQRT_2 + 1e-9);
        assert_eq!(d.segments_computed, 1);
    }
}
