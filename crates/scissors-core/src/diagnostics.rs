//! Session diagnostics: counts, cache behaviour and search timings.
//!
//! Collected continuously by [`Session`](crate::Session) and exposed via
//! [`Session::diagnostics`](crate::Session::diagnostics) for tuning the
//! snap radius, the planner thresholds and the cost model.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::search::SearchStats;
use crate::session::SessionState;

/// Source of monotonic time for live-move throttling and timings.
///
/// Abstracted so tests can drive time by hand.
pub trait Clock {
    /// Opaque point in time.
    type Instant: Copy;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Hand-driven [`Clock`]. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock stopped at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`, saturating at the maximum.
    pub fn advance(&self, by: Duration) {
        let step = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_add(step))
            });
    }
}

impl Clock for ManualClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn elapsed(&self, since: &Duration) -> Duration {
        self.now().saturating_sub(*since)
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Running counters kept by the session between snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub segments_computed: u64,
    pub segment_time: Duration,
    pub slowest_segment: Duration,
    pub stale_responses: u64,
    pub failed_responses: u64,
    pub dropped_clicks: u64,
    pub live_updates: u64,
    pub live_throttled: u64,
    pub live_time: Duration,
}

impl Counters {
    pub(crate) fn record_segment(&mut self, elapsed: Duration) {
        self.segments_computed += 1;
        self.segment_time += elapsed;
        self.slowest_segment = self.slowest_segment.max(elapsed);
    }
}

/// Snapshot of a session's state and accumulated metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDiagnostics {
    /// Field width in pixels.
    pub image_width: u32,
    /// Field height in pixels.
    pub image_height: u32,
    /// Image complexity (mean over max gradient magnitude).
    pub complexity: f64,
    /// Current state.
    pub state: SessionState,
    /// Seeds placed by the user.
    pub user_seeds: usize,
    /// Seeds inserted by the auto-anchor planner.
    pub auto_seeds: usize,
    /// Committed segments.
    pub segments: usize,
    /// Points in the flattened committed path.
    pub committed_points: usize,
    /// Euclidean length of the committed path in pixels.
    pub path_length: f64,
    /// Segment computations applied (cache hits included).
    pub segments_computed: u64,
    /// Total time spent computing applied segments (seconds).
    #[serde(with = "duration_serde")]
    pub segment_time: Duration,
    /// Slowest single segment computation (seconds).
    #[serde(with = "duration_serde")]
    pub slowest_segment: Duration,
    /// Background results discarded because a newer request superseded
    /// them.
    pub stale_responses: u64,
    /// Background computations that failed.
    pub failed_responses: u64,
    /// User clicks dropped because a newer click arrived before their
    /// segment was applied.
    pub dropped_clicks: u64,
    /// Live-segment recomputations performed.
    pub live_updates: u64,
    /// Live moves skipped by the throttle.
    pub live_throttled: u64,
    /// Total time spent on live recomputation (seconds).
    #[serde(with = "duration_serde")]
    pub live_time: Duration,
    /// Work counters of the most recent live search.
    pub last_live_search: Option<SearchStats>,
    /// Path cache counters.
    pub cache: CacheStats,
}

impl SessionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Session Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} (complexity {:.3})",
            self.image_width, self.image_height, self.complexity,
        ));
        lines.push(format!("State: {:?}", self.state));
        lines.push(format!(
            "Seeds: {} user + {} auto  |  Segments: {}",
            self.user_seeds, self.auto_seeds, self.segments,
        ));
        lines.push(format!(
            "Committed path: {} points, {:.1}px",
            self.committed_points, self.path_length,
        ));
        lines.push(String::new());

        lines.push(format!("{:<24} {:>10} {:>12}", "Work", "Count", "Time"));
        lines.push("-".repeat(50));
        lines.push(format!(
            "{:<24} {:>10} {:>10.3}ms",
            "Segment commits",
            self.segments_computed,
            duration_ms(self.segment_time),
        ));
        lines.push(format!(
            "{:<24} {:>10} {:>10.3}ms",
            "Live updates",
            self.live_updates,
            duration_ms(self.live_time),
        ));
        lines.push(format!("{:<24} {:>10}", "Live throttled", self.live_throttled));
        lines.push(format!("{:<24} {:>10}", "Stale responses", self.stale_responses));
        lines.push(format!("{:<24} {:>10}", "Failed responses", self.failed_responses));
        lines.push(format!("{:<24} {:>10}", "Dropped clicks", self.dropped_clicks));
        lines.push(format!(
            "Slowest segment: {:.3}ms",
            duration_ms(self.slowest_segment),
        ));
        if let Some(stats) = self.last_live_search {
            lines.push(format!(
                "Last live search: {} explored, {} pushed",
                stats.explored, stats.pushed,
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Cache: {}/{} entries  |  hits={} misses={} ({:.1}% hit rate)  |  invalidations={}",
            self.cache.len,
            self.cache.capacity,
            self.cache.hits,
            self.cache.misses,
            hit_rate(&self.cache) * 100.0,
            self.cache.invalidations,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn hit_rate(stats: &CacheStats) -> f64 {
    let total = stats.hits + stats.misses;
    if total == 0 {
        0.0
    } else {
        stats.hits as f64 / total as f64
    }
}
