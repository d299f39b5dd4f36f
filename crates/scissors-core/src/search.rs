//! Minimum-cost path search over the implicit 8-connected pixel grid.
//!
//! Dijkstra's algorithm with a binary min-heap keyed by tentative
//! distance. Every coordinate is finalized at most once (a visited bitmap
//! guards against reprocessing stale heap entries) and the search stops
//! the moment the end coordinate is dequeued, so the work done is bounded
//! by the explored region rather than the whole image.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::cost::{CostFunction, CostFunctionKind};
use crate::gradient::GradientField;
use crate::types::{GridCoord, PathSegment, ScissorsError};

/// Offsets of the 8 neighbours, in row-major order.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Work counters for a single search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Coordinates finalized (dequeued for the first time).
    pub explored: usize,
    /// Heap insertions, including ones later skipped as stale.
    pub pushed: usize,
}

/// Outcome of a path search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Sum of edge costs along `path`, or [`PathResult::NO_PATH_COST`].
    pub total_cost: f64,
    /// Coordinates from start to end, inclusive.
    pub path: PathSegment,
    /// Work counters.
    pub stats: SearchStats,
}

impl PathResult {
    /// Sentinel cost of the "no path" result.
    pub const NO_PATH_COST: f64 = -1.0;

    /// The "no path" result: empty path with a negative cost.
    #[must_use]
    pub fn none() -> Self {
        Self {
            total_cost: Self::NO_PATH_COST,
            path: PathSegment::default(),
            stats: SearchStats::default(),
        }
    }

    /// Returns `true` unless this is the "no path" result.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.total_cost >= 0.0 && !self.path.is_empty()
    }

    /// Collapse a search outcome into the sentinel form, for callers that
    /// treat a negative cost as "no path" instead of matching on errors.
    #[must_use]
    pub fn from_search(result: Result<Self, ScissorsError>) -> Self {
        result.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "search failed, returning sentinel result");
            Self::none()
        })
    }
}

/// Heap entry ordered so that [`BinaryHeap`] pops the cheapest first.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    index: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; index breaks ties so results are
        // reproducible.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn neighbor(field: &GradientField, c: GridCoord, dx: i32, dy: i32) -> Option<GridCoord> {
    let n = GridCoord::new(c.x.checked_add_signed(dx)?, c.y.checked_add_signed(dy)?);
    field.contains(n).then_some(n)
}

/// Find the minimum-cost path with the default inverse-gradient cost.
///
/// # Errors
///
/// Returns [`ScissorsError::OutOfBounds`] if either endpoint lies outside
/// the field, and [`ScissorsError::NoPathFound`] if the end is never
/// reached (which indicates a defect on a rectangular grid).
pub fn find_path(
    field: &GradientField,
    start: GridCoord,
    end: GridCoord,
) -> Result<PathResult, ScissorsError> {
    find_path_with(field, &CostFunctionKind::InverseGradient, start, end)
}

/// Find the minimum-cost path under an arbitrary cost model.
///
/// The cost model receives the predecessor of the coordinate being
/// expanded, so direction-aware models see the step the search actually
/// took to get there.
///
/// # Errors
///
/// Same as [`find_path`].
pub fn find_path_with<C: CostFunction + ?Sized>(
    field: &GradientField,
    cost_fn: &C,
    start: GridCoord,
    end: GridCoord,
) -> Result<PathResult, ScissorsError> {
    field.check_bounds(start)?;
    field.check_bounds(end)?;

    if start == end {
        return Ok(PathResult {
            total_cost: 0.0,
            path: PathSegment::single(start),
            stats: SearchStats::default(),
        });
    }

    let n = field.magnitudes().len();
    let mut dist = vec![f64::INFINITY; n];
    let mut pred: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut heap = BinaryHeap::new();
    let mut stats = SearchStats::default();

    let start_index = field.index(start);
    let end_index = field.index(end);
    dist[start_index] = 0.0;
    heap.push(Frontier {
        cost: 0.0,
        index: start_index,
    });
    stats.pushed += 1;

    while let Some(Frontier { cost, index }) = heap.pop() {
        if visited[index] {
            continue;
        }
        visited[index] = true;
        stats.explored += 1;

        if index == end_index {
            let path = reconstruct(field, &pred, end_index);
            tracing::debug!(
                %start,
                %end,
                cost,
                explored = stats.explored,
                pushed = stats.pushed,
                points = path.len(),
                "path search finished"
            );
            return Ok(PathResult {
                total_cost: cost,
                path,
                stats,
            });
        }

        let from = field.coord(index);
        let previous = pred[index].map(|p| field.coord(p));
        for (dx, dy) in NEIGHBOR_OFFSETS {
            let Some(to) = neighbor(field, from, dx, dy) else {
                continue;
            };
            let to_index = field.index(to);
            if visited[to_index] {
                continue;
            }
            let step = cost_fn.step_cost(field, previous, from, to);
            if !step.is_finite() || step < 0.0 {
                continue;
            }
            let candidate = cost + step;
            if candidate < dist[to_index] {
                dist[to_index] = candidate;
                pred[to_index] = Some(index);
                heap.push(Frontier {
                    cost: candidate,
                    index: to_index,
                });
                stats.pushed += 1;
            }
        }
    }

    tracing::error!(
        %start,
        %end,
        explored = stats.explored,
        "search exhausted the reachable region without reaching the end"
    );
    Err(ScissorsError::NoPathFound { start, end })
}

/// Walk predecessors back from `end_index` and return the forward path.
fn reconstruct(field: &GradientField, pred: &[Option<usize>], end_index: usize) -> PathSegment {
    let mut coords = vec![field.coord(end_index)];
    let mut cursor = end_index;
    while let Some(p) = pred[cursor] {
        coords.push(field.coord(p));
        cursor = p;
    }
    coords.reverse();
    PathSegment::new(coords)
}

/// Something that can produce a segment between two coordinates.
///
/// The auto-anchor planner recurses through this trait so it can run
/// against a plain search or a cache-backed one.
pub trait SegmentSearch {
    /// Compute the segment from `start` to `end`, inclusive of both.
    ///
    /// # Errors
    ///
    /// Propagates [`ScissorsError`] from the underlying search.
    fn search(&self, start: GridCoord, end: GridCoord) -> Result<PathSegment, ScissorsError>;
}

/// Uncached search under a fixed cost model.
#[derive(Debug, Clone, Copy)]
pub struct DirectSearch<'a, C: ?Sized = CostFunctionKind> {
    field: &'a GradientField,
    cost: &'a C,
}

impl<'a, C: CostFunction + ?Sized> DirectSearch<'a, C> {
    /// Search `field` with `cost`.
    #[must_use]
    pub const fn new(field: &'a GradientField, cost: &'a C) -> Self {
        Self { field, cost }
    }
}

impl<C: CostFunction + ?Sized> SegmentSearch for DirectSearch<'_, C> {
    fn search(&self, start: GridCoord, end: GridCoord) -> Result<PathSegment, ScissorsError> {
        Ok(find_path_with(self.field, self.cost, start, end)?.path)
    }
}
