//! Property-based invariant tests for path search, the path cache, the
//! snapper and the auto-anchor planner.
//!
//! 1. A search from a coordinate to itself is that coordinate at cost 0
//! 2. Found paths start and end at the requested endpoints and are
//!    8-connected
//! 3. Search is deterministic
//! 4. Cached search returns what a direct search returns
//! 5. A full cache holds exactly its capacity and evicts the least
//!    recently used keys
//! 6. The planner terminates with a chained path for any field
//! 7. The global gradient maximum is a snap fixed point

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use scissors_core::anchor::{AnchorConfig, AutoAnchorPlanner, TailHint};
use scissors_core::cache::{CachedSearch, PathCache};
use scissors_core::cost::CostFunctionKind;
use scissors_core::search::{DirectSearch, SegmentSearch, find_path};
use scissors_core::{GradientField, GridCoord, PathSegment, snap};

// ── Strategies ──────────────────────────────────────────────────────────

/// A field of 2x2 to 16x16 pixels with arbitrary magnitudes.
fn field_strategy() -> impl Strategy<Value = GradientField> {
    (2u32..16, 2u32..16).prop_flat_map(|(w, h)| {
        prop::collection::vec(0.0f64..1000.0, (w * h) as usize).prop_map(move |mags| {
            GradientField::from_magnitudes(w, h, mags).unwrap()
        })
    })
}

/// A field plus two in-bounds coordinates.
fn field_and_endpoints() -> impl Strategy<Value = (GradientField, GridCoord, GridCoord)> {
    field_strategy().prop_flat_map(|field| {
        let (w, h) = (field.width(), field.height());
        (
            Just(field),
            (0..w, 0..h).prop_map(|(x, y)| GridCoord::new(x, y)),
            (0..w, 0..h).prop_map(|(x, y)| GridCoord::new(x, y)),
        )
    })
}

fn assert_chained(segment: &PathSegment, start: GridCoord, end: GridCoord) {
    assert_eq!(segment.first(), Some(start));
    assert_eq!(segment.last(), Some(end));
    assert!(segment.is_connected(), "gap in {segment:?}");
}

// ═══════════════════════════════════════════════════════════════════════
// 1-3. Search
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn path_to_self_is_trivial((field, p, _) in field_and_endpoints()) {
        let result = find_path(&field, p, p).unwrap();
        prop_assert_eq!(result.path.coords(), &[p]);
        prop_assert!(result.total_cost.abs() < f64::EPSILON);
    }

    #[test]
    fn path_connects_endpoints((field, a, b) in field_and_endpoints()) {
        let result = find_path(&field, a, b).unwrap();
        assert_chained(&result.path, a, b);
        prop_assert!(result.total_cost >= 0.0);
        prop_assert!(result.is_found());
        // No coordinate is visited twice on a shortest path.
        let mut coords = result.path.coords().to_vec();
        coords.sort_unstable();
        coords.dedup();
        prop_assert_eq!(coords.len(), result.path.len());
    }

    #[test]
    fn search_is_deterministic((field, a, b) in field_and_endpoints()) {
        let first = find_path(&field, a, b).unwrap();
        let second = find_path(&field, a, b).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn out_of_bounds_end_is_rejected((field, a, _) in field_and_endpoints()) {
        let outside = GridCoord::new(field.width(), 0);
        prop_assert!(find_path(&field, a, outside).is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 4-5. Cache
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn cached_search_matches_direct_search((field, a, b) in field_and_endpoints()) {
        let cost = CostFunctionKind::default();
        let cache = PathCache::new(4).unwrap();
        let cached = CachedSearch::new(&field, &cost, &cache);
        let direct = DirectSearch::new(&field, &cost);

        let expected = direct.search(a, b).unwrap();
        prop_assert_eq!(&cached.search(a, b).unwrap(), &expected);
        // Second lookup is a hit and returns the same path.
        prop_assert_eq!(&cached.search(a, b).unwrap(), &expected);
        prop_assert!(cache.stats().hits >= 1);

        // The reverse direction is served from the same entry, oriented.
        let reverse = cached.search(b, a).unwrap();
        assert_chained(&reverse, b, a);
        prop_assert_eq!(reverse.len(), expected.len());
    }

    #[test]
    fn cache_evicts_least_recently_used(
        capacity in 1usize..8,
        extra in 0usize..12,
        touches in prop::collection::vec(0usize..8, 0..8),
    ) {
        let cache = PathCache::new(capacity).unwrap();
        let key = |i: usize| {
            let i = u32::try_from(i).unwrap();
            (GridCoord::new(i, 0), GridCoord::new(i, 1))
        };
        // Recency order, least recent first.
        let mut order: Vec<usize> = Vec::new();

        for i in 0..capacity {
            let (a, b) = key(i);
            cache.put(a, b, PathSegment::new(vec![a, b]));
            order.push(i);
        }
        for t in touches {
            let i = t % capacity;
            let (a, b) = key(i);
            prop_assert!(cache.get(b, a).is_some());
            order.retain(|&k| k != i);
            order.push(i);
        }
        for i in capacity..capacity + extra {
            let (a, b) = key(i);
            cache.put(a, b, PathSegment::new(vec![a, b]));
            order.push(i);
            if order.len() > capacity {
                order.remove(0);
            }
            prop_assert_eq!(cache.len(), capacity);
        }

        for i in 0..capacity + extra {
            let (a, b) = key(i);
            prop_assert_eq!(cache.contains(a, b), order.contains(&i), "key {}", i);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 6. Planner
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn planner_terminates_with_chained_path((field, a, b) in field_and_endpoints()) {
        // A tiny threshold forces subdivision wherever a candidate exists.
        let config = AnchorConfig {
            base_threshold: 1.5,
            complexity_span: 0.0,
            gradient_floor: 0.0,
            ..AnchorConfig::default()
        };
        let cost = CostFunctionKind::default();
        let search = DirectSearch::new(&field, &cost);
        let planner = AutoAnchorPlanner::new(&field, &config);

        let plan = planner.plan(&search, a, b, &TailHint::empty()).unwrap();
        prop_assert_eq!(plan.segments.len(), plan.anchors.len() + 1);
        for (i, anchor) in plan.anchors.iter().enumerate() {
            prop_assert_eq!(plan.segments[i].last(), Some(*anchor));
            prop_assert_eq!(plan.segments[i + 1].first(), Some(*anchor));
        }
        assert_chained(&plan.flatten(), a, b);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 7. Snap
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn global_maximum_is_snap_fixed_point(field in field_strategy(), radius in 0u32..20) {
        let peak = field
            .magnitudes()
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.total_cmp(y.1))
            .map(|(i, _)| {
                let i = u32::try_from(i).unwrap();
                GridCoord::new(i % field.width(), i / field.width())
            })
            .unwrap();
        prop_assert_eq!(snap(peak, &field, radius), peak);
    }

    #[test]
    fn snap_stays_within_radius((field, p, _) in field_and_endpoints(), radius in 0u32..6) {
        let snapped = snap(p, &field, radius);
        prop_assert!(p.chebyshev_distance(snapped) <= radius);
        prop_assert!(field.magnitude(snapped) >= field.magnitude(p));
    }
}
