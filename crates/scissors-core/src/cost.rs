//! Edge cost models for the path search.
//!
//! This module defines the [`CostFunction`] trait for pluggable cost models
//! and the [`CostFunctionKind`] enum for selecting one at runtime. The cost
//! function is the sole determinant of search behaviour, so switching
//! models invalidates every cached path.
//!
//! # Edge strength
//!
//! Both models read the destination pixel's edge strength, defined as
//! `1 - inverse_cost` (the magnitude relative to the field's maximum).
//! A step onto the strongest edge costs `1 / (1 + 1) = 0.5`, a step onto
//! flat ground costs `1 / (0 + 1) = 1`, so the search clings to edges.
//! Degenerate fields have zero strength everywhere.

use std::f64::consts::SQRT_2;

use serde::{Deserialize, Serialize};

use crate::gradient::GradientField;
use crate::types::{GridCoord, ScissorsError};

/// Weights for [`CostFunctionKind::DirectionWeighted`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionWeightedConfig {
    /// Weight of the inverse edge-strength term.
    pub edge_weight: f64,
    /// Weight of the turning penalty `(1 - cos(turn)) / 2`.
    pub direction_weight: f64,
    /// Weight of the Euclidean step length (1 or sqrt 2).
    pub length_weight: f64,
}

impl Default for DirectionWeightedConfig {
    fn default() -> Self {
        Self {
            edge_weight: 0.6,
            direction_weight: 0.3,
            length_weight: 0.1,
        }
    }
}

/// Selects which edge cost model the search uses.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum CostFunctionKind {
    /// `1 / (strength + 1)` for a 4-adjacent step, divided by sqrt 2 for a
    /// diagonal step.
    #[default]
    InverseGradient,

    /// Blend of the inverse edge term, a penalty for sharp turns relative
    /// to the previous step, and the Euclidean step length.
    DirectionWeighted(DirectionWeightedConfig),
}

impl CostFunctionKind {
    /// Check blend weights for values the search cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] for negative or
    /// non-finite weights, or when every weight is zero.
    pub fn validate(&self) -> Result<(), ScissorsError> {
        match *self {
            Self::InverseGradient => Ok(()),
            Self::DirectionWeighted(w) => {
                let weights = [w.edge_weight, w.direction_weight, w.length_weight];
                if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(ScissorsError::InvalidConfig(format!(
                        "direction-weighted cost weights must be finite and non-negative, got {weights:?}"
                    )));
                }
                if weights.iter().all(|v| *v == 0.0) {
                    return Err(ScissorsError::InvalidConfig(
                        "direction-weighted cost needs at least one non-zero weight".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Trait for edge cost models.
///
/// Costs must be non-negative for the search to stay correct. Non-adjacent
/// pairs cost `f64::INFINITY`.
pub trait CostFunction {
    /// Cost of stepping from `from` to `to`. `previous` is the coordinate
    /// the search reached `from` through, if any.
    fn step_cost(
        &self,
        field: &GradientField,
        previous: Option<GridCoord>,
        from: GridCoord,
        to: GridCoord,
    ) -> f64;
}

impl CostFunction for CostFunctionKind {
    fn step_cost(
        &self,
        field: &GradientField,
        previous: Option<GridCoord>,
        from: GridCoord,
        to: GridCoord,
    ) -> f64 {
        match *self {
            Self::InverseGradient => edge_cost(field, from, to),
            Self::DirectionWeighted(weights) => {
                direction_weighted_cost(field, &weights, previous, from, to)
            }
        }
    }
}

/// How two coordinates relate on the 8-connected grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjacency {
    Straight,
    Diagonal,
    None,
}

const fn adjacency(p: GridCoord, q: GridCoord) -> Adjacency {
    match (p.x.abs_diff(q.x), p.y.abs_diff(q.y)) {
        (1, 0) | (0, 1) => Adjacency::Straight,
        (1, 1) => Adjacency::Diagonal,
        _ => Adjacency::None,
    }
}

/// The default edge cost between two grid coordinates.
///
/// `1 / (strength(q) + 1)` for 4-adjacent pairs, the same divided by
/// sqrt 2 for diagonal pairs, and `f64::INFINITY` otherwise (including
/// `p == q`). Both coordinates must lie inside the field.
#[must_use]
pub fn edge_cost(field: &GradientField, p: GridCoord, q: GridCoord) -> f64 {
    match adjacency(p, q) {
        Adjacency::Straight => inverse_strength(field, q),
        Adjacency::Diagonal => inverse_strength(field, q) / SQRT_2,
        Adjacency::None => f64::INFINITY,
    }
}

fn inverse_strength(field: &GradientField, q: GridCoord) -> f64 {
    1.0 / (field.edge_strength(q) + 1.0)
}

fn direction_weighted_cost(
    field: &GradientField,
    weights: &DirectionWeightedConfig,
    previous: Option<GridCoord>,
    from: GridCoord,
    to: GridCoord,
) -> f64 {
    let step_length = match adjacency(from, to) {
        Adjacency::Straight => 1.0,
        Adjacency::Diagonal => SQRT_2,
        Adjacency::None => return f64::INFINITY,
    };
    let turn_penalty = previous.map_or(0.0, |prev| {
        let cos = turn_cosine(prev, from, to);
        (1.0 - cos) / 2.0
    });
    weights.edge_weight.mul_add(
        inverse_strength(field, to),
        weights
            .direction_weight
            .mul_add(turn_penalty, weights.length_weight * step_length),
    )
}

/// Cosine of the angle between steps `a -> b` and `b -> c`.
///
/// Returns 1 (no turn) when either step is degenerate.
#[must_use]
pub fn turn_cosine(a: GridCoord, b: GridCoord, c: GridCoord) -> f64 {
    let (ux, uy) = delta(a, b);
    let (vx, vy) = delta(b, c);
    let norm = ux.hypot(uy) * vx.hypot(vy);
    if norm < 1e-12 {
        return 1.0;
    }
    ux.mul_add(vx, uy * vy) / norm
}

/// Signed displacement from `a` to `b`.
#[must_use]
pub(crate) fn delta(a: GridCoord, b: GridCoord) -> (f64, f64) {
    (
        f64::from(b.x) - f64::from(a.x),
        f64::from(b.y) - f64::from(a.y),
    )
}
