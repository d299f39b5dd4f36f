//! Snapping raw pointer positions onto nearby strong edges.

use crate::gradient::GradientField;
use crate::types::{GridCoord, Point};

/// Nearest grid coordinate to a raw point, clamped into the field.
///
/// Returns `None` for an empty field or a non-finite point.
#[must_use]
pub fn to_grid(raw: Point, field: &GradientField) -> Option<GridCoord> {
    if field.is_empty() || !raw.x.is_finite() || !raw.y.is_finite() {
        return None;
    }
    let max_x = f64::from(field.width() - 1);
    let max_y = f64::from(field.height() - 1);
    // Values are clamped into [0, dimension - 1], so the casts are exact.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let coord = GridCoord::new(
        raw.x.round().clamp(0.0, max_x) as u32,
        raw.y.round().clamp(0.0, max_y) as u32,
    );
    Some(coord)
}

/// Coordinate of maximal gradient magnitude within `radius` of `point`.
///
/// The square window `[x - radius, x + radius] x [y - radius, y + radius]`
/// is clamped to the field. A coordinate replaces the current best only
/// if its magnitude is strictly greater, so `point` itself wins ties and
/// is returned unchanged when nothing in the window beats it. Points
/// outside the field are clamped first; an empty field returns `point`.
#[must_use]
pub fn snap(point: GridCoord, field: &GradientField, radius: u32) -> GridCoord {
    let Some(center) = field.clamp(point) else {
        return point;
    };
    let x0 = center.x.saturating_sub(radius);
    let y0 = center.y.saturating_sub(radius);
    let x1 = center.x.saturating_add(radius).min(field.width() - 1);
    let y1 = center.y.saturating_add(radius).min(field.height() - 1);

    let mut best = center;
    let mut best_magnitude = field.magnitude(center);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let c = GridCoord::new(x, y);
            let m = field.magnitude(c);
            if m > best_magnitude {
                best = c;
                best_magnitude = m;
            }
        }
    }
    if best != center {
        tracing::trace!(from = %center, to = %best, radius, "snapped onto stronger edge");
    }
    best
}

/// Snap a raw pointer position. `None` under the same conditions as
/// [`to_grid`].
#[must_use]
pub fn snap_point(raw: Point, field: &GradientField, radius: u32) -> Option<GridCoord> {
    to_grid(raw, field).map(|c| snap(c, field, radius))
}

/// Search radius adapted to the local edge strength.
///
/// Halves `base` when `point` already sits on an edge whose strength
/// (magnitude over the field maximum) exceeds `threshold`, since a strong
/// edge needs little help and a wide window could jump to a neighbouring
/// one.
#[must_use]
pub fn adaptive_radius(field: &GradientField, point: GridCoord, base: u32, threshold: f64) -> u32 {
    match field.clamp(point) {
        Some(c) if field.edge_strength(c) > threshold => base / 2,
        _ => base,
    }
}
