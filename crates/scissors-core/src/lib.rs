//! scissors-core: intelligent-scissors path finding (sans-IO).
//!
//! Traces object boundaries from sparse seed clicks:
//! pixel buffer -> gradient field -> snapped seeds -> minimum-cost
//! 8-connected paths between consecutive seeds, subdivided by the
//! auto-anchor planner on long or weak spans.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns structured data. Drawing, file access and
//! pointer handling belong to the caller (see `scissors-bench`).

pub mod anchor;
pub mod cache;
pub mod cost;
pub mod diagnostics;
pub mod gradient;
pub mod grayscale;
pub mod search;
pub mod session;
pub mod snap;
pub mod types;
pub mod worker;

pub use anchor::{AnchorConfig, AutoAnchorPlanner, PlannedPath, TailHint};
pub use cache::{CacheStats, CachedSearch, PathCache};
pub use cost::{CostFunction, CostFunctionKind, DirectionWeightedConfig};
pub use diagnostics::{Clock, ManualClock, SessionDiagnostics, SystemClock};
pub use gradient::{GradientField, build_gradient_field};
pub use grayscale::PixelBuffer;
pub use search::{DirectSearch, PathResult, SearchStats, SegmentSearch, find_path, find_path_with};
pub use session::{LiveUpdate, Placement, SeedOutcome, Session, SessionState};
pub use snap::snap;
pub use types::{
    Dimensions, GridCoord, PathSegment, Point, ScissorsError, SeedPoint, SessionConfig,
};
pub use worker::{SegmentJob, SegmentRequest, SegmentResponse, SegmentWorker};

/// Outcome of [`trace_contour`].
#[derive(Debug, Clone)]
pub struct TraceResult {
    /// Flattened committed path.
    pub path: Vec<GridCoord>,
    /// Whether the clicks closed the contour.
    pub closed: bool,
    /// Source image dimensions.
    pub dimensions: Dimensions,
    /// Session metrics after the last click.
    pub diagnostics: SessionDiagnostics,
}

/// Trace a contour through scripted clicks on an encoded image.
///
/// # Steps
///
/// 1. Decode the image (PNG, JPEG, BMP, WebP) to RGBA
/// 2. Build the gradient field
/// 3. Replay `clicks` as seed placements; a click near the first seed
///    closes the contour once enough seeds exist
///
/// Clicks after the contour closes are ignored.
///
/// # Errors
///
/// Returns [`ScissorsError::EmptyInput`] if `image_bytes` is empty,
/// [`ScissorsError::ImageDecode`] if the image cannot be decoded, and
/// [`ScissorsError::InvalidConfig`] for an invalid `config`.
pub fn trace_contour(
    image_bytes: &[u8],
    clicks: &[Point],
    config: &SessionConfig,
) -> Result<TraceResult, ScissorsError> {
    let rgba = grayscale::decode_rgba(image_bytes)?;
    let field = build_gradient_field(&rgba);
    let dimensions = field.dimensions();
    let mut session = Session::new(field, config.clone())?;

    for &click in clicks {
        if session.is_closed() {
            tracing::debug!(x = click.x, y = click.y, "click after close ignored");
            continue;
        }
        session.place_seed(click)?;
    }

    Ok(TraceResult {
        path: session.committed_path(),
        closed: session.is_closed(),
        dimensions,
        diagnostics: session.diagnostics(),
    })
}
