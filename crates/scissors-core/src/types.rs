//! Shared types for the intelligent-scissors core.

use serde::{Deserialize, Serialize};

use crate::anchor::AnchorConfig;
use crate::cost::CostFunctionKind;

/// Re-export `GrayImage` so downstream crates can hand single-channel
/// buffers to the gradient builder without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can hand decoded colour
/// images to the gradient builder without depending on `image` directly.
pub use image::RgbaImage;

/// A raw pointer position in image pixel space.
///
/// Produced by the (external) view layer after mapping a screen position
/// into image coordinates. May lie outside the image or between pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

impl From<GridCoord> for Point {
    fn from(c: GridCoord) -> Self {
        Self::new(f64::from(c.x), f64::from(c.y))
    }
}

/// An integer pixel coordinate inside a gradient field.
///
/// Equality, ordering and hashing are structural. Ordering is row-major
/// (`y` first, then `x`), which the path cache relies on to normalize
/// unordered endpoint pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    /// Column (0 at the left edge).
    pub x: u32,
    /// Row (0 at the top edge).
    pub y: u32,
}

impl GridCoord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Chebyshev (chessboard) distance: the number of 8-connected steps
    /// between two coordinates on an unobstructed grid.
    #[must_use]
    pub const fn chebyshev_distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// Euclidean distance to another coordinate.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }

    /// Returns `true` if `other` is one of the 8 neighbours of `self`.
    #[must_use]
    pub const fn is_neighbor(self, other: Self) -> bool {
        self.chebyshev_distance(other) == 1
    }
}

impl PartialOrd for GridCoord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GridCoord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.y.cmp(&other.y).then(self.x.cmp(&other.x))
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An anchor on the contour being traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedPoint {
    /// Pixel position of the anchor.
    pub coord: GridCoord,
    /// `true` for anchors inserted by the auto-anchor planner, `false`
    /// for anchors the user placed.
    pub auto_generated: bool,
}

impl SeedPoint {
    /// A user-placed seed.
    #[must_use]
    pub const fn user(coord: GridCoord) -> Self {
        Self {
            coord,
            auto_generated: false,
        }
    }

    /// A seed inserted by the auto-anchor planner.
    #[must_use]
    pub const fn auto(coord: GridCoord) -> Self {
        Self {
            coord,
            auto_generated: true,
        }
    }
}

/// An ordered run of grid coordinates from one seed to the next,
/// inclusive of both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathSegment(Vec<GridCoord>);

impl PathSegment {
    /// Create a segment from a vector of coordinates.
    #[must_use]
    pub const fn new(coords: Vec<GridCoord>) -> Self {
        Self(coords)
    }

    /// A one-point segment (the path from a coordinate to itself).
    #[must_use]
    pub fn single(coord: GridCoord) -> Self {
        Self(vec![coord])
    }

    /// Returns `true` if the segment has no coordinates.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of coordinates in the segment.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// The first coordinate, if any.
    #[must_use]
    pub fn first(&self) -> Option<GridCoord> {
        self.0.first().copied()
    }

    /// The last coordinate, if any.
    #[must_use]
    pub fn last(&self) -> Option<GridCoord> {
        self.0.last().copied()
    }

    /// All coordinates in order.
    #[must_use]
    pub fn coords(&self) -> &[GridCoord] {
        &self.0
    }

    /// Consumes the segment and returns the underlying coordinates.
    #[must_use]
    pub fn into_coords(self) -> Vec<GridCoord> {
        self.0
    }

    /// The same segment walked in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self(self.0.iter().rev().copied().collect())
    }

    /// Euclidean length of the polyline through all coordinates.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// Returns `true` if every consecutive pair is an 8-neighbour step.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.0.windows(2).all(|w| w[0].is_neighbor(w[1]))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if `coord` lies inside `[0, width) x [0, height)`.
    #[must_use]
    pub const fn contains(self, coord: GridCoord) -> bool {
        coord.x < self.width && coord.y < self.height
    }
}

/// Configuration for an interactive lasso session.
///
/// Defaults follow the interactive tool's tuning: an 8 px snap radius,
/// a 10 px closing radius, a 50 ms live-move throttle and a 100-entry
/// path cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether raw points are snapped onto nearby strong edges.
    pub snap_enabled: bool,

    /// Base snap search radius in pixels.
    pub snap_radius: u32,

    /// Halve the snap radius when the point already sits on a strong edge.
    pub adaptive_snap: bool,

    /// Strong-edge threshold for adaptive snapping, as a fraction of the
    /// field's maximum gradient magnitude (0.0 to 1.0).
    pub snap_edge_threshold: f64,

    /// A committed seed within this many pixels of the first seed closes
    /// the contour.
    pub closing_radius: f64,

    /// Minimum number of seeds before a click near the first seed closes
    /// the contour.
    pub min_seeds_to_close: usize,

    /// Minimum interval between live-segment recomputations, in
    /// milliseconds.
    pub live_interval_ms: u64,

    /// Maximum number of endpoint pairs held by the path cache.
    pub cache_capacity: usize,

    /// Which edge cost model drives the path search.
    pub cost_function: CostFunctionKind,

    /// Auto-anchor planner tunables.
    pub auto_anchor: AnchorConfig,
}

impl SessionConfig {
    /// Default snap radius in pixels.
    pub const DEFAULT_SNAP_RADIUS: u32 = 8;
    /// Default strong-edge threshold for adaptive snapping.
    pub const DEFAULT_SNAP_EDGE_THRESHOLD: f64 = 0.2;
    /// Default closing radius in pixels.
    pub const DEFAULT_CLOSING_RADIUS: f64 = 10.0;
    /// Default minimum seed count before auto-closing.
    pub const DEFAULT_MIN_SEEDS_TO_CLOSE: usize = 3;
    /// Default live-move throttle interval in milliseconds.
    pub const DEFAULT_LIVE_INTERVAL_MS: u64 = 50;
    /// Default path cache capacity.
    pub const DEFAULT_CACHE_CAPACITY: usize = 100;

    /// Check every field for values the session cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ScissorsError> {
        if self.cache_capacity == 0 {
            return Err(ScissorsError::InvalidConfig(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if !self.closing_radius.is_finite() || self.closing_radius < 0.0 {
            return Err(ScissorsError::InvalidConfig(format!(
                "closing_radius must be finite and non-negative, got {}",
                self.closing_radius
            )));
        }
        if !(0.0..=1.0).contains(&self.snap_edge_threshold) {
            return Err(ScissorsError::InvalidConfig(format!(
                "snap_edge_threshold must be within [0, 1], got {}",
                self.snap_edge_threshold
            )));
        }
        self.cost_function.validate()?;
        self.auto_anchor.validate()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snap_enabled: true,
            snap_radius: Self::DEFAULT_SNAP_RADIUS,
            adaptive_snap: true,
            snap_edge_threshold: Self::DEFAULT_SNAP_EDGE_THRESHOLD,
            closing_radius: Self::DEFAULT_CLOSING_RADIUS,
            min_seeds_to_close: Self::DEFAULT_MIN_SEEDS_TO_CLOSE,
            live_interval_ms: Self::DEFAULT_LIVE_INTERVAL_MS,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            cost_function: CostFunctionKind::default(),
            auto_anchor: AnchorConfig::default(),
        }
    }
}

/// Errors raised by the intelligent-scissors core.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum ScissorsError {
    /// An endpoint lies outside the gradient field.
    #[error("coordinate {coord} is outside the {width}x{height} field")]
    OutOfBounds {
        /// The offending coordinate.
        coord: GridCoord,
        /// Field width in pixels.
        width: u32,
        /// Field height in pixels.
        height: u32,
    },

    /// The search exhausted its reachable region without reaching the end.
    ///
    /// The 8-connected grid over a rectangle is always connected, so this
    /// indicates a defect rather than a normal outcome.
    #[error("no path found from {start} to {end}")]
    NoPathFound {
        /// Search start.
        start: GridCoord,
        /// Search end.
        end: GridCoord,
    },

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Session configuration is invalid.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// A background segment computation failed or panicked.
    #[error("background segment computation failed: {0}")]
    Worker(String),

    /// The operation is not allowed in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

/// Serde-compatible proxy for `ScissorsError`.
#[derive(Serialize, Deserialize)]
enum ScissorsErrorProxy {
    OutOfBounds {
        coord: GridCoord,
        width: u32,
        height: u32,
    },
    NoPathFound {
        start: GridCoord,
        end: GridCoord,
    },
    ImageDecode(String),
    EmptyInput,
    InvalidConfig(String),
    Worker(String),
    InvalidState(String),
}

impl Serialize for ScissorsError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::OutOfBounds {
                coord,
                width,
                height,
            } => ScissorsErrorProxy::OutOfBounds {
                coord: *coord,
                width: *width,
                height: *height,
            },
            Self::NoPathFound { start, end } => ScissorsErrorProxy::NoPathFound {
                start: *start,
                end: *end,
            },
            Self::ImageDecode(e) => ScissorsErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => ScissorsErrorProxy::EmptyInput,
            Self::InvalidConfig(s) => ScissorsErrorProxy::InvalidConfig(s.clone()),
            Self::Worker(s) => ScissorsErrorProxy::Worker(s.clone()),
            Self::InvalidState(s) => ScissorsErrorProxy::InvalidState(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ScissorsError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = ScissorsErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            ScissorsErrorProxy::OutOfBounds {
                coord,
                width,
                height,
            } => Self::OutOfBounds {
                coord,
                width,
                height,
            },
            ScissorsErrorProxy::NoPathFound { start, end } => Self::NoPathFound { start, end },
            // The typed `image::ImageError` cannot be rebuilt; keep the message.
            ScissorsErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            ScissorsErrorProxy::EmptyInput => Self::EmptyInput,
            ScissorsErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            ScissorsErrorProxy::Worker(s) => Self::Worker(s),
            ScissorsErrorProxy::InvalidState(s) => Self::InvalidState(s),
        })
    }
}
