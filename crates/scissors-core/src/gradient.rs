//! Gradient field: per-pixel Sobel magnitude and the normalized inverse
//! cost derived from it.
//!
//! Built once per loaded image and immutable afterwards. Out-of-bounds
//! neighbours contribute zero to the convolution, so a constant non-zero
//! image still shows gradient along its border.

use crate::grayscale::PixelBuffer;
use crate::types::{Dimensions, GridCoord, ScissorsError};

/// Sobel kernel for the horizontal derivative, indexed `[dy + 1][dx + 1]`.
const SOBEL_X: [[i8; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];

/// Sobel kernel for the vertical derivative, indexed `[dy + 1][dx + 1]`.
const SOBEL_Y: [[i8; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Gradient magnitude and normalized inverse cost for every pixel.
///
/// Both matrices are stored row-major and share the source buffer's
/// dimensions. `inverse_cost = 1 - magnitude / max_magnitude`, with every
/// entry pinned to 1 when the maximum is zero (constant image).
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    dimensions: Dimensions,
    magnitude: Vec<f64>,
    inverse_cost: Vec<f64>,
    max_magnitude: f64,
    mean_magnitude: f64,
}

impl GradientField {
    /// Build a field from precomputed magnitudes (row-major).
    ///
    /// Negative and non-finite magnitudes are clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::InvalidConfig`] if `magnitude.len()` does
    /// not equal `width * height`.
    pub fn from_magnitudes(
        width: u32,
        height: u32,
        mut magnitude: Vec<f64>,
    ) -> Result<Self, ScissorsError> {
        let dimensions = Dimensions { width, height };
        let expected = usize::try_from(dimensions.pixel_count()).map_err(|_| {
            ScissorsError::InvalidConfig(format!("{width}x{height} field is too large"))
        })?;
        if magnitude.len() != expected {
            return Err(ScissorsError::InvalidConfig(format!(
                "expected {expected} magnitudes for a {width}x{height} field, got {}",
                magnitude.len()
            )));
        }
        for m in &mut magnitude {
            if !m.is_finite() || *m < 0.0 {
                *m = 0.0;
            }
        }
        Ok(Self::normalize(dimensions, magnitude))
    }

    /// Derive the inverse-cost matrix from a single global maximum.
    fn normalize(dimensions: Dimensions, magnitude: Vec<f64>) -> Self {
        let max_magnitude = magnitude.iter().copied().fold(0.0_f64, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean_magnitude = if magnitude.is_empty() {
            0.0
        } else {
            magnitude.iter().sum::<f64>() / magnitude.len() as f64
        };
        let inverse_cost = if max_magnitude > 0.0 {
            magnitude.iter().map(|m| 1.0 - m / max_magnitude).collect()
        } else {
            vec![1.0; magnitude.len()]
        };
        Self {
            dimensions,
            magnitude,
            inverse_cost,
            max_magnitude,
            mean_magnitude,
        }
    }

    /// Field dimensions (identical to the source buffer's).
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.dimensions.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.dimensions.height
    }

    /// Returns `true` if the field has no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }

    /// Returns `true` if `coord` lies inside the field.
    #[must_use]
    pub const fn contains(&self, coord: GridCoord) -> bool {
        self.dimensions.contains(coord)
    }

    /// Fail with [`ScissorsError::OutOfBounds`] unless `coord` is inside.
    ///
    /// # Errors
    ///
    /// Returns [`ScissorsError::OutOfBounds`] for coordinates outside
    /// `[0, width) x [0, height)`.
    pub const fn check_bounds(&self, coord: GridCoord) -> Result<(), ScissorsError> {
        if self.contains(coord) {
            Ok(())
        } else {
            Err(ScissorsError::OutOfBounds {
                coord,
                width: self.dimensions.width,
                height: self.dimensions.height,
            })
        }
    }

    /// Nearest in-bounds coordinate to `coord`, or `None` for an empty field.
    #[must_use]
    pub fn clamp(&self, coord: GridCoord) -> Option<GridCoord> {
        if self.is_empty() {
            return None;
        }
        Some(GridCoord::new(
            coord.x.min(self.dimensions.width - 1),
            coord.y.min(self.dimensions.height - 1),
        ))
    }

    /// Row-major index of an in-bounds coordinate.
    #[must_use]
    pub(crate) fn index(&self, coord: GridCoord) -> usize {
        coord.y as usize * self.dimensions.width as usize + coord.x as usize
    }

    /// Coordinate of a row-major index.
    #[must_use]
    pub(crate) fn coord(&self, index: usize) -> GridCoord {
        let width = self.dimensions.width as usize;
        #[allow(clippy::cast_possible_truncation)]
        GridCoord::new((index % width) as u32, (index / width) as u32)
    }

    /// Gradient magnitude at `coord`.
    ///
    /// # Panics
    ///
    /// Panics if `coord` is outside the field.
    #[must_use]
    pub fn magnitude(&self, coord: GridCoord) -> f64 {
        self.magnitude[self.index(coord)]
    }

    /// Normalized inverse cost at `coord`, in `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if `coord` is outside the field.
    #[must_use]
    pub fn inverse_cost(&self, coord: GridCoord) -> f64 {
        self.inverse_cost[self.index(coord)]
    }

    /// Edge strength at `coord` relative to the strongest edge, in `[0, 1]`.
    ///
    /// Zero everywhere on a degenerate (constant) field.
    ///
    /// # Panics
    ///
    /// Panics if `coord` is outside the field.
    #[must_use]
    pub fn edge_strength(&self, coord: GridCoord) -> f64 {
        1.0 - self.inverse_cost(coord)
    }

    /// Row-major magnitude matrix.
    #[must_use]
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitude
    }

    /// Row-major normalized inverse-cost matrix.
    #[must_use]
    pub fn inverse_costs(&self) -> &[f64] {
        &self.inverse_cost
    }

    /// Largest magnitude over the whole field.
    #[must_use]
    pub const fn max_magnitude(&self) -> f64 {
        self.max_magnitude
    }

    /// Mean magnitude over the whole field.
    #[must_use]
    pub const fn mean_magnitude(&self) -> f64 {
        self.mean_magnitude
    }

    /// Returns `true` for a constant image (zero maximum gradient).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.max_magnitude <= 0.0
    }

    /// Global image complexity: mean magnitude relative to the maximum,
    /// in `[0, 1]`. Zero for a degenerate field.
    #[must_use]
    pub fn complexity(&self) -> f64 {
        if self.is_degenerate() {
            0.0
        } else {
            self.mean_magnitude / self.max_magnitude
        }
    }
}

/// Build the gradient field of a pixel buffer.
///
/// Convolves the 3x3 Sobel kernels against every pixel's 8-neighbourhood,
/// substituting zero for neighbours outside the buffer, and takes the
/// Euclidean norm of the two responses.
#[must_use = "returns the gradient field"]
pub fn build_gradient_field<P: PixelBuffer + ?Sized>(buffer: &P) -> GradientField {
    let width = buffer.width();
    let height = buffer.height();
    let mut magnitude = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height {
        for x in 0..width {
            let mut gx = 0.0_f64;
            let mut gy = 0.0_f64;
            for (ky, (row_x, row_y)) in SOBEL_X.iter().zip(SOBEL_Y.iter()).enumerate() {
                let Some(ny) = (y + ky as u32).checked_sub(1) else {
                    continue;
                };
                if ny >= height {
                    continue;
                }
                for kx in 0..3 {
                    let Some(nx) = (x + kx as u32).checked_sub(1) else {
                        continue;
                    };
                    if nx >= width {
                        continue;
                    }
                    let v = buffer.luma(nx, ny);
                    gx = f64::from(row_x[kx]).mul_add(v, gx);
                    gy = f64::from(row_y[kx]).mul_add(v, gy);
                }
            }
            magnitude.push(gx.hypot(gy));
        }
    }

    let field = GradientField::normalize(Dimensions { width, height }, magnitude);
    tracing::debug!(
        width,
        height,
        max_magnitude = field.max_magnitude,
        mean_magnitude = field.mean_magnitude,
        "built gradient field"
    );
    field
}
