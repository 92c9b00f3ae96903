//! Projection-based spot centroiding.
//!
//! A single laser spot projected onto the row and column axes looks like a
//! pair of roughly Gaussian profiles once dim pixels are ignored. The spot
//! position is the index-weighted average of each profile, restricted to the
//! bins near its peak so that residual background does not pull the estimate
//! toward the frame center.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixels at or below this value never contribute, whatever the peak fraction
pub const ABSOLUTE_NOISE_FLOOR: u16 = 50;

/// Fewer qualifying pixels than this means there is no spot
pub const DEFAULT_MIN_PEAK_PIXELS: usize = 5;

/// Thresholds for one acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotFinderParams {
    /// Fraction of the brightest sample a pixel must exceed to be counted
    pub peak_fraction: f64,
    /// Fraction of a projection's maximum a bin must exceed to be averaged
    pub gaussian_fraction: f64,
    /// More qualifying pixels than this is treated as noise or saturation
    pub max_peak_pixels: usize,
    /// Fewer qualifying pixels than this is treated as no spot
    pub min_peak_pixels: usize,
    /// Keep projections around for diagnostics
    pub save_projections: bool,
}

impl Default for SpotFinderParams {
    fn default() -> Self {
        Self {
            peak_fraction: 0.5,
            gaussian_fraction: 0.5,
            max_peak_pixels: 500,
            min_peak_pixels: DEFAULT_MIN_PEAK_PIXELS,
            save_projections: false,
        }
    }
}

/// Why a frame did not yield a spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpotRejection {
    /// Too few pixels above threshold: no spot in view
    TooFewPixels(usize),
    /// Too many pixels above threshold: background, saturation or a blob
    TooManyPixels(usize),
    /// A projection had no bins above its secondary threshold
    DegenerateProjection,
    /// No frame has been captured yet
    NoFrame,
    /// The frame on hand was read out from a different region
    StaleFrame,
}

impl fmt::Display for SpotRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpotRejection::TooFewPixels(n) => write!(f, "{n} pixels above threshold, too few"),
            SpotRejection::TooManyPixels(n) => write!(f, "{n} pixels above threshold, too many"),
            SpotRejection::DegenerateProjection => write!(f, "degenerate projection"),
            SpotRejection::NoFrame => write!(f, "no frame captured"),
            SpotRejection::StaleFrame => write!(f, "frame does not match the active region"),
        }
    }
}

/// Result of one spot search, coordinates in the pixels of the searched frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpotEstimate {
    Found { x: f64, y: f64 },
    NotFound(SpotRejection),
}

impl SpotEstimate {
    pub fn is_found(&self) -> bool {
        matches!(self, SpotEstimate::Found { .. })
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        match *self {
            SpotEstimate::Found { x, y } => Some((x, y)),
            SpotEstimate::NotFound(_) => None,
        }
    }
}

/// Index-weighted mean of the bins strictly above `max * fraction`.
///
/// Returns `None` when no bin qualifies or the qualifying weight is zero.
fn weighted_average(distribution: &[u64], fraction: f64) -> Option<f64> {
    let max = distribution.iter().copied().max()?;
    let threshold = (max as f64 * fraction) as u64;

    let mut running_total: u128 = 0;
    let mut running_weights: u128 = 0;
    for (i, &value) in distribution.iter().enumerate() {
        if value > threshold {
            running_total += i as u128 * value as u128;
            running_weights += value as u128;
        }
    }

    if running_weights == 0 {
        return None;
    }
    Some(running_total as f64 / running_weights as f64)
}

/// Stateful spot finder that reuses its projection buffers between frames.
///
/// The buffers are only reallocated when the frame dimensions change, which
/// happens on full-frame/region transitions.
#[derive(Debug, Default)]
pub struct SpotLocator {
    row_totals: Vec<u64>,
    col_totals: Vec<u64>,
}

impl SpotLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate the spot in `frame`.
    ///
    /// # Arguments
    /// * `frame` - Intensity samples indexed `[row, col]`
    /// * `params` - Thresholds for the current acquisition mode
    ///
    /// # Returns
    /// `Found { x, y }` with `x` the column centroid and `y` the row centroid,
    /// or the reason the frame was rejected.
    pub fn locate(&mut self, frame: ArrayView2<u16>, params: &SpotFinderParams) -> SpotEstimate {
        let (height, width) = frame.dim();
        self.row_totals.resize(height, 0);
        self.col_totals.resize(width, 0);
        self.row_totals.fill(0);
        self.col_totals.fill(0);

        let max_sample = frame.iter().copied().max().unwrap_or(0);
        let peak_threshold = (max_sample as f64 * params.peak_fraction) as u16;

        let mut n_peak_pixels = 0usize;
        for ((row, col), &pixel) in frame.indexed_iter() {
            if pixel > peak_threshold && pixel > ABSOLUTE_NOISE_FLOOR {
                self.row_totals[row] += pixel as u64;
                self.col_totals[col] += pixel as u64;
                n_peak_pixels += 1;
            }
        }

        if n_peak_pixels > params.max_peak_pixels {
            return SpotEstimate::NotFound(SpotRejection::TooManyPixels(n_peak_pixels));
        }
        if n_peak_pixels < params.min_peak_pixels {
            return SpotEstimate::NotFound(SpotRejection::TooFewPixels(n_peak_pixels));
        }

        let y = weighted_average(&self.row_totals, params.gaussian_fraction);
        let x = weighted_average(&self.col_totals, params.gaussian_fraction);
        match (x, y) {
            (Some(x), Some(y)) => SpotEstimate::Found { x, y },
            _ => SpotEstimate::NotFound(SpotRejection::DegenerateProjection),
        }
    }

    /// Row and column projections from the most recent call to `locate`
    pub fn projections(&self) -> (&[u64], &[u64]) {
        (&self.row_totals, &self.col_totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn frame_with_square(
        shape: (usize, usize),
        top_left: (usize, usize),
        side: usize,
        value: u16,
    ) -> Array2<u16> {
        let mut frame = Array2::<u16>::from_elem(shape, 10);
        for row in top_left.0..top_left.0 + side {
            for col in top_left.1..top_left.1 + side {
                frame[[row, col]] = value;
            }
        }
        frame
    }

    #[test]
    fn test_square_centroid() {
        // 6x6 square covering rows 40..46 and cols 70..76
        let frame = frame_with_square((128, 160), (40, 70), 6, 1000);
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &SpotFinderParams::default());
        let (x, y) = estimate.position().expect("spot should be found");
        assert_abs_diff_eq!(x, 72.5, epsilon = 0.5);
        assert_abs_diff_eq!(y, 42.5, epsilon = 0.5);
    }

    #[test]
    fn test_gaussian_spot_subpixel() {
        let (cx, cy, sigma) = (31.3, 22.7, 2.0);
        let frame = Array2::from_shape_fn((48, 64), |(r, c)| {
            let dx = c as f64 - cx;
            let dy = r as f64 - cy;
            (3000.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()) as u16
        });

        let mut locator = SpotLocator::new();
        let (x, y) = locator
            .locate(frame.view(), &SpotFinderParams::default())
            .position()
            .unwrap();
        assert_abs_diff_eq!(x, cx, epsilon = 0.5);
        assert_abs_diff_eq!(y, cy, epsilon = 0.5);
    }

    #[test]
    fn test_flat_field_not_found() {
        let frame = Array2::<u16>::from_elem((64, 64), 40);
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &SpotFinderParams::default());
        assert_eq!(estimate, SpotEstimate::NotFound(SpotRejection::TooFewPixels(0)));
        assert!(estimate.position().is_none());
    }

    #[test]
    fn test_bright_flat_field_is_too_many() {
        // Shallow gradient: every pixel clears both thresholds
        let frame = Array2::from_shape_fn((64, 64), |(r, c)| (1000 + r + c) as u16);
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &SpotFinderParams::default());
        assert!(matches!(
            estimate,
            SpotEstimate::NotFound(SpotRejection::TooManyPixels(_))
        ));
    }

    #[test]
    fn test_saturated_frame_not_found() {
        let mut frame = Array2::<u16>::from_elem((64, 64), 4095);
        frame[[0, 0]] = 0;
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &SpotFinderParams::default());
        assert_eq!(
            estimate,
            SpotEstimate::NotFound(SpotRejection::TooManyPixels(64 * 64 - 1))
        );
    }

    #[test]
    fn test_degenerate_projection_not_found() {
        // With a gaussian fraction of 1.0 no bin can exceed its own maximum
        let frame = frame_with_square((32, 32), (10, 10), 4, 800);
        let params = SpotFinderParams {
            gaussian_fraction: 1.0,
            ..Default::default()
        };
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &params);
        assert_eq!(
            estimate,
            SpotEstimate::NotFound(SpotRejection::DegenerateProjection)
        );
    }

    #[test]
    fn test_rejection_reasons_display() {
        assert_eq!(
            SpotRejection::TooFewPixels(3).to_string(),
            "3 pixels above threshold, too few"
        );
        assert_eq!(SpotRejection::NoFrame.to_string(), "no frame captured");
        assert_eq!(
            SpotRejection::StaleFrame.to_string(),
            "frame does not match the active region"
        );
    }

    #[test]
    fn test_noise_floor_applies_to_dim_spots() {
        // Spot peak below the absolute floor is never counted
        let frame = frame_with_square((32, 32), (10, 10), 4, 45);
        let mut locator = SpotLocator::new();

        let estimate = locator.locate(frame.view(), &SpotFinderParams::default());
        assert!(!estimate.is_found());
    }

    #[test]
    fn test_projection_buffers_follow_frame_size() {
        let mut locator = SpotLocator::new();
        let params = SpotFinderParams::default();

        let full = frame_with_square((100, 120), (50, 60), 5, 900);
        locator.locate(full.view(), &params);
        let (rows, cols) = locator.projections();
        assert_eq!((rows.len(), cols.len()), (100, 120));
        assert_eq!(rows[52], 5 * 900);

        let roi = frame_with_square((16, 24), (4, 4), 5, 900);
        locator.locate(roi.view(), &params);
        let (rows, cols) = locator.projections();
        assert_eq!((rows.len(), cols.len()), (16, 24));
        assert_eq!(cols[6], 5 * 900);
        assert_eq!(rows[0], 0);
    }
}
