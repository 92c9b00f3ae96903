//! Common utilities for finetrack tests
#![allow(dead_code)]

use finetrack::TrackerConfig;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Synthetic Gaussian laser spot
#[derive(Debug, Clone)]
pub struct SpotParams {
    pub x: f64,
    pub y: f64,
    pub peak: f64,
    pub sigma: f64,
}

impl SpotParams {
    pub fn new(x: f64, y: f64, peak: f64) -> Self {
        Self {
            x,
            y,
            peak,
            sigma: 2.0,
        }
    }
}

/// Configuration for synthetic image generation
#[derive(Debug, Clone)]
pub struct SyntheticImageConfig {
    pub width: usize,
    pub height: usize,
    pub background: f64,
    pub read_noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticImageConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            background: 20.0,
            read_noise_std: 3.0,
            seed: 42,
        }
    }
}

/// Render a Gaussian spot over a noisy background
///
/// NOTE: Only meant to exercise the tracker without the simulated bench; the
/// harness crate has the closed-loop optical simulation.
pub fn create_synthetic_spot_image(
    config: &SyntheticImageConfig,
    spot: Option<&SpotParams>,
) -> Array2<u16> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    Array2::from_shape_fn((config.height, config.width), |(row, col)| {
        let mut value = config.background;
        if let Some(spot) = spot {
            let dx = col as f64 - spot.x;
            let dy = row as f64 - spot.y;
            value += spot.peak * (-(dx * dx + dy * dy) / (2.0 * spot.sigma * spot.sigma)).exp();
        }
        if config.read_noise_std > 0.0 {
            value += rng.gen_range(-3.0..3.0) * config.read_noise_std / 3.0;
        }
        value.round().clamp(0.0, 65535.0) as u16
    })
}

/// Noise-free square spot: `side` x `side` pixels of `value` with top-left
/// at (`col`, `row`); the centroid is at `start + (side - 1) / 2`
pub fn square_spot_frame(
    shape: (usize, usize),
    row: usize,
    col: usize,
    side: usize,
    value: u16,
) -> Array2<u16> {
    let mut frame = Array2::<u16>::zeros(shape);
    for r in row..row + side {
        for c in col..col + side {
            frame[[r, c]] = value;
        }
    }
    frame
}

/// Frame with no spot at all
pub fn blank_frame(shape: (usize, usize)) -> Array2<u16> {
    create_synthetic_spot_image(
        &SyntheticImageConfig {
            width: shape.1,
            height: shape.0,
            ..Default::default()
        },
        None,
    )
}

/// Tracker configuration for a 128x128 sensor with a 32x32 region at its centre
pub fn test_config(output_dir: &Path) -> TrackerConfig {
    let mut config = TrackerConfig::default();
    config.camera.roi_center = (64, 64);
    config.camera.roi_size = (32, 32);
    config.diagnostics.output_dir = output_dir.to_path_buf();
    config
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
