//! Simulated optical bench: a camera and a steering mirror sharing one beam.
//!
//! The camera renders a Gaussian laser spot at
//! `rest_position + drift(t) - mirror_gain * mirror_position` over a noisy
//! background, so commands sent to the [`SimulatedMirror`] move the spot seen
//! by the [`SimulatorCamera`]. Frames are quantized to the configured bit
//! depth and passed through the same raw-buffer decoding a vendor driver
//! would use.

use crate::motion_profiles::{DriftMotion, StaticDrift};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use shared::camera_interface::raw_buffer::{decode_raw_frame, encode_raw_frame, max_sample_value};
use shared::camera_interface::{
    CameraError, CameraInterface, CameraResult, ExposureSettings, RegionGeometry,
    RegionIncrements,
};
use shared::fsm_interface::{FsmError, FsmInterface, FsmResult};
use shared::image_size::PixelShape;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Physical parameters of the simulated bench
#[derive(Debug, Clone)]
pub struct BenchParams {
    pub sensor: PixelShape,
    /// Spot position with the mirror centred and no drift
    pub rest_position: (f64, f64),
    /// Spot displacement in pixels per unit mirror command
    pub mirror_gain: f64,
    /// Gaussian spot width in pixels
    pub spot_sigma: f64,
    /// Spot peak as a fraction of full scale
    pub spot_peak: f64,
    /// Background as a fraction of full scale
    pub background: f64,
    /// Read noise standard deviation as a fraction of full scale
    pub read_noise: f64,
    pub bit_depth: u8,
    pub increments: RegionIncrements,
    /// Highest full-frame rate; smaller regions read out proportionally faster
    pub max_full_frame_rate_hz: f64,
    pub seed: u64,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            sensor: PixelShape::new(1280, 1024),
            rest_position: (646.0, 508.0),
            mirror_gain: 8.0,
            spot_sigma: 2.5,
            spot_peak: 0.8,
            background: 0.04,
            read_noise: 0.008,
            bit_depth: 8,
            increments: RegionIncrements::new(4, 2, 8, 2),
            max_full_frame_rate_hz: 30.0,
            seed: 42,
        }
    }
}

/// State shared by the camera and mirror of one bench
#[derive(Debug, Default)]
struct BenchState {
    mirror: (f64, f64),
    elapsed: Duration,
    frames_captured: u64,
}

/// Owns the shared beam state and hands out the camera and mirror
pub struct SimulatedBench {
    params: BenchParams,
    state: Arc<Mutex<BenchState>>,
}

fn lock(state: &Mutex<BenchState>) -> MutexGuard<'_, BenchState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedBench {
    pub fn new(params: BenchParams) -> Self {
        Self {
            params,
            state: Arc::new(Mutex::new(BenchState::default())),
        }
    }

    pub fn params(&self) -> &BenchParams {
        &self.params
    }

    /// Camera looking at this bench's beam
    ///
    /// # Errors
    /// Fails if the bit depth or noise level cannot be simulated.
    pub fn camera(&self, drift: Box<dyn DriftMotion>) -> CameraResult<SimulatorCamera> {
        SimulatorCamera::new(self.params.clone(), Arc::clone(&self.state), drift)
    }

    /// Mirror steering this bench's beam
    pub fn mirror(&self) -> SimulatedMirror {
        SimulatedMirror {
            state: Arc::clone(&self.state),
            travel_limit: 1.0,
        }
    }

    /// Current mirror position
    pub fn mirror_position(&self) -> (f64, f64) {
        lock(&self.state).mirror
    }

    /// Simulated time elapsed over all captured frames
    pub fn elapsed(&self) -> Duration {
        lock(&self.state).elapsed
    }

    pub fn frames_captured(&self) -> u64 {
        lock(&self.state).frames_captured
    }
}

/// Camera rendering the bench's laser spot
pub struct SimulatorCamera {
    params: BenchParams,
    state: Arc<Mutex<BenchState>>,
    drift: Box<dyn DriftMotion>,
    region: RegionGeometry,
    frame_interval: Duration,
    noise: Option<Normal<f64>>,
    rng: ChaCha8Rng,
    /// Capture indices (0-based) on which the spot is blocked
    dropouts: BTreeSet<u64>,
}

impl SimulatorCamera {
    fn new(
        params: BenchParams,
        state: Arc<Mutex<BenchState>>,
        drift: Box<dyn DriftMotion>,
    ) -> CameraResult<Self> {
        if params.bit_depth == 0 || params.bit_depth > 16 {
            return Err(CameraError::ConfigError(format!(
                "Unsupported bit depth {}",
                params.bit_depth
            )));
        }

        let scale = f64::from(max_sample_value(params.bit_depth));
        let noise = if params.read_noise > 0.0 {
            let normal = Normal::new(0.0, params.read_noise * scale)
                .map_err(|e| CameraError::ConfigError(format!("Invalid read noise: {e}")))?;
            Some(normal)
        } else {
            None
        };

        Ok(Self {
            region: RegionGeometry::full_frame(params.sensor),
            frame_interval: Duration::from_secs_f64(1.0 / params.max_full_frame_rate_hz),
            rng: ChaCha8Rng::seed_from_u64(params.seed),
            noise,
            drift,
            state,
            params,
            dropouts: BTreeSet::new(),
        })
    }

    /// Block the beam on the given capture indices
    pub fn with_dropouts(mut self, captures: impl IntoIterator<Item = u64>) -> Self {
        self.dropouts.extend(captures);
        self
    }

    /// Replace the drift profile; simulated time keeps running
    pub fn set_drift(&mut self, drift: Box<dyn DriftMotion>) {
        self.drift = drift;
    }

    /// Where the spot currently falls on the sensor, in full-frame pixels
    pub fn spot_position(&self) -> (f64, f64) {
        let state = lock(&self.state);
        self.spot_position_at(state.elapsed, state.mirror)
    }

    fn spot_position_at(&self, t: Duration, mirror: (f64, f64)) -> (f64, f64) {
        let (dx, dy) = self.drift.offset(t);
        let (rx, ry) = self.params.rest_position;
        let gain = self.params.mirror_gain;
        (rx + dx - gain * mirror.0, ry + dy - gain * mirror.1)
    }

    /// Fastest frame rate the sensor achieves for `region`
    fn max_frame_rate(&self, region: RegionGeometry) -> f64 {
        let rows = region.height.max(1) as f64;
        self.params.max_full_frame_rate_hz * self.params.sensor.height as f64 / rows
    }

    fn render(&mut self, spot: Option<(f64, f64)>) -> Array2<u16> {
        let scale = f64::from(max_sample_value(self.params.bit_depth));
        let background = self.params.background * scale;
        let peak = self.params.spot_peak * scale;
        let two_sigma_sq = 2.0 * self.params.spot_sigma * self.params.spot_sigma;
        let region = self.region;

        let mut frame = Array2::<u16>::zeros((region.height, region.width));
        for ((row, col), pixel) in frame.indexed_iter_mut() {
            let mut value = background;
            if let Some((sx, sy)) = spot {
                let dx = (region.x + col) as f64 - sx;
                let dy = (region.y + row) as f64 - sy;
                value += peak * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
            }
            if let Some(noise) = &self.noise {
                value += noise.sample(&mut self.rng);
            }
            *pixel = value.round().clamp(0.0, scale) as u16;
        }
        frame
    }
}

impl CameraInterface for SimulatorCamera {
    fn capture_frame(&mut self) -> CameraResult<Array2<u16>> {
        let (index, elapsed, mirror) = {
            let mut state = lock(&self.state);
            let snapshot = (state.frames_captured, state.elapsed, state.mirror);
            state.frames_captured += 1;
            state.elapsed += self.frame_interval;
            snapshot
        };

        let spot = if self.dropouts.contains(&index) {
            log::debug!("Beam blocked on capture {index}");
            None
        } else {
            Some(self.spot_position_at(elapsed, mirror))
        };

        let counts = self.render(spot);
        let raw = encode_raw_frame(&counts, self.params.bit_depth)?;
        decode_raw_frame(&raw, self.region.size(), self.params.bit_depth)
    }

    fn set_active_region(&mut self, region: RegionGeometry) -> CameraResult<()> {
        region.validate_for_sensor(self.params.sensor)?;
        if !region.is_aligned(self.params.increments) {
            return Err(CameraError::InvalidRegion(format!(
                "region {region} is not aligned to the sensor increments"
            )));
        }
        self.region = region;
        Ok(())
    }

    fn active_region(&self) -> RegionGeometry {
        self.region
    }

    fn sensor_region(&self) -> RegionGeometry {
        RegionGeometry::full_frame(self.params.sensor)
    }

    fn region_increments(&self) -> RegionIncrements {
        self.params.increments
    }

    fn set_exposure(&mut self, exposure: ExposureSettings) -> CameraResult<f64> {
        if exposure.frame_rate_hz <= 0.0 || exposure.exposure_ms <= 0.0 {
            return Err(CameraError::ConfigError(
                "Frame rate and exposure must be positive".to_string(),
            ));
        }
        let actual = exposure.frame_rate_hz.min(self.max_frame_rate(self.region));
        self.frame_interval = Duration::from_secs_f64(1.0 / actual);
        Ok(actual)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "SimulatorCamera"
    }

    fn bit_depth(&self) -> u8 {
        self.params.bit_depth
    }
}

/// Steering mirror of a simulated bench
pub struct SimulatedMirror {
    state: Arc<Mutex<BenchState>>,
    travel_limit: f64,
}

impl FsmInterface for SimulatedMirror {
    fn move_to(&mut self, x: f64, y: f64) -> FsmResult<()> {
        if x.abs() > self.travel_limit || y.abs() > self.travel_limit {
            return Err(FsmError::Move(format!(
                "({x:.4}, {y:.4}) outside travel limit {}",
                self.travel_limit
            )));
        }
        lock(&self.state).mirror = (x, y);
        Ok(())
    }

    fn get_position(&mut self) -> FsmResult<(f64, f64)> {
        Ok(lock(&self.state).mirror)
    }
}

/// Bench with a static beam, for quick experiments
pub fn static_bench_camera(params: BenchParams) -> CameraResult<(SimulatedBench, SimulatorCamera)> {
    let bench = SimulatedBench::new(params);
    let camera = bench.camera(Box::new(StaticDrift))?;
    Ok((bench, camera))
}
