//! Tracker configuration.
//!
//! The on-disk form is a JSON document split into sections. Every field has a
//! default, so an empty object is a valid configuration. [`TrackerConfig::resolve`]
//! turns it into the runtime bundle the tracker actually consumes.

use crate::controllers::{PidGains, PidParams};
use crate::error::TrackerError;
use serde::{Deserialize, Serialize};
use shared::camera_interface::{ExposureSettings, RegionGeometry};
use shared::image_proc::{SpotFinderParams, DEFAULT_MIN_PEAK_PIXELS};
use shared::image_size::PixelShape;
use std::path::{Path, PathBuf};

/// Camera readout and exposure defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub bits_per_pixel: u8,
    pub pixel_clock_mhz: u32,
    pub full_frame_rate_hz: f64,
    pub roi_frame_rate_hz: f64,
    pub full_exposure_ms: f64,
    pub roi_exposure_ms: f64,
    /// Region center in full-frame pixels; also the full-frame setpoint
    pub roi_center: (i64, i64),
    /// Region width and height
    pub roi_size: (usize, usize),
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            bits_per_pixel: 8,
            pixel_clock_mhz: 20,
            full_frame_rate_hz: 10.0,
            roi_frame_rate_hz: 60.0,
            full_exposure_ms: 1.0,
            roi_exposure_ms: 1.0,
            roi_center: (640, 512),
            roi_size: (256, 256),
        }
    }
}

/// Steering mirror link and travel limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSection {
    pub port: String,
    /// Largest per-step move on each axis
    pub step_limit: f64,
    /// Optional bound on the accumulated absolute position
    pub position_limit: Option<f64>,
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            port: "ttyACM0".to_string(),
            step_limit: 0.25,
            position_limit: None,
        }
    }
}

/// Control loop behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// Allow switching to region readout once the spot is close
    pub do_roi: bool,
    /// Fraction of the half-region size the error must be inside to narrow
    pub roi_threshold: f64,
    /// Toggle tracking on and off every this many steps; 0 disables
    pub tracker_period: u64,
    pub full_pid: PidGains,
    /// All-zero gains fall back to `full_pid`
    pub roi_pid: PidGains,
    /// Swap controller gains on mode transitions
    pub apply_mode_gains: bool,
    /// Measure the interval between PID updates instead of assuming one step
    pub measured_interval: bool,
    /// Annotation level for the display, 0-3
    pub display_mode: u8,
    /// Mirror move per arrow key press
    pub nudge_increment: f64,
    /// Mirror is re-centred once more than this many consecutive steps lose the spot
    pub loss_reset_threshold: u32,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            do_roi: false,
            roi_threshold: 0.5,
            tracker_period: 0,
            full_pid: PidGains::default(),
            roi_pid: PidGains::default(),
            apply_mode_gains: false,
            measured_interval: false,
            display_mode: 2,
            nudge_increment: 0.01,
            loss_reset_threshold: 10,
        }
    }
}

/// Peak and profile thresholds for one mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotThresholds {
    pub peak_fraction: f64,
    pub gaussian_fraction: f64,
}

impl Default for SpotThresholds {
    fn default() -> Self {
        Self {
            peak_fraction: 0.5,
            gaussian_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotDetectionSection {
    pub full: SpotThresholds,
    pub roi: SpotThresholds,
    pub max_peak_pixels: usize,
    pub min_peak_pixels: usize,
    pub save_projections: bool,
}

impl Default for SpotDetectionSection {
    fn default() -> Self {
        Self {
            full: SpotThresholds::default(),
            roi: SpotThresholds::default(),
            max_peak_pixels: 500,
            min_peak_pixels: DEFAULT_MIN_PEAK_PIXELS,
            save_projections: false,
        }
    }
}

/// Where and what to write for offline analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    pub output_dir: PathBuf,
    pub telemetry_file: String,
    /// Write the frame that lost the spot as big-endian raw samples
    pub save_lost_frames: bool,
    /// Also write it as CSV
    pub save_lost_frames_csv: bool,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            telemetry_file: "tracker_data.csv".to_string(),
            save_lost_frames: true,
            save_lost_frames_csv: false,
        }
    }
}

impl DiagnosticsSection {
    pub fn telemetry_path(&self) -> PathBuf {
        self.output_dir.join(&self.telemetry_file)
    }
}

/// Complete tracker configuration as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub camera: CameraSection,
    pub mirror: MirrorSection,
    pub tracker: TrackerSection,
    pub spot_detection: SpotDetectionSection,
    pub diagnostics: DiagnosticsSection,
}

/// Runtime parameters derived from a [`TrackerConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub bits_per_pixel: u8,
    pub full_exposure: ExposureSettings,
    pub roi_exposure: ExposureSettings,
    /// Requested region, before snapping to the camera's increments
    pub roi_region: RegionGeometry,
    pub full_setpoint: (f64, f64),
    pub do_roi: bool,
    pub roi_threshold: f64,
    pub tracker_period: u64,
    pub full_pid: PidParams,
    pub roi_pid: PidParams,
    pub apply_mode_gains: bool,
    pub full_spot: SpotFinderParams,
    pub roi_spot: SpotFinderParams,
    pub position_limit: Option<f64>,
    pub display_level: u8,
    pub nudge_increment: f64,
    pub loss_reset_threshold: u32,
    pub diagnostics: DiagnosticsSection,
}

fn check_fraction(name: &str, value: f64) -> Result<(), TrackerError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(TrackerError::InvalidConfig(format!(
            "{name} must be in (0, 1], got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), TrackerError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(TrackerError::InvalidConfig(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

impl TrackerConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| TrackerError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), TrackerError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| TrackerError::ConfigIo {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validate and derive the runtime parameters.
    ///
    /// The region's top-left corner is its center minus half its size, the
    /// full-frame setpoint is the region center and PID bounds are
    /// `[-step_limit, step_limit]`.
    pub fn resolve(&self) -> Result<ResolvedConfig, TrackerError> {
        let cam = &self.camera;
        if cam.bits_per_pixel == 0 || cam.bits_per_pixel > 16 {
            return Err(TrackerError::InvalidConfig(format!(
                "bits_per_pixel must be 1-16, got {}",
                cam.bits_per_pixel
            )));
        }
        check_positive("full_frame_rate_hz", cam.full_frame_rate_hz)?;
        check_positive("roi_frame_rate_hz", cam.roi_frame_rate_hz)?;
        check_positive("full_exposure_ms", cam.full_exposure_ms)?;
        check_positive("roi_exposure_ms", cam.roi_exposure_ms)?;
        check_positive("step_limit", self.mirror.step_limit)?;
        if let Some(limit) = self.mirror.position_limit {
            check_positive("position_limit", limit)?;
        }
        check_fraction("roi_threshold", self.tracker.roi_threshold)?;
        for (mode, t) in [
            ("full", &self.spot_detection.full),
            ("roi", &self.spot_detection.roi),
        ] {
            check_fraction(&format!("{mode}.peak_fraction"), t.peak_fraction)?;
            check_fraction(&format!("{mode}.gaussian_fraction"), t.gaussian_fraction)?;
        }
        if self.spot_detection.min_peak_pixels > self.spot_detection.max_peak_pixels {
            return Err(TrackerError::InvalidConfig(format!(
                "min_peak_pixels ({}) exceeds max_peak_pixels ({})",
                self.spot_detection.min_peak_pixels, self.spot_detection.max_peak_pixels
            )));
        }
        if self.tracker.display_mode > 3 {
            return Err(TrackerError::InvalidConfig(format!(
                "display_mode must be 0-3, got {}",
                self.tracker.display_mode
            )));
        }

        let size = PixelShape::from(cam.roi_size);
        if size.pixel_count() == 0 {
            return Err(TrackerError::InvalidConfig(format!(
                "roi_size must be non-zero, got {size}"
            )));
        }
        let roi_region = RegionGeometry::from_center(cam.roi_center, size)
            .map_err(|e| TrackerError::InvalidConfig(e.to_string()))?;

        let fixed_interval = !self.tracker.measured_interval;
        let limit = self.mirror.step_limit;
        let full_pid = PidParams {
            fixed_interval,
            ..PidParams::symmetric(self.tracker.full_pid, limit)
        };
        let roi_gains = if self.tracker.roi_pid.is_zero() {
            self.tracker.full_pid
        } else {
            self.tracker.roi_pid
        };
        let roi_pid = PidParams {
            fixed_interval,
            ..PidParams::symmetric(roi_gains, limit)
        };

        let spot = &self.spot_detection;
        let spot_params = |t: &SpotThresholds| SpotFinderParams {
            peak_fraction: t.peak_fraction,
            gaussian_fraction: t.gaussian_fraction,
            max_peak_pixels: spot.max_peak_pixels,
            min_peak_pixels: spot.min_peak_pixels,
            save_projections: spot.save_projections,
        };

        Ok(ResolvedConfig {
            bits_per_pixel: cam.bits_per_pixel,
            full_exposure: ExposureSettings::new(
                cam.pixel_clock_mhz,
                cam.full_frame_rate_hz,
                cam.full_exposure_ms,
            ),
            roi_exposure: ExposureSettings::new(
                cam.pixel_clock_mhz,
                cam.roi_frame_rate_hz,
                cam.roi_exposure_ms,
            ),
            roi_region,
            full_setpoint: (cam.roi_center.0 as f64, cam.roi_center.1 as f64),
            do_roi: self.tracker.do_roi,
            roi_threshold: self.tracker.roi_threshold,
            tracker_period: self.tracker.tracker_period,
            full_pid,
            roi_pid,
            apply_mode_gains: self.tracker.apply_mode_gains,
            full_spot: spot_params(&spot.full),
            roi_spot: spot_params(&spot.roi),
            position_limit: self.mirror.position_limit,
            display_level: self.tracker.display_mode,
            nudge_increment: self.tracker.nudge_increment,
            loss_reset_threshold: self.tracker.loss_reset_threshold,
            diagnostics: self.diagnostics.clone(),
        })
    }
}
