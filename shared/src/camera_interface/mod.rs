//! Camera abstraction layer for the fine tracker
//!
//! Provides a unified interface for camera operations that can be backed by
//! either a simulated optical bench (for testing) or a vendor driver (for
//! production). The tracker only ever talks to the camera through
//! [`CameraInterface`]; sensor handles and frame memory stay inside the
//! implementation and are released when it is dropped.

pub mod mock;
pub mod raw_buffer;
pub mod region;

pub use region::{RegionGeometry, RegionIncrements};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for camera operations
#[derive(Debug, Error)]
pub enum CameraError {
    /// Hardware communication error
    #[error("Hardware error: {0}")]
    HardwareError(String),
    /// Region geometry rejected by the sensor
    #[error("Invalid region: {0}")]
    InvalidRegion(String),
    /// Frame capture error
    #[error("Capture error: {0}")]
    CaptureError(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Camera has not been opened or initialised
    #[error("Camera not ready")]
    NotReady,
}

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Pixel clock, frame rate and exposure, applied to the sensor together.
///
/// Frame rate is only a request: sensors support a discrete set of rates and
/// [`CameraInterface::set_exposure`] reports the one actually achieved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureSettings {
    /// Pixel clock in MHz
    pub pixel_clock_mhz: u32,
    /// Requested frame rate in frames per second
    pub frame_rate_hz: f64,
    /// Exposure time in milliseconds
    pub exposure_ms: f64,
}

impl ExposureSettings {
    pub fn new(pixel_clock_mhz: u32, frame_rate_hz: f64, exposure_ms: f64) -> Self {
        Self {
            pixel_clock_mhz,
            frame_rate_hz,
            exposure_ms,
        }
    }
}

/// Trait for unified camera interface
///
/// Frames are returned already normalised to `u16` samples (see
/// [`raw_buffer::decode_raw_frame`]) and shaped `[row, col]` to match the
/// active region.
pub trait CameraInterface: Send {
    /// Capture a single frame from the active region.
    ///
    /// Blocks until the sensor has delivered the frame.
    fn capture_frame(&mut self) -> CameraResult<Array2<u16>>;

    /// Program the acquisition region.
    ///
    /// Passing [`CameraInterface::sensor_region`] returns the camera to
    /// full-frame readout. The region must already satisfy the increments
    /// reported by [`CameraInterface::region_increments`].
    fn set_active_region(&mut self, region: RegionGeometry) -> CameraResult<()>;

    /// Region currently being read out
    fn active_region(&self) -> RegionGeometry;

    /// Region covering the whole sensor
    fn sensor_region(&self) -> RegionGeometry;

    /// Position and size increments the sensor accepts for a region
    fn region_increments(&self) -> RegionIncrements;

    /// Apply pixel clock, frame rate and exposure.
    ///
    /// # Returns
    /// The frame rate the sensor actually settled on.
    fn set_exposure(&mut self, exposure: ExposureSettings) -> CameraResult<f64>;

    /// Whether a reduced region (rather than the full sensor) is being read out
    fn is_region_mode_active(&self) -> bool {
        self.active_region() != self.sensor_region()
    }

    /// Check if camera is ready to capture
    fn is_ready(&self) -> bool;

    /// Get camera name/identifier
    fn name(&self) -> &str;

    /// Intrinsic ADC bit depth before normalisation
    fn bit_depth(&self) -> u8;
}

impl CameraInterface for Box<dyn CameraInterface> {
    fn capture_frame(&mut self) -> CameraResult<Array2<u16>> {
        (**self).capture_frame()
    }

    fn set_active_region(&mut self, region: RegionGeometry) -> CameraResult<()> {
        (**self).set_active_region(region)
    }

    fn active_region(&self) -> RegionGeometry {
        (**self).active_region()
    }

    fn sensor_region(&self) -> RegionGeometry {
        (**self).sensor_region()
    }

    fn region_increments(&self) -> RegionIncrements {
        (**self).region_increments()
    }

    fn set_exposure(&mut self, exposure: ExposureSettings) -> CameraResult<f64> {
        (**self).set_exposure(exposure)
    }

    fn is_region_mode_active(&self) -> bool {
        (**self).is_region_mode_active()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn bit_depth(&self) -> u8 {
        (**self).bit_depth()
    }
}
