//! Camera composed with the spot locator.
//!
//! Holds the camera, the most recent frame, the spot finder thresholds and
//! exposure for each mode, and the diagnostic writer. The active mode is read
//! from the camera's region state so the thresholds always match the frame.

use crate::config::DiagnosticsSection;
use crate::error::TrackerError;
use crate::state::TrackingMode;
use ndarray::Array2;
use shared::camera_interface::{CameraInterface, CameraResult, ExposureSettings, RegionGeometry};
use shared::frame_writer::{FrameFormat, FrameWriterHandle};
use shared::image_proc::{SpotEstimate, SpotFinderParams, SpotLocator, SpotRejection};
use shared::image_size::PixelShape;

const LOST_FRAME_BIN: &str = "lost_frame.bin";
const LOST_FRAME_CSV: &str = "lost_frame.csv";
const ROWS_OUT: &str = "rows_out.csv";
const COLS_OUT: &str = "cols_out.csv";
const WRITER_QUEUE_DEPTH: usize = 8;

/// Per-mode settings for [`TrackingCamera`]
#[derive(Debug, Clone, Copy)]
pub struct ModeSettings {
    pub spot: SpotFinderParams,
    pub exposure: ExposureSettings,
}

pub struct TrackingCamera<C: CameraInterface> {
    camera: C,
    locator: SpotLocator,
    full: ModeSettings,
    roi: ModeSettings,
    frame: Option<Array2<u16>>,
    last_frame_rate: f64,
    diagnostics: DiagnosticsSection,
    writer: Option<FrameWriterHandle>,
}

impl<C: CameraInterface> TrackingCamera<C> {
    /// Wrap `camera`, put it in full-frame readout and apply the full-frame
    /// exposure.
    pub fn new(
        mut camera: C,
        full: ModeSettings,
        roi: ModeSettings,
        diagnostics: DiagnosticsSection,
    ) -> Result<Self, TrackerError> {
        if !camera.is_ready() {
            return Err(TrackerError::CameraNotReady(camera.name().to_string()));
        }

        if camera.is_region_mode_active() {
            let sensor = camera.sensor_region();
            camera.set_active_region(sensor)?;
        }
        let last_frame_rate = camera.set_exposure(full.exposure)?;
        log::info!(
            "Camera '{}' ready: sensor {}, {:.1} fps",
            camera.name(),
            camera.sensor_region(),
            last_frame_rate
        );

        let needs_writer = diagnostics.save_lost_frames
            || diagnostics.save_lost_frames_csv
            || full.spot.save_projections
            || roi.spot.save_projections;
        let writer = if needs_writer {
            match FrameWriterHandle::new(1, WRITER_QUEUE_DEPTH) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    log::warn!("Diagnostic writer unavailable, diagnostics disabled: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            camera,
            locator: SpotLocator::new(),
            full,
            roi,
            frame: None,
            last_frame_rate,
            diagnostics,
            writer,
        })
    }

    pub fn mode(&self) -> TrackingMode {
        if self.camera.is_region_mode_active() {
            TrackingMode::RegionOfInterest
        } else {
            TrackingMode::FullFrame
        }
    }

    fn settings(&self, mode: TrackingMode) -> &ModeSettings {
        match mode {
            TrackingMode::FullFrame => &self.full,
            TrackingMode::RegionOfInterest => &self.roi,
        }
    }

    /// Capture a new frame, replacing the stored one.
    ///
    /// On failure the previous frame is kept so the step can still run on it.
    pub fn capture(&mut self) -> CameraResult<()> {
        let frame = self.camera.capture_frame()?;
        self.frame = Some(frame);
        Ok(())
    }

    /// Most recent frame, possibly from before the last region change
    pub fn frame(&self) -> Option<&Array2<u16>> {
        self.frame.as_ref()
    }

    /// Locate the spot in the stored frame with the active mode's thresholds.
    ///
    /// With no usable frame the result is "not found".
    pub fn locate(&mut self) -> SpotEstimate {
        let mode = self.mode();
        let params = self.settings(mode).spot;
        let expected = self.camera.active_region().size();

        let Some(frame) = self.frame.as_ref() else {
            return SpotEstimate::NotFound(SpotRejection::NoFrame);
        };
        let shape = PixelShape::of_frame(&frame.view());
        if shape != expected {
            log::warn!(
                "Stored {shape} frame does not match active region {expected}, skipping spot search"
            );
            return SpotEstimate::NotFound(SpotRejection::StaleFrame);
        }

        let estimate = self.locator.locate(frame.view(), &params);
        if params.save_projections && estimate.is_found() {
            self.save_projections();
        }
        estimate
    }

    fn queue_write(&self, result: anyhow::Result<()>) {
        if let Err(e) = result {
            log::warn!("Diagnostic write dropped: {e:#}");
        }
    }

    fn save_projections(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (rows, cols) = self.locator.projections();
        let dir = &self.diagnostics.output_dir;
        self.queue_write(writer.write_profile(rows, dir.join(ROWS_OUT)));
        self.queue_write(writer.write_profile(cols, dir.join(COLS_OUT)));
    }

    /// Queue the stored frame for writing as the most recent lost-spot frame
    pub fn save_lost_frame(&self) {
        let (Some(writer), Some(frame)) = (&self.writer, &self.frame) else {
            return;
        };
        let dir = &self.diagnostics.output_dir;
        if self.diagnostics.save_lost_frames {
            self.queue_write(writer.write_frame(
                frame,
                dir.join(LOST_FRAME_BIN),
                FrameFormat::RawBigEndian,
            ));
        }
        if self.diagnostics.save_lost_frames_csv {
            self.queue_write(writer.write_frame(frame, dir.join(LOST_FRAME_CSV), FrameFormat::Csv));
        }
    }

    /// Switch to region readout with the region-mode exposure.
    ///
    /// # Returns
    /// The frame rate the camera settled on.
    pub fn enter_region(&mut self, region: RegionGeometry) -> CameraResult<f64> {
        self.camera.set_active_region(region)?;
        self.apply_exposure(self.roi.exposure)
    }

    /// Switch back to full-sensor readout with the full-frame exposure.
    pub fn exit_region(&mut self) -> CameraResult<f64> {
        let sensor = self.camera.sensor_region();
        self.camera.set_active_region(sensor)?;
        self.apply_exposure(self.full.exposure)
    }

    fn apply_exposure(&mut self, exposure: ExposureSettings) -> CameraResult<f64> {
        let rate = self.camera.set_exposure(exposure)?;
        self.last_frame_rate = rate;
        Ok(rate)
    }

    /// Remember a new exposure for `mode`, applying it now if that mode is active.
    ///
    /// # Returns
    /// The achieved frame rate when applied immediately.
    pub fn set_mode_exposure(
        &mut self,
        mode: TrackingMode,
        exposure: ExposureSettings,
    ) -> CameraResult<Option<f64>> {
        match mode {
            TrackingMode::FullFrame => self.full.exposure = exposure,
            TrackingMode::RegionOfInterest => self.roi.exposure = exposure,
        }
        if mode == self.mode() {
            self.apply_exposure(exposure).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn mode_exposure(&self, mode: TrackingMode) -> ExposureSettings {
        self.settings(mode).exposure
    }

    /// Frame rate reported by the last exposure change
    pub fn frame_rate(&self) -> f64 {
        self.last_frame_rate
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    /// Wait for queued diagnostic writes to reach disk
    pub fn flush_diagnostics(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.wait_for_completion();
        }
    }
}
