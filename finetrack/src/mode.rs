//! Full-frame / region-of-interest mode switching.
//!
//! Narrowing to the region requires the spot to be found and well inside the
//! region on both axes. Widening back to full frame happens on the first
//! failed spot search in region mode, with no boundary check.

use crate::state::{TrackerRuntimeState, TrackingMode};
use shared::camera_interface::RegionGeometry;

/// Camera settings update requested by the mode supervisor
///
/// The supervisor decides what camera settings need to change but does not
/// apply them. The caller applies these updates before the next capture.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraSettingsUpdate {
    /// Read out only this region, with the region-mode exposure
    EnterRegion { region: RegionGeometry },
    /// Return to full-sensor readout, with the full-frame exposure
    ExitRegion,
}

/// Decides mode transitions and owns the per-mode setpoints
#[derive(Debug, Clone)]
pub struct ModeSupervisor {
    do_roi: bool,
    roi_threshold: f64,
    full_setpoint: (f64, f64),
    roi_region: RegionGeometry,
    roi_setpoint: (f64, f64),
    boundary: (f64, f64),
}

impl ModeSupervisor {
    /// # Arguments
    /// * `do_roi` - Whether region readout may be used at all
    /// * `roi_threshold` - Fraction of the half-region size defining the boundary
    /// * `full_setpoint` - Target in full-frame pixels
    /// * `roi_region` - Region geometry, already snapped to the camera increments
    pub fn new(
        do_roi: bool,
        roi_threshold: f64,
        full_setpoint: (f64, f64),
        roi_region: RegionGeometry,
    ) -> Self {
        let mut supervisor = Self {
            do_roi,
            roi_threshold,
            full_setpoint,
            roi_region,
            roi_setpoint: (0.0, 0.0),
            boundary: (0.0, 0.0),
        };
        supervisor.set_roi_region(roi_region);
        supervisor
    }

    /// Replace the region and recompute its setpoint and hysteresis boundary
    pub fn set_roi_region(&mut self, region: RegionGeometry) {
        self.roi_region = region;
        self.roi_setpoint = region.local_center();
        self.boundary = (
            (region.width / 2) as f64 * self.roi_threshold,
            (region.height / 2) as f64 * self.roi_threshold,
        );
    }

    pub fn roi_region(&self) -> RegionGeometry {
        self.roi_region
    }

    pub fn full_setpoint(&self) -> (f64, f64) {
        self.full_setpoint
    }

    pub fn set_full_setpoint(&mut self, setpoint: (f64, f64)) {
        self.full_setpoint = setpoint;
    }

    pub fn roi_setpoint(&self) -> (f64, f64) {
        self.roi_setpoint
    }

    /// Per-axis error magnitude the spot must be strictly inside to narrow
    pub fn boundary(&self) -> (f64, f64) {
        self.boundary
    }

    /// Setpoint that applies in `mode`
    pub fn setpoint_for(&self, mode: TrackingMode) -> (f64, f64) {
        match mode {
            TrackingMode::FullFrame => self.full_setpoint,
            TrackingMode::RegionOfInterest => self.roi_setpoint,
        }
    }

    /// Evaluate a step where the spot was found with the given error.
    pub fn on_spot_found(
        &self,
        state: &mut TrackerRuntimeState,
        error: (f64, f64),
    ) -> Vec<CameraSettingsUpdate> {
        if !self.do_roi || state.mode != TrackingMode::FullFrame {
            return vec![];
        }

        let inside = error.0.abs() < self.boundary.0 && error.1.abs() < self.boundary.1;
        if !inside {
            return vec![];
        }

        log::info!(
            "Spot within ({:.1}, {:.1}) of setpoint, switching to region {}",
            self.boundary.0,
            self.boundary.1,
            self.roi_region
        );
        state.mode = TrackingMode::RegionOfInterest;
        state.setpoint = self.roi_setpoint;
        vec![CameraSettingsUpdate::EnterRegion {
            region: self.roi_region,
        }]
    }

    /// Evaluate a step where no spot was found.
    pub fn on_spot_lost(&self, state: &mut TrackerRuntimeState) -> Vec<CameraSettingsUpdate> {
        if state.mode != TrackingMode::RegionOfInterest {
            return vec![];
        }

        log::info!("Spot lost in region mode, returning to full frame");
        state.mode = TrackingMode::FullFrame;
        state.setpoint = self.full_setpoint;
        vec![CameraSettingsUpdate::ExitRegion]
    }
}
