use serde::{Deserialize, Serialize};
use std::fmt;

/// Which readout the camera is using, and with it which setpoint and spot
/// finder thresholds apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingMode {
    /// Whole sensor, slow; used to acquire the spot
    FullFrame,
    /// Reduced window around the setpoint, fast; used once the spot is close
    RegionOfInterest,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackingMode::FullFrame => write!(f, "full frame"),
            TrackingMode::RegionOfInterest => write!(f, "region of interest"),
        }
    }
}

/// Mutable state of a running tracker.
///
/// Owned by [`crate::FineTracker`] and only changed during a step or while
/// handling an input event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerRuntimeState {
    /// Active acquisition mode
    pub mode: TrackingMode,
    /// Target spot position in the coordinates of the active readout
    pub setpoint: (f64, f64),
    /// Accumulated absolute mirror command
    pub mirror_position: (f64, f64),
    /// Consecutive steps without a spot
    pub loss_count: u32,
    /// Whether the PID output is applied to the mirror
    pub tracking_enabled: bool,
    /// Index of the next step to run, drives the periodic on/off toggle
    pub step_index: u64,
}

impl TrackerRuntimeState {
    pub fn new(full_setpoint: (f64, f64)) -> Self {
        Self {
            mode: TrackingMode::FullFrame,
            setpoint: full_setpoint,
            mirror_position: (0.0, 0.0),
            loss_count: 0,
            tracking_enabled: true,
            step_index: 0,
        }
    }

    pub fn is_region_mode(&self) -> bool {
        self.mode == TrackingMode::RegionOfInterest
    }
}
