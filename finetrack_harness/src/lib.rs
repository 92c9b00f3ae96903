//! Fine tracker harness for simulation and demonstration
//!
//! Provides a simulated optical bench (camera and steering mirror sharing a
//! drifting laser beam), drift profiles, and a terminal front end, so the
//! `finetrack` control loop can be run closed-loop without hardware.

pub mod motion_profiles;
pub mod simulated_bench;
pub mod terminal_display;

pub use motion_profiles::{DriftMotion, DriftProfiles};
pub use simulated_bench::{BenchParams, SimulatedBench, SimulatedMirror, SimulatorCamera};
pub use terminal_display::TerminalDisplay;

use finetrack::TrackerConfig;

/// Bench parameters matching a tracker configuration: same bit depth, and
/// the beam resting `offset` pixels from the full-frame setpoint.
pub fn bench_params_for(config: &TrackerConfig, offset: (f64, f64)) -> BenchParams {
    let (cx, cy) = config.camera.roi_center;
    BenchParams {
        bit_depth: config.camera.bits_per_pixel,
        rest_position: (cx as f64 + offset.0, cy as f64 + offset.1),
        ..Default::default()
    }
}
