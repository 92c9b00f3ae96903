//! FINETRACK - closed-loop laser spot tracker
//!
//! Keeps a laser spot imaged by a camera on a target pixel by steering a
//! two-axis mirror. Each step captures a frame, locates the spot from its row
//! and column projections, feeds the error through one PID controller per
//! axis and commands the accumulated mirror position. Once the spot is close
//! to target the camera is narrowed to a region of interest for a faster
//! frame rate, and widened again as soon as the spot is lost.

use shared::camera_interface::{CameraInterface, RegionGeometry};
use shared::fsm_interface::FsmInterface;
use shared::image_proc::SpotEstimate;
use std::time::{Duration, Instant};

pub mod config;
pub mod controllers;
pub mod display;
pub mod error;
pub mod mode;
pub mod state;
pub mod telemetry;
pub mod tracking_camera;

use crate::controllers::MirrorController;
use crate::display::{key_action, DisplayAnnotations, DisplayInterface, Key, KeyAction};
use crate::tracking_camera::{ModeSettings, TrackingCamera};

// Re-export commonly used types for external use
pub use crate::config::{ResolvedConfig, TrackerConfig};
pub use crate::error::TrackerError;
pub use crate::mode::{CameraSettingsUpdate, ModeSupervisor};
pub use crate::state::{TrackerRuntimeState, TrackingMode};
pub use crate::telemetry::{StepRecord, TelemetryLog};

/// Apply camera settings updates to a tracking camera
///
/// Helper function to apply a list of camera settings updates returned by the
/// mode supervisor. Logs warnings if any setting fails to apply but continues
/// with remaining settings.
///
/// # Arguments
/// * `camera` - The camera to apply settings to
/// * `updates` - List of settings updates to apply
pub fn apply_camera_settings<C: CameraInterface>(
    camera: &mut TrackingCamera<C>,
    updates: Vec<CameraSettingsUpdate>,
) {
    for setting in updates {
        match setting {
            CameraSettingsUpdate::EnterRegion { region } => match camera.enter_region(region) {
                Ok(rate) => log::debug!("Region readout {region} at {rate:.1} fps"),
                Err(e) => log::warn!("Failed to enter region readout: {e}"),
            },
            CameraSettingsUpdate::ExitRegion => match camera.exit_region() {
                Ok(rate) => log::debug!("Full-frame readout at {rate:.1} fps"),
                Err(e) => log::warn!("Failed to return to full-frame readout: {e}"),
            },
        }
    }
}

/// How a call to [`FineTracker::run`] ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps_run: u64,
    /// Steps where the spot was found
    pub steps_found: u64,
    /// Loop ended on a quit key rather than the step count
    pub quit_requested: bool,
}

/// What the display shows for the frame of the latest step
#[derive(Debug, Clone, Copy)]
struct LastStepView {
    spot: Option<(f64, f64)>,
    setpoint: (f64, f64),
    region_mode: bool,
}

/// The tracking loop
pub struct FineTracker<C: CameraInterface, M: FsmInterface> {
    camera: TrackingCamera<C>,
    mirror: M,
    supervisor: ModeSupervisor,
    controllers: MirrorController,
    state: TrackerRuntimeState,
    telemetry: TelemetryLog,
    config: ResolvedConfig,
    last_view: Option<LastStepView>,
}

impl<C: CameraInterface, M: FsmInterface> FineTracker<C, M> {
    /// Set up the tracker and centre the mirror.
    ///
    /// # Errors
    /// Fails if the configuration is invalid, the camera is not ready, or the
    /// region (after snapping to the camera's increments) does not fit on the
    /// sensor or covers all of it.
    pub fn new(camera: C, mut mirror: M, config: &TrackerConfig) -> Result<Self, TrackerError> {
        let config = config.resolve()?;

        if !camera.is_ready() {
            return Err(TrackerError::CameraNotReady(camera.name().to_string()));
        }
        if camera.bit_depth() != config.bits_per_pixel {
            log::warn!(
                "Camera '{}' delivers {}-bit samples, configuration expects {}",
                camera.name(),
                camera.bit_depth(),
                config.bits_per_pixel
            );
        }

        let roi_region = snap_and_validate(&camera, config.roi_region)?;
        if roi_region != config.roi_region {
            log::info!(
                "Region {} snapped to {} by camera increments",
                config.roi_region,
                roi_region
            );
        }

        let camera = TrackingCamera::new(
            camera,
            ModeSettings {
                spot: config.full_spot,
                exposure: config.full_exposure,
            },
            ModeSettings {
                spot: config.roi_spot,
                exposure: config.roi_exposure,
            },
            config.diagnostics.clone(),
        )?;

        let supervisor = ModeSupervisor::new(
            config.do_roi,
            config.roi_threshold,
            config.full_setpoint,
            roi_region,
        );
        let state = TrackerRuntimeState::new(config.full_setpoint);

        if let Err(e) = mirror.move_to(0.0, 0.0) {
            log::warn!("Failed to centre mirror at startup: {e}");
        }

        Ok(Self {
            camera,
            mirror,
            supervisor,
            controllers: MirrorController::new(config.full_pid),
            state,
            telemetry: TelemetryLog::new(),
            config,
            last_view: None,
        })
    }

    /// Run one control step: capture, locate, control, switch mode, record.
    pub fn step(&mut self) -> SpotEstimate {
        let loop_start = Instant::now();

        let capture_start = Instant::now();
        if let Err(e) = self.camera.capture() {
            log::warn!("Frame capture failed, using previous frame: {e}");
        }
        let t_camera = capture_start.elapsed();

        let estimate = self.camera.locate();
        let setpoint = self.state.setpoint;
        let region_mode = self.state.is_region_mode();
        let mut t_mirror = Duration::ZERO;

        let (error, updates) = match estimate {
            SpotEstimate::Found { x, y } => {
                self.state.loss_count = 0;
                let error = (x - setpoint.0, y - setpoint.1);

                if self.state.tracking_enabled {
                    let mirror_start = Instant::now();
                    let (dx, dy) = self.controllers.update(error);
                    let (mx, my) = self.state.mirror_position;
                    self.set_mirror_position((mx + dx, my + dy));
                    t_mirror = mirror_start.elapsed();
                }

                let updates = self.supervisor.on_spot_found(&mut self.state, error);
                (Some(error), updates)
            }
            SpotEstimate::NotFound(reason) => {
                self.state.loss_count += 1;
                log::warn!(
                    "Spot not found: {reason} ({} consecutive)",
                    self.state.loss_count
                );
                self.camera.save_lost_frame();

                let updates = self.supervisor.on_spot_lost(&mut self.state);

                if self.state.loss_count > self.config.loss_reset_threshold {
                    log::warn!(
                        "Spot lost for {} steps, resetting mirror",
                        self.state.loss_count
                    );
                    self.set_mirror_position((0.0, 0.0));
                    self.controllers.reset();
                    self.state.loss_count = 0;
                }
                (None, updates)
            }
        };

        if !updates.is_empty() {
            apply_camera_settings(&mut self.camera, updates);
            self.sync_mode_with_camera();
        }

        self.last_view = Some(LastStepView {
            spot: estimate.position(),
            setpoint,
            region_mode,
        });

        self.telemetry.append(StepRecord {
            step: self.state.step_index,
            spot: estimate.position(),
            error,
            mirror: self.state.mirror_position,
            tracking_enabled: self.state.tracking_enabled,
            roi_active: self.state.is_region_mode(),
            t_camera,
            t_mirror,
            t_loop: loop_start.elapsed(),
        });
        self.state.step_index += 1;

        estimate
    }

    /// Bring the runtime state in line with the readout the camera actually
    /// uses, and swap controller gains if configured to.
    fn sync_mode_with_camera(&mut self) {
        let camera_mode = self.camera.mode();
        if camera_mode != self.state.mode {
            log::warn!(
                "Camera stayed in {} readout, tracker follows",
                camera_mode
            );
            self.state.mode = camera_mode;
        }
        self.state.setpoint = self.supervisor.setpoint_for(self.state.mode);

        if self.config.apply_mode_gains {
            let params = match self.state.mode {
                TrackingMode::FullFrame => self.config.full_pid,
                TrackingMode::RegionOfInterest => self.config.roi_pid,
            };
            self.controllers.set_params(params);
        }
    }

    /// Store and command a new absolute mirror position.
    ///
    /// The stored position is kept even if the command fails.
    fn set_mirror_position(&mut self, position: (f64, f64)) {
        let (mut x, mut y) = position;
        if let Some(limit) = self.config.position_limit {
            x = x.clamp(-limit, limit);
            y = y.clamp(-limit, limit);
        }
        self.state.mirror_position = (x, y);
        if let Err(e) = self.mirror.move_to(x, y) {
            log::warn!("Mirror command ({x:.4}, {y:.4}) failed: {e}");
        }
    }

    /// Enable tracking for the next step according to the on/off period
    fn apply_tracker_period(&mut self) {
        let period = self.config.tracker_period;
        if period == 0 {
            return;
        }
        let on = (self.state.step_index / period) % 2 == 0;
        if on != self.state.tracking_enabled {
            log::info!("Tracker {}", if on { "on" } else { "off" });
            self.state.tracking_enabled = on;
        }
    }

    /// React to a key press.
    ///
    /// # Returns
    /// The action the key maps to, if any. Nudges are ignored while tracking.
    pub fn handle_key(&mut self, key: Key) -> Option<KeyAction> {
        let action = key_action(key)?;
        match action {
            KeyAction::Quit => log::info!("'q' pressed, quitting"),
            KeyAction::ToggleTracking => {
                let on = !self.state.tracking_enabled;
                log::info!(
                    "Turning tracker {}, 't' to turn {}",
                    if on { "on" } else { "off" },
                    if on { "off" } else { "on" }
                );
                self.state.tracking_enabled = on;
            }
            KeyAction::Nudge(direction) => {
                if self.state.tracking_enabled {
                    log::info!(
                        "Mirror under closed loop control, ignoring arrow keys; press 't' to take control"
                    );
                } else {
                    let (dx, dy) = direction.delta(self.config.nudge_increment);
                    let (mx, my) = self.state.mirror_position;
                    log::info!("Nudge {direction:?}");
                    self.set_mirror_position((mx + dx, my + dy));
                }
            }
        }
        Some(action)
    }

    /// Run steps until `max_steps` have run (0 runs forever), then write the
    /// telemetry report.
    pub fn run(&mut self, max_steps: u64) -> Result<RunSummary, TrackerError> {
        self.run_loop(max_steps, None)
    }

    /// As [`FineTracker::run`], rendering every frame and handling keys.
    pub fn run_with_display<D: DisplayInterface>(
        &mut self,
        max_steps: u64,
        display: &mut D,
    ) -> Result<RunSummary, TrackerError> {
        self.run_loop(max_steps, Some(display))
    }

    fn run_loop(
        &mut self,
        max_steps: u64,
        mut display: Option<&mut dyn DisplayInterface>,
    ) -> Result<RunSummary, TrackerError> {
        let mut summary = RunSummary::default();

        loop {
            if max_steps != 0 && summary.steps_run >= max_steps {
                log::info!("Requested number of tracker steps completed");
                break;
            }

            self.apply_tracker_period();
            let estimate = self.step();
            summary.steps_run += 1;
            if estimate.is_found() {
                summary.steps_found += 1;
            }

            if let Some(display) = display.as_deref_mut() {
                if let Some(key) = self.render(display) {
                    if self.handle_key(key) == Some(KeyAction::Quit) {
                        summary.quit_requested = true;
                        break;
                    }
                }
            }
        }

        self.telemetry
            .flush_to_path(self.config.diagnostics.telemetry_path())?;
        Ok(summary)
    }

    fn render(&self, display: &mut dyn DisplayInterface) -> Option<Key> {
        let frame = self.camera.frame()?;
        let view = self.last_view?;
        let annotations = DisplayAnnotations::for_level(
            self.config.display_level,
            view.spot,
            view.setpoint,
            self.supervisor.roi_region(),
            view.region_mode,
        );
        display.render_and_poll_key(frame.view(), &annotations)
    }

    /// Replace the region of interest.
    ///
    /// The region is snapped to the camera increments and checked against the
    /// sensor. If region readout is active the camera switches to it now.
    ///
    /// # Returns
    /// The region as applied after snapping.
    ///
    /// # Errors
    /// Rejects regions off the sensor or covering all of it. If the camera
    /// fails to switch, the setpoint follows the region it is actually reading.
    pub fn set_roi_region(&mut self, region: RegionGeometry) -> Result<RegionGeometry, TrackerError> {
        let snapped = snap_and_validate(self.camera.camera(), region)?;
        let previous = self.supervisor.roi_region();
        self.supervisor.set_roi_region(snapped);

        if self.state.is_region_mode() {
            if let Err(e) = self.camera.enter_region(snapped) {
                // Keep the setpoint on whichever region the camera ended up reading
                if self.camera.camera().active_region() != snapped {
                    self.supervisor.set_roi_region(previous);
                }
                self.sync_mode_with_camera();
                return Err(e.into());
            }
            self.state.setpoint = self.supervisor.roi_setpoint();
        }
        log::info!("Region of interest set to {snapped}");
        Ok(snapped)
    }

    /// Setpoint in effect for the current mode
    pub fn active_setpoint(&self) -> (f64, f64) {
        self.state.setpoint
    }

    /// Change the full-frame setpoint, taking effect now if in full-frame mode
    pub fn set_full_setpoint(&mut self, setpoint: (f64, f64)) {
        self.supervisor.set_full_setpoint(setpoint);
        if self.state.mode == TrackingMode::FullFrame {
            self.state.setpoint = setpoint;
        }
    }

    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        self.state.tracking_enabled = enabled;
    }

    pub fn state(&self) -> &TrackerRuntimeState {
        &self.state
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    pub fn supervisor(&self) -> &ModeSupervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn tracking_camera(&self) -> &TrackingCamera<C> {
        &self.camera
    }

    pub fn tracking_camera_mut(&mut self) -> &mut TrackingCamera<C> {
        &mut self.camera
    }

    pub fn camera(&self) -> &C {
        self.camera.camera()
    }

    pub fn camera_mut(&mut self) -> &mut C {
        self.camera.camera_mut()
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut M {
        &mut self.mirror
    }

    /// Wait for queued diagnostic files; no further diagnostics are written
    pub fn flush_diagnostics(&mut self) {
        self.camera.flush_diagnostics();
    }
}

fn snap_and_validate<C: CameraInterface>(
    camera: &C,
    region: RegionGeometry,
) -> Result<RegionGeometry, TrackerError> {
    let snapped = region.snapped(camera.region_increments());
    let sensor = camera.sensor_region();
    snapped
        .validate_for_sensor(sensor.size())
        .map_err(TrackerError::RegionOutOfBounds)?;
    if snapped == sensor {
        return Err(TrackerError::RegionCoversSensor(snapped));
    }
    Ok(snapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use shared::camera_interface::mock::MockCameraInterface;
    use shared::camera_interface::RegionIncrements;
    use shared::fsm_interface::mock::MockFsm;

    fn small_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.camera.roi_center = (32, 32);
        config.camera.roi_size = (16, 16);
        config.diagnostics.save_lost_frames = false;
        config
    }

    fn spot_frame(row: usize, col: usize) -> Array2<u16> {
        let mut frame = Array2::<u16>::zeros((64, 64));
        for r in row..row + 3 {
            for c in col..col + 3 {
                frame[[r, c]] = 900;
            }
        }
        frame
    }

    #[test]
    fn test_region_outside_sensor_is_fatal() {
        let mut config = small_config();
        config.camera.roi_center = (60, 60);
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));

        let result = FineTracker::new(camera, MockFsm::new(), &config);
        assert!(matches!(result, Err(TrackerError::RegionOutOfBounds(_))));
    }

    #[test]
    fn test_region_snapped_to_increments() {
        let mut config = small_config();
        config.camera.roi_size = (18, 18);
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10))
            .with_increments(RegionIncrements::new(4, 4, 8, 8));

        let tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();
        // center 32 - 9 = 23 -> 20, size 18 -> 16
        assert_eq!(
            tracker.supervisor().roi_region(),
            RegionGeometry::new(20, 20, 16, 16)
        );
        assert_eq!(tracker.supervisor().roi_setpoint(), (8.0, 8.0));
    }

    #[test]
    fn test_step_moves_mirror_by_clamped_delta() {
        // Spot centred at (11, 11), setpoint (32, 32): error -21 on both axes
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &small_config()).unwrap();

        let estimate = tracker.step();
        assert_eq!(estimate.position(), Some((11.0, 11.0)));
        assert_eq!(tracker.state().mirror_position, (-0.25, -0.25));
        assert_eq!(tracker.mirror().last_command(), Some((-0.25, -0.25)));

        let record = &tracker.telemetry().records()[0];
        assert_eq!(record.error, Some((-21.0, -21.0)));
        assert!(record.spot_found());
    }

    #[test]
    fn test_tracking_disabled_leaves_mirror() {
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &small_config()).unwrap();
        tracker.set_tracking_enabled(false);

        tracker.step();
        assert_eq!(tracker.state().mirror_position, (0.0, 0.0));
        // Only the startup centring command
        assert_eq!(tracker.mirror().commands().len(), 1);
        assert_eq!(tracker.telemetry().records()[0].t_mirror, Duration::ZERO);
    }

    #[test]
    fn test_position_limit_clamps_accumulated_position() {
        let mut config = small_config();
        config.mirror.position_limit = Some(0.3);
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();

        for _ in 0..3 {
            tracker.step();
        }
        assert_eq!(tracker.state().mirror_position, (-0.3, -0.3));
    }

    #[test]
    fn test_mirror_failure_is_not_fatal() {
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &small_config()).unwrap();
        tracker.mirror_mut().fail_next_moves(1);

        tracker.step();
        // Accumulated position is kept even though the command failed
        assert_eq!(tracker.state().mirror_position, (-0.25, -0.25));
        assert_eq!(tracker.mirror().commands().len(), 1);

        tracker.step();
        assert_eq!(tracker.mirror().last_command(), Some((-0.5, -0.5)));
    }

    #[test]
    fn test_nudge_only_when_untracked() {
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &small_config()).unwrap();

        assert_eq!(
            tracker.handle_key(Key::Right),
            Some(KeyAction::Nudge(display::NudgeDirection::Right))
        );
        assert_eq!(tracker.state().mirror_position, (0.0, 0.0));

        tracker.handle_key(Key::Char('t'));
        assert!(!tracker.state().tracking_enabled);
        tracker.handle_key(Key::Right);
        tracker.handle_key(Key::Up);
        assert_eq!(tracker.state().mirror_position, (0.01, 0.01));
        assert_eq!(tracker.mirror().last_command(), Some((0.01, 0.01)));

        assert_eq!(tracker.handle_key(Key::Char('z')), None);
    }

    #[test]
    fn test_full_setpoint_change() {
        let camera = MockCameraInterface::new_repeating(spot_frame(10, 10));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &small_config()).unwrap();
        assert_eq!(tracker.active_setpoint(), (32.0, 32.0));

        tracker.set_full_setpoint((11.0, 11.0));
        assert_eq!(tracker.active_setpoint(), (11.0, 11.0));
        tracker.step();
        assert_eq!(tracker.state().mirror_position, (0.0, 0.0));
    }
}
