//! Full-frame / region-of-interest transitions driven through the tracker

mod common;

use approx::assert_relative_eq;
use common::{blank_frame, init_logging, square_spot_frame, test_config};
use finetrack::controllers::PidGains;
use finetrack::{FineTracker, TrackerError, TrackingMode};
use shared::camera_interface::mock::MockCameraInterface;
use shared::camera_interface::{CameraInterface, RegionGeometry};
use shared::fsm_interface::mock::MockFsm;
use tempfile::TempDir;

const SHAPE: (usize, usize) = (128, 128);

/// 3x3 spot centred on full-frame pixel (`x`, `y`)
fn spot_at(x: usize, y: usize) -> ndarray::Array2<u16> {
    square_spot_frame(SHAPE, y - 1, x - 1, 3, 1000)
}

fn tracker_with_frames(
    temp_dir: &TempDir,
    frames: Vec<ndarray::Array2<u16>>,
) -> FineTracker<MockCameraInterface, MockFsm> {
    let mut config = test_config(temp_dir.path());
    config.tracker.do_roi = true;
    config.diagnostics.save_lost_frames = false;
    let mut tracker =
        FineTracker::new(MockCameraInterface::new(frames), MockFsm::new(), &config).unwrap();
    tracker.set_tracking_enabled(false);
    tracker
}

#[test]
fn test_error_at_boundary_stays_full_frame() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    // Boundary is (32 / 2) * 0.5 = 8 pixels; error of exactly 8 must not narrow
    let mut tracker = tracker_with_frames(&temp_dir, vec![spot_at(72, 64), spot_at(64, 56)]);
    assert_eq!(tracker.supervisor().boundary(), (8.0, 8.0));

    tracker.step();
    assert_eq!(tracker.state().mode, TrackingMode::FullFrame);
    tracker.step();
    assert_eq!(tracker.state().mode, TrackingMode::FullFrame);
    assert!(!tracker.camera().is_region_mode_active());
}

#[test]
fn test_error_inside_boundary_narrows_and_loss_widens() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut tracker = tracker_with_frames(
        &temp_dir,
        vec![spot_at(71, 64), spot_at(71, 64), blank_frame(SHAPE), spot_at(71, 64)],
    );

    // 1: error (7, 0) is inside the boundary
    tracker.step();
    assert_eq!(tracker.state().mode, TrackingMode::RegionOfInterest);
    assert_eq!(tracker.active_setpoint(), (16.0, 16.0));
    assert_eq!(
        tracker.camera().active_region(),
        RegionGeometry::new(48, 48, 32, 32)
    );
    let last_exposure = tracker.camera().exposure_log().last().unwrap();
    assert_relative_eq!(last_exposure.frame_rate_hz, 60.0);
    assert!(tracker.telemetry().records()[0].roi_active);

    // 2: the spot is now located in region coordinates
    let position = tracker.step().position().unwrap();
    assert_eq!(position, (23.0, 16.0));
    assert_eq!(tracker.telemetry().records()[1].error, Some((7.0, 0.0)));

    // 3: losing the spot widens at once
    assert!(!tracker.step().is_found());
    assert_eq!(tracker.state().mode, TrackingMode::FullFrame);
    assert_eq!(tracker.active_setpoint(), (64.0, 64.0));
    assert!(!tracker.camera().is_region_mode_active());
    let last_exposure = tracker.camera().exposure_log().last().unwrap();
    assert_relative_eq!(last_exposure.frame_rate_hz, 10.0);

    // 4: back in full-frame coordinates
    assert_eq!(tracker.step().position(), Some((71.0, 64.0)));
}

#[test]
fn test_region_disabled_never_narrows() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();

    for _ in 0..5 {
        tracker.step();
    }
    assert_eq!(tracker.state().mode, TrackingMode::FullFrame);
    assert!(tracker.camera().region_log().is_empty());
}

#[test]
fn test_mode_gains_applied_only_when_configured() {
    init_logging();

    for apply in [false, true] {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.tracker.do_roi = true;
        config.tracker.full_pid = PidGains::new(0.01, 0.0, 0.0);
        config.tracker.roi_pid = PidGains::new(0.02, 0.0, 0.0);
        config.tracker.apply_mode_gains = apply;
        let camera = MockCameraInterface::new_repeating(spot_at(70, 66));
        let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();

        // Full frame: error (6, 2) with P = 0.01
        tracker.step();
        let (x, y) = tracker.state().mirror_position;
        assert_relative_eq!(x, 0.06, epsilon = 1e-12);
        assert_relative_eq!(y, 0.02, epsilon = 1e-12);

        // Region: same error, gain depends on the flag
        tracker.step();
        let p = if apply { 0.02 } else { 0.01 };
        let (x, y) = tracker.state().mirror_position;
        assert_relative_eq!(x, 0.06 + 6.0 * p, epsilon = 1e-12);
        assert_relative_eq!(y, 0.02 + 2.0 * p, epsilon = 1e-12);
    }
}

#[test]
fn test_replace_region_while_active() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.tracker.do_roi = true;
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();
    tracker.set_tracking_enabled(false);

    tracker.step();
    assert_eq!(tracker.state().mode, TrackingMode::RegionOfInterest);

    let applied = tracker
        .set_roi_region(RegionGeometry::new(40, 40, 48, 48))
        .unwrap();
    assert_eq!(applied, RegionGeometry::new(40, 40, 48, 48));
    assert_eq!(tracker.camera().active_region(), applied);
    assert_eq!(tracker.active_setpoint(), (24.0, 24.0));
    assert_eq!(tracker.supervisor().boundary(), (12.0, 12.0));

    assert_eq!(tracker.step().position(), Some((24.0, 24.0)));
}

#[test]
fn test_replace_region_outside_sensor_rejected() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker =
        FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path())).unwrap();

    let result = tracker.set_roi_region(RegionGeometry::new(100, 100, 64, 64));
    assert!(matches!(result, Err(TrackerError::RegionOutOfBounds(_))));
    assert_eq!(
        tracker.supervisor().roi_region(),
        RegionGeometry::new(48, 48, 32, 32)
    );
}

#[test]
fn test_replace_region_with_failed_exposure_follows_camera() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.tracker.do_roi = true;
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();
    tracker.set_tracking_enabled(false);

    tracker.step();
    assert_eq!(tracker.state().mode, TrackingMode::RegionOfInterest);

    // The region is programmed, then the exposure change fails
    tracker.camera_mut().fail_next_exposures(1);
    let result = tracker.set_roi_region(RegionGeometry::new(40, 40, 48, 48));
    assert!(matches!(result, Err(TrackerError::CameraSetup(_))));

    assert_eq!(
        tracker.camera().active_region(),
        RegionGeometry::new(40, 40, 48, 48)
    );
    assert_eq!(tracker.state().mode, TrackingMode::RegionOfInterest);
    assert_eq!(tracker.active_setpoint(), (24.0, 24.0));

    assert_eq!(tracker.step().position(), Some((24.0, 24.0)));
    let record = tracker.telemetry().records().last().unwrap();
    assert_eq!(record.error, Some((0.0, 0.0)));
}

#[test]
fn test_replace_region_past_usize_max_rejected() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker =
        FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path())).unwrap();

    let result = tracker.set_roi_region(RegionGeometry::new(usize::MAX - 4, 0, 16, 16));
    assert!(matches!(result, Err(TrackerError::RegionOutOfBounds(_))));
    assert_eq!(
        tracker.supervisor().roi_region(),
        RegionGeometry::new(48, 48, 32, 32)
    );
}

#[test]
fn test_region_covering_sensor_rejected() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.tracker.do_roi = true;
    config.camera.roi_size = (128, 128);
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let result = FineTracker::new(camera, MockFsm::new(), &config);
    assert!(matches!(result, Err(TrackerError::RegionCoversSensor(_))));

    let camera = MockCameraInterface::new_repeating(spot_at(64, 64));
    let mut tracker =
        FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path())).unwrap();
    let result = tracker.set_roi_region(RegionGeometry::new(0, 0, 128, 128));
    assert!(matches!(result, Err(TrackerError::RegionCoversSensor(_))));
    assert_eq!(
        tracker.supervisor().roi_region(),
        RegionGeometry::new(48, 48, 32, 32)
    );
}

#[test]
fn test_not_ready_camera_is_fatal() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let camera = MockCameraInterface::new_repeating(spot_at(64, 64)).with_ready(false);
    let result = FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path()));
    assert!(matches!(result, Err(TrackerError::CameraNotReady(_))));
}
