//! Periodic tracker on/off switching

mod common;

use approx::assert_relative_eq;
use common::{init_logging, square_spot_frame, test_config};
use finetrack::display::{Key, ScriptedDisplay};
use finetrack::FineTracker;
use shared::camera_interface::mock::MockCameraInterface;
use shared::fsm_interface::mock::MockFsm;
use tempfile::TempDir;

/// Spot centred at (60, 64), four pixels left of the full-frame setpoint
fn offset_spot() -> ndarray::Array2<u16> {
    square_spot_frame((128, 128), 63, 59, 3, 1000)
}

#[test]
fn test_period_alternates_blocks_of_steps() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.tracker.tracker_period = 4;
    let camera = MockCameraInterface::new_repeating(offset_spot());
    let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();

    let summary = tracker.run(12).unwrap();
    assert_eq!(summary.steps_run, 12);
    assert_eq!(summary.steps_found, 12);

    let flags: Vec<bool> = tracker
        .telemetry()
        .records()
        .iter()
        .map(|r| r.tracking_enabled)
        .collect();
    let expected: Vec<bool> = (0..12).map(|k| (k / 4) % 2 == 0).collect();
    assert_eq!(flags, expected);

    // Only the eight tracked steps move the mirror, each by the step limit
    assert_relative_eq!(tracker.state().mirror_position.0, -2.0, epsilon = 1e-12);
    assert_eq!(tracker.mirror().commands().len(), 1 + 8);

    let report = std::fs::read_to_string(temp_dir.path().join("tracker_data.csv")).unwrap();
    assert_eq!(report.lines().count(), 13);
}

#[test]
fn test_zero_period_keeps_tracking_on() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let camera = MockCameraInterface::new_repeating(offset_spot());
    let mut tracker =
        FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path())).unwrap();

    tracker.run(6).unwrap();
    assert!(tracker
        .telemetry()
        .records()
        .iter()
        .all(|r| r.tracking_enabled));
}

#[test]
fn test_period_overrides_manual_toggle() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let mut config = test_config(temp_dir.path());
    config.tracker.tracker_period = 4;
    let camera = MockCameraInterface::new_repeating(offset_spot());
    let mut tracker = FineTracker::new(camera, MockFsm::new(), &config).unwrap();

    // 't' after step 0 turns tracking off, the period turns it back on
    let mut display = ScriptedDisplay::key_at(0, Key::Char('t'));
    tracker.run_with_display(3, &mut display).unwrap();

    let records = tracker.telemetry().records();
    assert!(records[0].tracking_enabled);
    assert!(records[1].tracking_enabled);
    assert!(records[2].tracking_enabled);
    assert_eq!(display.frames_rendered(), 3);
}

#[test]
fn test_manual_toggle_without_period_sticks() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let camera = MockCameraInterface::new_repeating(offset_spot());
    let mut tracker =
        FineTracker::new(camera, MockFsm::new(), &test_config(temp_dir.path())).unwrap();

    let mut display = ScriptedDisplay::key_at(1, Key::Char('t'));
    tracker.run_with_display(4, &mut display).unwrap();

    let flags: Vec<bool> = tracker
        .telemetry()
        .records()
        .iter()
        .map(|r| r.tracking_enabled)
        .collect();
    assert_eq!(flags, vec![true, true, false, false]);
    assert_relative_eq!(tracker.state().mirror_position.0, -0.5, epsilon = 1e-12);
}
