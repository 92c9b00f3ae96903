use shared::camera_interface::{CameraError, RegionGeometry};
use thiserror::Error;

/// Errors that stop the tracker from starting, or from saving its results.
///
/// Failures during a running step are never reported through this type; they
/// are logged and the loop carries on.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// The camera reported it is not ready to capture.
    #[error("camera '{0}' is not ready")]
    CameraNotReady(String),

    /// A region does not fit on the sensor.
    #[error("region outside sensor bounds: {0}")]
    RegionOutOfBounds(CameraError),

    /// A region equal to the whole sensor cannot be told apart from full frame.
    #[error("region {0} covers the whole sensor")]
    RegionCoversSensor(RegionGeometry),

    /// Camera refused an initial setting.
    #[error("camera setup failed: {0}")]
    CameraSetup(#[from] CameraError),

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or written.
    #[error("config file {path}: {source}")]
    ConfigIo {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for the expected layout.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Writing the telemetry report failed.
    #[error("telemetry write failed: {0}")]
    Telemetry(#[source] std::io::Error),
}
