//! Per-step telemetry, kept in memory and written once when the loop ends.

use crate::error::TrackerError;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Column header of the telemetry report
pub const HEADER: &str = "Step, Spot X, Spot Y, Error X, Error Y, Mirror X, Mirror Y, \
Tracker On?, Spot Found?, AOI on?, t_Camera, t_Mirror, t_Loop";

/// Value written for spot and error columns when no spot was found
const NOT_FOUND: f64 = -1.0;

/// One control step
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: u64,
    /// Spot position in the coordinates of the readout it was found in
    pub spot: Option<(f64, f64)>,
    /// Spot minus setpoint
    pub error: Option<(f64, f64)>,
    /// Accumulated mirror command after the step
    pub mirror: (f64, f64),
    pub tracking_enabled: bool,
    pub roi_active: bool,
    pub t_camera: Duration,
    /// Zero when the mirror was not commanded
    pub t_mirror: Duration,
    pub t_loop: Duration,
}

impl StepRecord {
    pub fn spot_found(&self) -> bool {
        self.spot.is_some()
    }

    fn write_row<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let (sx, sy) = self.spot.unwrap_or((NOT_FOUND, NOT_FOUND));
        let (ex, ey) = self.error.unwrap_or((NOT_FOUND, NOT_FOUND));
        writeln!(
            out,
            "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            self.step,
            sx,
            sy,
            ex,
            ey,
            self.mirror.0,
            self.mirror.1,
            u8::from(self.tracking_enabled),
            u8::from(self.spot_found()),
            u8::from(self.roi_active),
            self.t_camera.as_micros(),
            self.t_mirror.as_micros(),
            self.t_loop.as_micros(),
        )
    }
}

/// Ordered step records
#[derive(Debug, Default)]
pub struct TelemetryLog {
    records: Vec<StepRecord>,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the header and every record, in step order
    pub fn flush<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "{HEADER}")?;
        for record in &self.records {
            record.write_row(&mut out)?;
        }
        out.flush()
    }

    /// Write the report to `path`, replacing any existing file
    pub fn flush_to_path(&self, path: impl AsRef<Path>) -> Result<(), TrackerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(TrackerError::Telemetry)?;
            }
        }
        let file = File::create(path).map_err(TrackerError::Telemetry)?;
        self.flush(BufWriter::new(file))
            .map_err(TrackerError::Telemetry)?;
        log::info!(
            "Wrote {} telemetry records to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(step: u64, found: bool) -> StepRecord {
        StepRecord {
            step,
            spot: found.then_some((10.5, 20.25)),
            error: found.then_some((0.5, -1.75)),
            mirror: (0.01, -0.02),
            tracking_enabled: true,
            roi_active: false,
            t_camera: Duration::from_micros(1500),
            t_mirror: Duration::ZERO,
            t_loop: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_row_format() {
        let mut out = Vec::new();
        record(7, true).write_row(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "7, 10.5, 20.25, 0.5, -1.75, 0.01, -0.02, 1, 1, 0, 1500, 0, 3000\n"
        );
    }

    #[test]
    fn test_not_found_writes_sentinels() {
        let mut out = Vec::new();
        record(0, false).write_row(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("0, -1, -1, -1, -1, "));
        assert!(line.contains(", 1, 0, 0, "));
    }

    #[test]
    fn test_flush_header_plus_rows_in_order() {
        let mut log = TelemetryLog::new();
        for step in 0..5 {
            log.append(record(step, step % 2 == 0));
        }

        let mut out = Vec::new();
        log.flush(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], HEADER);
        for (i, line) in lines[1..].iter().enumerate() {
            assert!(line.starts_with(&format!("{i}, ")));
        }
    }

    #[test]
    fn test_empty_log_is_header_only() {
        let mut out = Vec::new();
        TelemetryLog::new().flush(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), format!("{HEADER}\n"));
    }

    #[test]
    fn test_flush_to_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/tracker_data.csv");

        let mut log = TelemetryLog::new();
        log.append(record(0, true));
        log.append(record(1, false));
        log.flush_to_path(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
