use super::{
    CameraError, CameraInterface, CameraResult, ExposureSettings, RegionGeometry,
    RegionIncrements,
};
use crate::image_size::PixelShape;
use ndarray::Array2;

/// Camera backed by a fixed list of full-sensor frames.
///
/// A single frame is repeated forever; a longer list is played back once and
/// then capture fails with "No more frames". The active region is cut out of
/// each frame on capture.
pub struct MockCameraInterface {
    frames: Vec<Array2<u16>>,
    frame_index: usize,
    sensor: PixelShape,
    region: RegionGeometry,
    increments: RegionIncrements,
    bit_depth: u8,
    ready: bool,
    failures_pending: usize,
    exposure_failures_pending: usize,
    frame_count: u64,
    region_log: Vec<RegionGeometry>,
    exposure_log: Vec<ExposureSettings>,
}

impl MockCameraInterface {
    pub fn new(frames: Vec<Array2<u16>>) -> Self {
        let sensor = frames
            .first()
            .map(|f| PixelShape::of_frame(&f.view()))
            .unwrap_or_default();
        Self {
            frames,
            frame_index: 0,
            sensor,
            region: RegionGeometry::full_frame(sensor),
            increments: RegionIncrements::default(),
            bit_depth: 16,
            ready: true,
            failures_pending: 0,
            exposure_failures_pending: 0,
            frame_count: 0,
            region_log: Vec::new(),
            exposure_log: Vec::new(),
        }
    }

    pub fn new_repeating(frame: Array2<u16>) -> Self {
        Self::new(vec![frame])
    }

    pub fn with_increments(mut self, increments: RegionIncrements) -> Self {
        self.increments = increments;
        self
    }

    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Make the next `count` captures fail without consuming frames
    pub fn fail_next_captures(&mut self, count: usize) {
        self.failures_pending = count;
    }

    /// Make the next `count` exposure changes fail; the region is unaffected
    pub fn fail_next_exposures(&mut self, count: usize) {
        self.exposure_failures_pending = count;
    }

    /// Every region passed to `set_active_region`, in order
    pub fn region_log(&self) -> &[RegionGeometry] {
        &self.region_log
    }

    /// Every exposure passed to `set_exposure`, in order
    pub fn exposure_log(&self) -> &[ExposureSettings] {
        &self.exposure_log
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn next_frame(&mut self) -> CameraResult<&Array2<u16>> {
        let frame_idx = if self.frames.len() == 1 {
            0
        } else {
            if self.frame_index >= self.frames.len() {
                return Err(CameraError::CaptureError("No more frames".to_string()));
            }
            let current = self.frame_index;
            self.frame_index += 1;
            current
        };
        Ok(&self.frames[frame_idx])
    }
}

impl CameraInterface for MockCameraInterface {
    fn capture_frame(&mut self) -> CameraResult<Array2<u16>> {
        if !self.ready {
            return Err(CameraError::NotReady);
        }
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(CameraError::CaptureError(
                "Injected capture failure".to_string(),
            ));
        }

        let region = self.region;
        let full = region == RegionGeometry::full_frame(self.sensor);
        let frame = self.next_frame()?;
        let output = if full {
            frame.clone()
        } else {
            region.extract_from_frame(&frame.view())
        };
        self.frame_count += 1;
        Ok(output)
    }

    fn set_active_region(&mut self, region: RegionGeometry) -> CameraResult<()> {
        region.validate_for_sensor(self.sensor)?;
        if !region.is_aligned(self.increments) {
            return Err(CameraError::InvalidRegion(format!(
                "region {region} is not aligned to the sensor increments"
            )));
        }
        self.region_log.push(region);
        self.region = region;
        Ok(())
    }

    fn active_region(&self) -> RegionGeometry {
        self.region
    }

    fn sensor_region(&self) -> RegionGeometry {
        RegionGeometry::full_frame(self.sensor)
    }

    fn region_increments(&self) -> RegionIncrements {
        self.increments
    }

    fn set_exposure(&mut self, exposure: ExposureSettings) -> CameraResult<f64> {
        if self.exposure_failures_pending > 0 {
            self.exposure_failures_pending -= 1;
            return Err(CameraError::HardwareError(
                "Injected exposure failure".to_string(),
            ));
        }
        self.exposure_log.push(exposure);
        Ok(exposure.frame_rate_hz)
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn name(&self) -> &str {
        "MockCamera"
    }

    fn bit_depth(&self) -> u8 {
        self.bit_depth
    }
}
