//! Acquisition region geometry and the sensor's increment constraints.
//!
//! Sensors do not accept arbitrary regions: the top-left corner and the size
//! must each be multiples of a hardware-reported increment. Requested regions
//! are snapped down to those increments, so the effective region is never
//! larger than what was asked for.

use super::{CameraError, CameraResult};
use crate::image_size::PixelShape;
use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position and size increments a sensor accepts for its readout region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionIncrements {
    /// Horizontal position step
    pub position_x: usize,
    /// Vertical position step
    pub position_y: usize,
    /// Width step
    pub width: usize,
    /// Height step
    pub height: usize,
}

impl RegionIncrements {
    pub fn new(position_x: usize, position_y: usize, width: usize, height: usize) -> Self {
        Self {
            position_x,
            position_y,
            width,
            height,
        }
    }

    /// Same step for position and size on both axes
    pub fn uniform(step: usize) -> Self {
        Self::new(step, step, step, step)
    }
}

impl Default for RegionIncrements {
    fn default() -> Self {
        Self::uniform(1)
    }
}

/// Rectangular readout region: top-left corner plus size, in sensor pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionGeometry {
    /// Left edge (column of the first pixel)
    pub x: usize,
    /// Top edge (row of the first pixel)
    pub y: usize,
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
}

/// Remove the remainder of `value` against `step`; a zero step leaves it alone.
fn snap_down(value: usize, step: usize) -> usize {
    if step == 0 {
        value
    } else {
        value - value % step
    }
}

impl RegionGeometry {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering an entire sensor
    pub fn full_frame(sensor: PixelShape) -> Self {
        Self::new(0, 0, sensor.width, sensor.height)
    }

    /// Build a region from its center and size.
    ///
    /// The top-left corner is `center - size / 2` (integer division). Fails if
    /// that corner would fall off the top or left of the sensor.
    pub fn from_center(center: (i64, i64), size: PixelShape) -> CameraResult<Self> {
        let left = center.0 - (size.width / 2) as i64;
        let top = center.1 - (size.height / 2) as i64;
        if left < 0 || top < 0 {
            return Err(CameraError::InvalidRegion(format!(
                "region of {size} centred at ({}, {}) starts at negative position ({left}, {top})",
                center.0, center.1
            )));
        }
        Ok(Self::new(left as usize, top as usize, size.width, size.height))
    }

    pub fn size(&self) -> PixelShape {
        PixelShape::new(self.width, self.height)
    }

    /// Center of the region in its own (region-local) coordinates
    pub fn local_center(&self) -> (f64, f64) {
        ((self.width / 2) as f64, (self.height / 2) as f64)
    }

    /// Snap position and size down to the given increments.
    pub fn snapped(&self, increments: RegionIncrements) -> Self {
        Self {
            x: snap_down(self.x, increments.position_x),
            y: snap_down(self.y, increments.position_y),
            width: snap_down(self.width, increments.width),
            height: snap_down(self.height, increments.height),
        }
    }

    /// Whether this region already satisfies the increments
    pub fn is_aligned(&self, increments: RegionIncrements) -> bool {
        self.snapped(increments) == *self
    }

    /// Validate that the region is non-empty and fits within the sensor
    pub fn validate_for_sensor(&self, sensor: PixelShape) -> CameraResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidRegion(format!(
                "region {self} has zero dimensions"
            )));
        }

        let past_edge = |start: usize, len: usize, limit: usize| {
            start.checked_add(len).map_or(true, |end| end > limit)
        };
        if past_edge(self.x, self.width, sensor.width)
            || past_edge(self.y, self.height, sensor.height)
        {
            return Err(CameraError::InvalidRegion(format!(
                "region {self} extends beyond sensor bounds ({sensor})"
            )));
        }

        Ok(())
    }

    /// Extract this region from a full-sensor frame
    pub fn extract_from_frame(&self, frame: &ArrayView2<u16>) -> Array2<u16> {
        frame
            .slice(s![
                self.y..self.y + self.height,
                self.x..self.x + self.width
            ])
            .to_owned()
    }
}

impl fmt::Display for RegionGeometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}
