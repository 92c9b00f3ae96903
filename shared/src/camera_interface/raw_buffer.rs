//! Conversion between sensor readout buffers and `u16` frames.
//!
//! Sensors deliver pixels either as one byte per pixel (8-bit modes) or as two
//! little-endian bytes with the sample packed into the most significant bits
//! (10/12/16-bit modes). Everything downstream of the camera sees plain `u16`
//! samples in the sensor's native range.

use super::{CameraError, CameraResult};
use crate::image_size::PixelShape;
use ndarray::Array2;

/// Bytes occupied by each pixel in a raw buffer of the given bit depth
pub fn bytes_per_pixel(bits_per_pixel: u8) -> usize {
    if bits_per_pixel > 8 {
        2
    } else {
        1
    }
}

/// Largest sample value representable at the given bit depth
pub fn max_sample_value(bits_per_pixel: u8) -> u16 {
    if bits_per_pixel >= 16 {
        u16::MAX
    } else {
        (1u16 << bits_per_pixel) - 1
    }
}

fn check_bit_depth(bits_per_pixel: u8) -> CameraResult<()> {
    if bits_per_pixel == 0 || bits_per_pixel > 16 {
        return Err(CameraError::ConfigError(format!(
            "unsupported bit depth {bits_per_pixel}, expected 1-16"
        )));
    }
    Ok(())
}

/// Decode a raw sensor buffer into a `[row, col]` frame.
///
/// # Arguments
/// * `raw` - Readout buffer, row-major, no padding between rows
/// * `shape` - Width and height of the region that was read out
/// * `bits_per_pixel` - Sensor bit depth (1-16)
///
/// # Errors
/// Returns [`CameraError::CaptureError`] if the buffer is shorter than the
/// region requires.
pub fn decode_raw_frame(
    raw: &[u8],
    shape: PixelShape,
    bits_per_pixel: u8,
) -> CameraResult<Array2<u16>> {
    check_bit_depth(bits_per_pixel)?;

    let bpp = bytes_per_pixel(bits_per_pixel);
    let needed = shape.pixel_count() * bpp;
    if raw.len() < needed {
        return Err(CameraError::CaptureError(format!(
            "raw buffer holds {} bytes, {shape} at {bits_per_pixel} bits needs {needed}",
            raw.len()
        )));
    }

    let samples: Vec<u16> = if bpp == 2 {
        let shift = 16 - bits_per_pixel as u32;
        raw[..needed]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) >> shift)
            .collect()
    } else {
        raw[..needed].iter().map(|&b| b as u16).collect()
    };

    Array2::from_shape_vec((shape.height, shape.width), samples)
        .map_err(|e| CameraError::CaptureError(format!("failed to shape raw frame: {e}")))
}

/// Pack a frame into the raw layout [`decode_raw_frame`] expects.
///
/// Samples above the bit depth's range are clipped.
pub fn encode_raw_frame(frame: &Array2<u16>, bits_per_pixel: u8) -> CameraResult<Vec<u8>> {
    check_bit_depth(bits_per_pixel)?;

    let max = max_sample_value(bits_per_pixel);
    let mut raw = Vec::with_capacity(frame.len() * bytes_per_pixel(bits_per_pixel));

    if bits_per_pixel > 8 {
        let shift = 16 - bits_per_pixel as u32;
        for &value in frame.iter() {
            raw.extend_from_slice(&(value.min(max) << shift).to_le_bytes());
        }
    } else {
        raw.extend(frame.iter().map(|&value| value.min(max) as u8));
    }

    Ok(raw)
}
