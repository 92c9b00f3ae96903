//! Image processing for locating the tracked laser spot.

pub mod spot;

pub use spot::{
    SpotEstimate, SpotFinderParams, SpotLocator, SpotRejection, ABSOLUTE_NOISE_FLOOR,
    DEFAULT_MIN_PEAK_PIXELS,
};
