//! Shared components for the fine beam tracker.
//!
//! This crate holds the hardware-facing abstractions (camera and steering
//! mirror), the region geometry rules the camera imposes, and the image
//! processing used to locate the laser spot. The control logic that ties these
//! together lives in the `finetrack` crate.

pub mod camera_interface;
pub mod frame_writer;
pub mod fsm_interface;
pub mod image_proc;
pub mod image_size;
