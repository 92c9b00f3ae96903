//! Fast steering mirror abstraction.
//!
//! Mirror positions are unitless commands in `[-1, 1]` per axis as accepted by
//! the drive electronics; the tracker additionally confines them to a smaller
//! configured travel limit. Hardware handles are owned by the implementation
//! and released on drop.

pub mod mock;

use thiserror::Error;

/// Error type for steering mirror operations
#[derive(Debug, Error)]
pub enum FsmError {
    /// Link to the mirror controller could not be opened or was lost
    #[error("FSM connection error: {0}")]
    Connection(String),
    /// Controller rejected or failed to execute a move
    #[error("FSM move failed: {0}")]
    Move(String),
    /// Position readback failed
    #[error("FSM get_position failed: {0}")]
    Readback(String),
}

/// Result type for steering mirror operations
pub type FsmResult<T> = Result<T, FsmError>;

/// Two-axis tip/tilt mirror
pub trait FsmInterface: Send {
    /// Command both axes to an absolute position.
    fn move_to(&mut self, x: f64, y: f64) -> FsmResult<()>;

    /// Last position the controller reports for both axes
    fn get_position(&mut self) -> FsmResult<(f64, f64)>;
}

impl FsmInterface for Box<dyn FsmInterface> {
    fn move_to(&mut self, x: f64, y: f64) -> FsmResult<()> {
        (**self).move_to(x, y)
    }

    fn get_position(&mut self) -> FsmResult<(f64, f64)> {
        (**self).get_position()
    }
}
