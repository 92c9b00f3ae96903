//! Feedback controllers for the steering mirror
//!
//! One PID loop per mirror axis, driven by the spot error in pixels and
//! producing incremental mirror commands.

mod axis_controller;

pub use axis_controller::{AxisController, PidGains, PidParams};

/// Independent X and Y controllers sharing one parameter set
#[derive(Debug, Clone)]
pub struct MirrorController {
    x_controller: AxisController,
    y_controller: AxisController,
}

impl MirrorController {
    pub fn new(params: PidParams) -> Self {
        Self {
            x_controller: AxisController::new(params),
            y_controller: AxisController::new(params),
        }
    }

    /// Compute clamped mirror deltas for a spot error
    pub fn update(&mut self, error: (f64, f64)) -> (f64, f64) {
        (
            self.x_controller.update(error.0),
            self.y_controller.update(error.1),
        )
    }

    /// Swap gains and bounds on both axes without touching their state
    pub fn set_params(&mut self, params: PidParams) {
        self.x_controller.set_params(params);
        self.y_controller.set_params(params);
    }

    pub fn params(&self) -> &PidParams {
        self.x_controller.params()
    }

    pub fn reset(&mut self) {
        self.x_controller.reset();
        self.y_controller.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axes_are_independent() {
        let mut controller =
            MirrorController::new(PidParams::symmetric(PidGains::new(0.1, 0.0, 0.0), 0.25));
        let (dx, dy) = controller.update((1.0, -10.0));
        assert_relative_eq!(dx, 0.1);
        assert_relative_eq!(dy, -0.25);
    }
}
