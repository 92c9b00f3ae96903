//! Single-axis PID controller producing bounded incremental mirror commands.
//!
//! The output of each update is a *delta* to be added to the accumulated
//! mirror position, not an absolute position. Only the delta is clamped.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

impl PidGains {
    pub fn new(p: f64, i: f64, d: f64) -> Self {
        Self { p, i, d }
    }

    pub fn is_zero(&self) -> bool {
        self.p == 0.0 && self.i == 0.0 && self.d == 0.0
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(0.1, 0.0, 0.0)
    }
}

/// Gains plus output bounds and timing model for one controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    pub gains: PidGains,
    /// Lower output bound
    pub min: f64,
    /// Upper output bound
    pub max: f64,
    /// Treat every update as one unit step instead of measuring elapsed time
    pub fixed_interval: bool,
}

impl PidParams {
    /// Symmetric bounds `[-limit, limit]` with a fixed step interval
    pub fn symmetric(gains: PidGains, limit: f64) -> Self {
        Self {
            gains,
            min: -limit,
            max: limit,
            fixed_interval: true,
        }
    }
}

/// Single-axis PID controller
#[derive(Debug, Clone)]
pub struct AxisController {
    params: PidParams,
    integral: f64,
    last_error: f64,
    last_update: Option<Instant>,
}

impl AxisController {
    pub fn new(params: PidParams) -> Self {
        Self {
            params,
            integral: 0.0,
            last_error: 0.0,
            last_update: None,
        }
    }

    pub fn params(&self) -> &PidParams {
        &self.params
    }

    /// Replace gains and bounds, keeping the integral and last error
    pub fn set_params(&mut self, params: PidParams) {
        self.params = params;
    }

    /// Clear integral, last error and interval timing
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_update = None;
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Compute the next clamped delta for `error`.
    ///
    /// With a fixed interval every call counts as one step. Otherwise the
    /// time since the previous call is used, and the first call after a reset
    /// counts as one step.
    pub fn update(&mut self, error: f64) -> f64 {
        let now = Instant::now();
        let dt = if self.params.fixed_interval {
            None
        } else {
            self.last_update.map(|t| now.duration_since(t))
        };
        self.last_update = Some(now);
        self.update_with_interval(error, dt)
    }

    /// Compute the next clamped delta with an explicit interval.
    ///
    /// `None`, or any interval while `fixed_interval` is set, counts as one
    /// unit step. A zero interval is also treated as one step.
    pub fn update_with_interval(&mut self, error: f64, interval: Option<Duration>) -> f64 {
        let dt = match interval {
            Some(d) if !self.params.fixed_interval && !d.is_zero() => d.as_secs_f64(),
            _ => 1.0,
        };

        self.integral += error * dt;
        let derivative = (error - self.last_error) / dt;
        self.last_error = error;

        let gains = &self.params.gains;
        let output = gains.p * error + gains.i * self.integral + gains.d * derivative;
        output.clamp(self.params.min, self.params.max)
    }
}
