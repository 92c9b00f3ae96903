//! Beam drift patterns for closed-loop testing
//!
//! Each profile gives the offset, in sensor pixels, of the uncorrected spot
//! from its rest position as a function of simulated time. The simulated bench
//! adds this to the spot position before the mirror correction is applied.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Uniform};
use std::f64::consts::PI;
use std::time::Duration;

/// Trait for beam drift functions
pub trait DriftMotion: Send + Sync {
    /// Spot offset `(dx, dy)` in pixels at time `t`
    fn offset(&self, t: Duration) -> (f64, f64);

    /// Get motion description
    fn description(&self) -> &str;
}

/// No drift
pub struct StaticDrift;

impl DriftMotion for StaticDrift {
    fn offset(&self, _t: Duration) -> (f64, f64) {
        (0.0, 0.0)
    }

    fn description(&self) -> &str {
        "Static (no drift)"
    }
}

/// Sinusoidal drift along one axis
pub struct SinusoidalDrift {
    /// Unit direction of the oscillation
    direction: (f64, f64),
    /// Amplitude in pixels
    amplitude_px: f64,
    /// Period in seconds
    period_sec: f64,
    description: &'static str,
}

impl SinusoidalDrift {
    pub fn along_x(amplitude_px: f64, period_sec: f64) -> Self {
        Self {
            direction: (1.0, 0.0),
            amplitude_px,
            period_sec,
            description: "Sinusoidal drift in X",
        }
    }

    pub fn along_y(amplitude_px: f64, period_sec: f64) -> Self {
        Self {
            direction: (0.0, 1.0),
            amplitude_px,
            period_sec,
            description: "Sinusoidal drift in Y",
        }
    }
}

impl DriftMotion for SinusoidalDrift {
    fn offset(&self, t: Duration) -> (f64, f64) {
        let phase = 2.0 * PI * t.as_secs_f64() / self.period_sec;
        let d = self.amplitude_px * phase.sin();
        (d * self.direction.0, d * self.direction.1)
    }

    fn description(&self) -> &str {
        self.description
    }
}

/// Constant-rate drift, e.g. thermal walk of the source
pub struct LinearDrift {
    /// Pixels per second on each axis
    rate_px_per_sec: (f64, f64),
}

impl LinearDrift {
    pub fn new(rate_x: f64, rate_y: f64) -> Self {
        Self {
            rate_px_per_sec: (rate_x, rate_y),
        }
    }
}

impl DriftMotion for LinearDrift {
    fn offset(&self, t: Duration) -> (f64, f64) {
        let s = t.as_secs_f64();
        (self.rate_px_per_sec.0 * s, self.rate_px_per_sec.1 * s)
    }

    fn description(&self) -> &str {
        "Linear drift"
    }
}

/// Circular drift pattern
pub struct CircularDrift {
    /// Radius in pixels
    radius_px: f64,
    /// Period in seconds
    period_sec: f64,
}

impl CircularDrift {
    pub fn new(radius_px: f64, period_sec: f64) -> Self {
        Self {
            radius_px,
            period_sec,
        }
    }
}

impl DriftMotion for CircularDrift {
    fn offset(&self, t: Duration) -> (f64, f64) {
        let phase = 2.0 * PI * t.as_secs_f64() / self.period_sec;
        (self.radius_px * phase.cos(), self.radius_px * phase.sin())
    }

    fn description(&self) -> &str {
        "Circular drift"
    }
}

/// Smoothed random walk, linearly interpolated between control points
pub struct RandomWalkDrift {
    /// Control points `(dx, dy)` spaced `interval_sec` apart
    points: Vec<(f64, f64)>,
    interval_sec: f64,
}

impl RandomWalkDrift {
    pub fn new(max_deviation_px: f64, num_control_points: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let step = Uniform::new_inclusive(-1.0, 1.0);

        let mut points = Vec::with_capacity(num_control_points.max(1));
        let mut current = (0.0, 0.0);
        points.push(current);

        // Random step with momentum, clamped to the deviation limit
        for _ in 1..num_control_points {
            let sx = step.sample(&mut rng) * max_deviation_px * 0.3;
            let sy = step.sample(&mut rng) * max_deviation_px * 0.3;
            current = (
                (current.0 * 0.7 + sx).clamp(-max_deviation_px, max_deviation_px),
                (current.1 * 0.7 + sy).clamp(-max_deviation_px, max_deviation_px),
            );
            points.push(current);
        }

        Self {
            points,
            interval_sec: 2.0,
        }
    }
}

impl DriftMotion for RandomWalkDrift {
    fn offset(&self, t: Duration) -> (f64, f64) {
        let last = self.points.len() - 1;
        let pos = t.as_secs_f64() / self.interval_sec;
        let i = (pos.floor() as usize).min(last);
        if i == last {
            return self.points[last];
        }
        let frac = pos - i as f64;
        let (a, b) = (self.points[i], self.points[i + 1]);
        (a.0 + (b.0 - a.0) * frac, a.1 + (b.1 - a.1) * frac)
    }

    fn description(&self) -> &str {
        "Random walk drift"
    }
}

/// Collection of standard drift profiles at a common scale
pub struct DriftProfiles {
    /// Typical excursion in pixels
    pub amplitude_px: f64,
    /// Typical period in seconds
    pub period_sec: f64,
}

impl Default for DriftProfiles {
    fn default() -> Self {
        Self {
            amplitude_px: 3.0,
            period_sec: 20.0,
        }
    }
}

impl DriftProfiles {
    pub fn new(amplitude_px: f64, period_sec: f64) -> Self {
        Self {
            amplitude_px,
            period_sec,
        }
    }

    /// Names accepted by [`DriftProfiles::get`]
    pub const NAMES: [&'static str; 6] =
        ["static", "sine_x", "sine_y", "linear", "circular", "random"];

    /// Get all standard drift profiles
    pub fn all(&self) -> Vec<Box<dyn DriftMotion>> {
        Self::NAMES
            .iter()
            .filter_map(|name| self.get(name))
            .collect()
    }

    /// Get a drift profile by name
    pub fn get(&self, name: &str) -> Option<Box<dyn DriftMotion>> {
        let a = self.amplitude_px;
        let p = self.period_sec;
        match name.to_lowercase().as_str() {
            "static" => Some(Box::new(StaticDrift)),
            "sine_x" => Some(Box::new(SinusoidalDrift::along_x(a, p))),
            "sine_y" => Some(Box::new(SinusoidalDrift::along_y(a, p))),
            "linear" => Some(Box::new(LinearDrift::new(a / p, -a / p))),
            "circular" => Some(Box::new(CircularDrift::new(a, p))),
            "random" => Some(Box::new(RandomWalkDrift::new(a, 20, 42))),
            _ => None,
        }
    }
}
