//! Nose-angle bias: speed-proportional plus constant tilt.
//!
//! The variable part scales with erpm up to a configured ceiling; the
//! constant part switches in wholesale past its own erpm threshold. Both
//! zero out when the torque response is already tilting hard the other way
//! (forward riding into heavy down-tilt and vice versa).

use crate::inputs::Inputs;
use crate::tuning::Tuning;
use crate::util::sign;

#[derive(Debug, Clone, Default)]
pub struct NoseAngler {
    interpolated: f64,
}

impl NoseAngler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.interpolated = 0.0;
    }

    /// Current interpolated bias [deg].
    #[inline]
    pub fn interpolated(&self) -> f64 {
        self.interpolated
    }

    /// Advance toward this tick's bias target and return the offset to add.
    pub fn apply(&mut self, inputs: &Inputs, tuning: &Tuning, torquetilt_interp: f64) -> f64 {
        let cfg = &tuning.cfg;

        let mut target = if inputs.erpm > 0.0 && torquetilt_interp < -1.0 {
            0.0
        } else if inputs.erpm < 0.0 && torquetilt_interp > 1.0 {
            0.0
        } else if inputs.abs_erpm > tuning.tiltback_variable_max_erpm {
            cfg.tiltback_variable_max.abs() * sign(inputs.erpm)
        } else {
            tuning.tiltback_variable * inputs.erpm
        };

        if inputs.erpm > cfg.tiltback_constant_erpm {
            target += cfg.tiltback_constant;
        } else if inputs.erpm < -cfg.tiltback_constant_erpm {
            target -= cfg.tiltback_constant;
        }

        let step = tuning.noseangling_step;
        if (target - self.interpolated).abs() < step {
            self.interpolated = target;
        } else if target > self.interpolated {
            self.interpolated += step;
        } else {
            self.interpolated -= step;
        }
        self.interpolated
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
