//! Adaptive torque response ("torque tilt").
//!
//! Predicts the acceleration the filtered motor current should produce,
//! compares it with the measured acceleration, and tilts the setpoint into
//! the gap — nose up into hills and heavy terrain, nose level again when
//! the load clears. The tricky part is the step-size selection: react fast
//! to real load changes without oscillating on noisy low-speed data. That
//! policy lives in [`select_step`], a decision table keyed on travel
//! direction, which side of the target the interpolant sits on, gap size,
//! braking, static-climb and cutback conditions.

use crate::filter::{Biquad, BiquadKind};
use crate::inputs::Inputs;
use crate::tuning::Tuning;
use crate::util::sign;

/// Values fed back from the previous PID tick; the step table reads them to
/// detect "the rider is already correcting" situations.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopFeedback {
    pub proportional: f64,
    pub pid_value: f64,
}

// ─── Step selection ─────────────────────────────────────────────────

/// Which base ramp rate the interpolant uses this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    /// Slow release rate (`torquetilt_off_speed`).
    Relax,
    /// Full engage rate (`torquetilt_on_speed`).
    Engage,
    /// Half engage rate.
    EngageHalf,
    /// Third engage rate.
    EngageThird,
}

/// Outcome of the step decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepChoice {
    pub class: StepClass,
    /// Static climb boosts the chosen rate by 1.5×.
    pub boost: bool,
    /// Telemetry tag identifying the decision branch.
    pub case: i8,
}

impl StepChoice {
    const fn new(class: StepClass, case: i8) -> Self {
        Self {
            class,
            boost: false,
            case,
        }
    }

    /// Resolve to degrees per tick.
    pub fn value(&self, tuning: &Tuning) -> f64 {
        let base = match self.class {
            StepClass::Relax => tuning.torquetilt_off_step,
            StepClass::Engage => tuning.torquetilt_on_step,
            StepClass::EngageHalf => tuning.torquetilt_on_step / 2.0,
            StepClass::EngageThird => tuning.torquetilt_on_step / 3.0,
        };
        if self.boost {
            base * 1.5
        } else {
            base
        }
    }
}

/// Inputs to the step decision table, flattened for testability.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub erpm: f64,
    pub abs_erpm: f64,
    pub interpolated: f64,
    pub target: f64,
    pub accel_gap: f64,
    pub accel_gap_aggregate: f64,
    pub braking: bool,
    pub static_climb: bool,
    pub cutback_response: bool,
    pub pitch: f64,
    pub setpoint: f64,
    pub pid_value: f64,
}

/// The step-size decision table.
///
/// Ground rule: downward motion (toward zero tilt) takes the slow `Relax`
/// rate unless a "reversing course" predicate shows the terrain genuinely
/// flipped — that asymmetry is what keeps the board from oscillating.
pub fn select_step(ctx: &StepContext) -> StepChoice {
    use StepClass::*;

    if ctx.abs_erpm < 500.0 && ctx.accel_gap.abs() < 2.0 {
        // Low-speed acceleration data is junk; go easy.
        return StepChoice::new(Relax, 0);
    }
    if ctx.cutback_response {
        // Cutbacks trump everything; always react quickly.
        return if !ctx.braking {
            StepChoice::new(EngageHalf, 28)
        } else {
            StepChoice::new(Engage, 18)
        };
    }

    if ctx.erpm > 0.0 {
        if ctx.interpolated < 0.0 {
            // Forward travel, tail-down tilt: downhill.
            if ctx.interpolated < ctx.target {
                if ctx.accel_gap > 1.0 && ctx.accel_gap_aggregate > 20.0 {
                    // Reversing course.
                    StepChoice::new(Engage, 17)
                } else if ctx.pitch < ctx.setpoint && ctx.pid_value > 0.0 && ctx.accel_gap > 0.5 {
                    // Reversing course.
                    StepChoice::new(Engage, 11)
                } else {
                    StepChoice::new(Relax, 21)
                }
            } else if ctx.accel_gap.abs() < 0.5 {
                StepChoice::new(Relax, 23)
            } else if ctx.braking {
                StepChoice::new(EngageHalf, 1)
            } else {
                StepChoice::new(Engage, 2)
            }
        } else {
            // Forward travel, nose-up tilt: uphill or heavy resistance.
            if ctx.target > -3.0 && ctx.interpolated > ctx.target {
                if ctx.abs_erpm < 1000.0 && ctx.pitch < 0.5 {
                    // Rider is already pushing the other way; obstacle cleared?
                    StepChoice::new(Relax, 29)
                } else if ctx.abs_erpm < 2000.0 && (ctx.interpolated - ctx.target) > 2.0 {
                    // Slow after braking with lots of remaining tilt.
                    StepChoice::new(EngageThird, 4)
                } else if ctx.abs_erpm > 2000.0 && ctx.target < 0.0 {
                    StepChoice::new(EngageHalf, 19)
                } else {
                    StepChoice::new(Relax, 22)
                }
            } else {
                let mut choice = if ctx.accel_gap.abs() < 0.5 {
                    StepChoice::new(Relax, 27)
                } else if ctx.abs_erpm < 1000.0 {
                    StepChoice::new(EngageHalf, 5)
                } else {
                    StepChoice::new(Engage, 6)
                };
                if ctx.static_climb {
                    choice.boost = true;
                    choice.case = 31;
                }
                choice
            }
        }
    } else if ctx.interpolated > 0.0 {
        // Reverse travel, nose-up tilt: downhill.
        if ctx.interpolated > ctx.target && ctx.target > -3.0 {
            if ctx.pitch > ctx.setpoint && ctx.pid_value < 0.0 && ctx.accel_gap < 0.0 {
                // Reversing course.
                StepChoice::new(Engage, 12)
            } else {
                StepChoice::new(Relax, 24)
            }
        } else if ctx.braking {
            StepChoice::new(EngageHalf, 13)
        } else {
            StepChoice::new(Engage, 14)
        }
    } else {
        // Reverse travel, tail-down tilt: uphill in reverse.
        if ctx.target < 3.0 && ctx.interpolated < ctx.target {
            if ctx.abs_erpm < 1000.0 && ctx.pitch > -0.5 {
                StepChoice::new(Relax, 8)
            } else {
                StepChoice::new(Relax, 25)
            }
        } else {
            let mut choice = if ctx.accel_gap == 0.0 {
                StepChoice::new(Relax, 26)
            } else if ctx.abs_erpm < 1000.0 {
                StepChoice::new(EngageHalf, 9)
            } else {
                StepChoice::new(Engage, 10)
            };
            if ctx.static_climb {
                choice.boost = true;
                choice.case = 32;
            }
            choice
        }
    }
}

// ─── The shaper ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TorqueTilt {
    current_filter: Biquad,
    /// Low-passed motor current [A].
    pub filtered_current: f64,
    /// EMA of expected-minus-measured acceleration.
    pub accel_gap: f64,
    accel_gap_aggregate: f64,
    /// EMA'd raw tilt target [deg].
    pub target: f64,
    /// Ramped tilt actually applied [deg].
    pub interpolated: f64,
    case: i8,
}

impl TorqueTilt {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            current_filter: Biquad::new(BiquadKind::Lowpass, tuning.torquetilt_filter_fc),
            filtered_current: 0.0,
            accel_gap: 0.0,
            accel_gap_aggregate: 0.0,
            target: 0.0,
            interpolated: 0.0,
            case: -1,
        }
    }

    pub fn reset(&mut self) {
        self.current_filter.reset();
        self.filtered_current = 0.0;
        self.accel_gap = 0.0;
        self.accel_gap_aggregate = 0.0;
        self.target = 0.0;
        self.interpolated = 0.0;
        self.case = -1;
    }

    /// Telemetry tag of the last step decision.
    #[inline]
    pub fn response_case(&self) -> i8 {
        self.case
    }

    #[inline]
    pub fn accel_gap_aggregate(&self) -> f64 {
        self.accel_gap_aggregate
    }

    /// Run one tick. `setpoint_so_far` is the setpoint built up before this
    /// shaper (base + nose bias); the offset returned adds on top of it.
    pub fn apply(
        &mut self,
        inputs: &Inputs,
        tuning: &Tuning,
        setpoint_so_far: f64,
        feedback: &LoopFeedback,
        cutback: bool,
    ) -> f64 {
        if tuning.cfg.torquetilt_strength == 0.0 {
            return 0.0;
        }
        self.case = 0;

        self.filtered_current = self.current_filter.process(inputs.motor_current);
        let torque_sign = sign(self.filtered_current);
        let abs_torque = self.filtered_current.abs();
        let torque_offset = tuning.cfg.torquetilt_start_current;
        let strength = tuning.tt_strength_uphill;

        // Negative current against travel direction: braking or downhill.
        let braking = inputs.abs_erpm > 250.0 && torque_sign != sign(inputs.erpm);

        // Extreme spikes are clipped; only the upper bound applies.
        let measured_acc = inputs.acceleration.min(5.0);

        // Expected acceleration is proportional to current minus the
        // balance-holding offset; above 25 A the torque curve flattens and
        // a second, softer factor takes over.
        let expected_acc = if abs_torque < 25.0 {
            (self.filtered_current - sign(inputs.erpm) * torque_offset) / tuning.accel_factor
        } else {
            (torque_sign * 25.0 - sign(inputs.erpm) * torque_offset) / tuning.accel_factor
                + torque_sign * (abs_torque - 25.0) / tuning.accel_factor2
        };

        let acc_diff = expected_acc - measured_acc;
        let mut static_climb = false;
        if inputs.abs_erpm > 2000.0 {
            self.accel_gap = 0.9 * self.accel_gap + 0.1 * acc_diff;
        } else if inputs.abs_erpm > 1000.0 {
            self.accel_gap = 0.95 * self.accel_gap + 0.05 * acc_diff;
        } else if inputs.abs_erpm > 250.0 {
            self.accel_gap = 0.98 * self.accel_gap + 0.02 * acc_diff;
        } else if expected_acc.abs() < 1.0 {
            // Low-speed erpm data is far too choppy to act on unless we are
            // actually trying to accelerate.
            self.accel_gap = 0.0;
        } else if expected_acc.abs() < 1.5 {
            if self.accel_gap.abs() > 1.0 {
                self.accel_gap = 0.9 * self.accel_gap + 0.1 * acc_diff;
                static_climb = true;
            } else {
                self.accel_gap = 0.99 * self.accel_gap + 0.01 * acc_diff;
            }
        } else if self.accel_gap.abs() > 1.0 {
            self.accel_gap = 0.9 * self.accel_gap + 0.1 * acc_diff;
            static_climb = true;
        } else {
            self.accel_gap = 0.95 * self.accel_gap + 0.05 * acc_diff;
        }

        if sign(self.accel_gap_aggregate) == sign(self.accel_gap) {
            self.accel_gap_aggregate += self.accel_gap;
        } else {
            self.accel_gap_aggregate = 0.0;
        }

        let mut new_ttt = strength * self.accel_gap;
        let mut cutback_response = false;

        if cutback && inputs.abs_erpm > tuning.cutback_minspeed {
            if sign(new_ttt) == sign(inputs.erpm) {
                new_ttt /= 4.0;
            } else {
                new_ttt *= 1.5;
            }
            cutback_response = true;
        } else if braking && inputs.abs_erpm > 1000.0 {
            // Negative current alone is not active braking; the rider must
            // be leaning against travel too.
            if sign(feedback.proportional) != sign(inputs.erpm) {
                let mut downhill_damper = 1.0;
                if (inputs.erpm > 1000.0 && self.accel_gap < -1.0)
                    || (inputs.erpm < -1000.0 && self.accel_gap > 1.0)
                {
                    // Braking downhill should not lift the nose as much.
                    downhill_damper += self.accel_gap.abs() / 2.0;
                }
                new_ttt += (inputs.pitch - setpoint_so_far) / tuning.ttt_brake_ratio
                    / downhill_damper;
            }
        }

        self.target = self.target * 0.95 + 0.05 * new_ttt;
        self.target = self
            .target
            .clamp(-tuning.cfg.torquetilt_angle_limit, tuning.cfg.torquetilt_angle_limit);

        let choice = select_step(&StepContext {
            erpm: inputs.erpm,
            abs_erpm: inputs.abs_erpm,
            interpolated: self.interpolated,
            target: self.target,
            accel_gap: self.accel_gap,
            accel_gap_aggregate: self.accel_gap_aggregate,
            braking,
            static_climb,
            cutback_response,
            pitch: inputs.pitch,
            setpoint: setpoint_so_far,
            pid_value: feedback.pid_value,
        });
        self.case = choice.case;
        let step = choice.value(tuning);

        if (self.target - self.interpolated).abs() < step {
            self.interpolated = self.target;
        } else if self.target > self.interpolated {
            self.interpolated += step;
        } else {
            self.interpolated -= step;
        }
        self.interpolated
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
