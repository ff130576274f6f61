//! Turn tilt: lean the nose into sustained turns.
//!
//! Target scales with the yaw-rate EMA, boosted by speed and by aggregate
//! yaw, capped, direction-aligned with travel, and then pared back whenever
//! the torque response is already commanding a large tilt. The cutback
//! detector spots the board banked into a carve (roll dominating yaw) and
//! flips or cancels the tilt so the rail-to-rail transition stays crisp.
//!
//! Runs only in the plain RUNNING phase; tilt-back phases zero the target.

use crate::inputs::Inputs;
use crate::tuning::Tuning;
use crate::util::sign;

/// What turn tilt did this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnTiltEffect {
    /// Offset added to the setpoint [deg].
    pub offset: f64,
    /// The yaw aggregate in the sampler must be cleared.
    pub clear_yaw_aggregate: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TurnTilt {
    pub target: f64,
    pub interpolated: f64,
    /// Board is banked into the turn; torque response inverts/cancels us.
    pub cutback: bool,
}

impl TurnTilt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.target = 0.0;
        self.interpolated = 0.0;
        self.cutback = false;
    }

    /// Run one tick. `plain_running` is true only in the un-tilted RUNNING
    /// phase; `torquetilt_target` is the ATR raw target (not interpolant).
    pub fn apply(
        &mut self,
        inputs: &Inputs,
        tuning: &Tuning,
        plain_running: bool,
        noseangling_interp: f64,
        torquetilt_target: f64,
    ) -> TurnTiltEffect {
        let cfg = &tuning.cfg;
        let mut effect = TurnTiltEffect::default();

        let abs_yaw_scaled = inputs.abs_yaw_change * 100.0;
        if abs_yaw_scaled < cfg.turntilt_start_angle || !plain_running {
            self.target = 0.0;
        } else {
            if tuning.cutback_enable {
                let banked_turn = sign(inputs.yaw_change) == sign(inputs.roll);
                self.cutback = banked_turn
                    && inputs.roll_aggregate.abs() > tuning.roll_aggregate_threshold
                    && abs_yaw_scaled > 5.0
                    && (inputs.yaw_change * 100.0 / inputs.roll) < 1.0;
            }

            self.target = inputs.abs_yaw_change * cfg.turntilt_strength;

            // Speed scaling: linear up to the boost end, saturated above.
            let boost = if inputs.abs_erpm < cfg.turntilt_erpm_boost_end {
                1.0 + inputs.abs_erpm * tuning.turntilt_boost_per_erpm
            } else {
                1.0 + cfg.turntilt_erpm_boost / 100.0
            };
            self.target *= boost;

            // Aggregate yaw boost: at most doubles, damped at low speed.
            let aggregate_damper = if inputs.abs_erpm < 2000.0 { 0.5 } else { 1.0 };
            let boost = (1.0
                + aggregate_damper * inputs.yaw_aggregate.abs() / tuning.yaw_aggregate_target)
                .min(2.0);
            self.target *= boost;

            self.target = self.target.min(cfg.turntilt_angle_limit);

            if inputs.abs_erpm < cfg.turntilt_start_erpm {
                self.target = 0.0;
            } else {
                self.target *= sign(inputs.erpm);
            }

            // Torque-response interference: a big ATR target squeezes turn
            // tilt out, harder when they disagree on direction.
            let (atr_min, atr_max) = if sign(torquetilt_target) != sign(self.target) {
                (1.0, 4.0)
            } else {
                (2.0, 5.0)
            };
            if torquetilt_target.abs() > atr_min {
                if self.cutback {
                    self.target = -self.target;
                } else {
                    let mut atr_scaling =
                        (atr_max - torquetilt_target.abs()) / (atr_max - atr_min);
                    if atr_scaling < 0.0 {
                        atr_scaling = 0.0;
                        effect.clear_yaw_aggregate = true;
                    }
                    self.target *= atr_scaling;
                }
            } else if self.cutback {
                self.target = 0.0;
            }

            if (inputs.pitch - noseangling_interp).abs() > 4.0 {
                // No setpoint games during heavy acceleration or braking.
                self.target = 0.0;
                effect.clear_yaw_aggregate = true;
            }
        }

        let step = tuning.turntilt_step;
        if (self.target - self.interpolated).abs() < step {
            self.interpolated = self.target;
        } else if self.target > self.interpolated {
            self.interpolated += step;
        } else {
            self.interpolated -= step;
        }
        effect.offset = self.interpolated;
        effect
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MotorConfig;
    use mono_common::config::BalanceConfig;

    fn tuning() -> Tuning {
        let mut cfg = BalanceConfig::default();
        cfg.hertz = 1000.0;
        cfg.turntilt_strength = 4.0;
        cfg.turntilt_angle_limit = 3.0;
        cfg.turntilt_start_angle = 2.0;
        cfg.turntilt_start_erpm = 500.0;
        cfg.turntilt_speed = 3.0;
        cfg.turntilt_erpm_boost = 100.0;
        cfg.turntilt_erpm_boost_end = 5000.0;
        cfg.yaw_ki = 1.5; // aggregate target
        Tuning::derive(cfg, &MotorConfig::default())
    }

    fn turning_inputs() -> Inputs {
        Inputs {
            erpm: 5000.0,
            abs_erpm: 5000.0,
            yaw_change: 0.05,
            abs_yaw_change: 0.05,
            ..Inputs::default()
        }
    }

    fn settle(tt: &mut TurnTilt, inputs: &Inputs, t: &Tuning, atr: f64) -> f64 {
        let mut e = TurnTiltEffect::default();
        for _ in 0..10_000 {
            e = tt.apply(inputs, t, true, 0.0, atr);
        }
        e.offset
    }

    #[test]
    fn below_start_angle_no_tilt() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.yaw_change = 0.01; // scaled 1 < start angle 2
        inputs.abs_yaw_change = 0.01;
        assert_eq!(settle(&mut tt, &inputs, &t, 0.0), 0.0);
    }

    #[test]
    fn not_plain_running_no_tilt() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let inputs = turning_inputs();
        let mut e = TurnTiltEffect::default();
        for _ in 0..1000 {
            e = tt.apply(&inputs, &t, false, 0.0, 0.0);
        }
        assert_eq!(e.offset, 0.0);
    }

    #[test]
    fn basic_target_with_saturated_speed_boost() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let inputs = turning_inputs();
        // 0.05 · 4 = 0.2, speed boost saturates at 2.0 (erpm 5000 ≥ end),
        // no aggregate, sign(+).
        let out = settle(&mut tt, &inputs, &t, 0.0);
        assert!((out - 0.4).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn linear_speed_boost_below_end() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.erpm = 2500.0;
        inputs.abs_erpm = 2500.0;
        // boost = 1 + 2500·(100/100/5000) = 1.5 → 0.2·1.5 = 0.3
        let out = settle(&mut tt, &inputs, &t, 0.0);
        assert!((out - 0.3).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn aggregate_yaw_boost_caps_at_double() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.yaw_aggregate = 30.0; // boost would be 21× → cap 2
        // 0.2 · 2 (speed) · 2 (aggregate) = 0.8
        let out = settle(&mut tt, &inputs, &t, 0.0);
        assert!((out - 0.8).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn capped_at_angle_limit_and_sign_aligned() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.yaw_change = 0.09;
        inputs.abs_yaw_change = 0.09;
        inputs.yaw_aggregate = 30.0;
        inputs.erpm = -5000.0; // reverse travel flips the sign
        // 0.09·4·2·2 = 1.44 < 3 limit; −erpm → −1.44. Raise yaw further:
        let out = settle(&mut tt, &inputs, &t, 0.0);
        assert!(out < 0.0, "reverse travel should tilt negative, got {out}");
        assert!(out >= -t.cfg.turntilt_angle_limit - 1e-9);
    }

    #[test]
    fn below_start_erpm_disabled() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.erpm = 300.0;
        inputs.abs_erpm = 300.0;
        assert_eq!(settle(&mut tt, &inputs, &t, 0.0), 0.0);
    }

    #[test]
    fn atr_interference_scales_linearly() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let inputs = turning_inputs();
        // Same-sign ATR 3.5 → scaling (5−3.5)/(5−2) = 0.5 → 0.4·0.5 = 0.2.
        let out = settle(&mut tt, &inputs, &t, 3.5);
        assert!((out - 0.2).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn atr_interference_full_squeeze_clears_aggregate() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let inputs = turning_inputs();
        let e = tt.apply(&inputs, &t, true, 0.0, 6.0); // |ATR| > 5
        assert!(e.clear_yaw_aggregate);
        assert_eq!(tt.target, 0.0);
    }

    #[test]
    fn opposing_atr_interferes_sooner() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let inputs = turning_inputs();
        // ATR −1.5 opposes a positive turn target: min 1, max 4,
        // scaling (4−1.5)/3 ≈ 0.8333 → 0.4·0.8333 ≈ 0.3333.
        let out = settle(&mut tt, &inputs, &t, -1.5);
        assert!((out - 0.4 * (4.0 - 1.5) / 3.0).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn heavy_pitch_excursion_freezes_turn_tilt() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.pitch = 5.0; // 5° past the nose bias of 0
        let e = tt.apply(&inputs, &t, true, 0.0, 0.0);
        assert!(e.clear_yaw_aggregate);
        assert_eq!(tt.target, 0.0);
    }

    #[test]
    fn cutback_detection() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        // Banked into the turn: roll and yaw same sign, roll dominating.
        inputs.yaw_change = 0.06;
        inputs.abs_yaw_change = 0.06;
        inputs.roll = 10.0;
        inputs.roll_aggregate = 6000.0;
        tt.apply(&inputs, &t, true, 0.0, 0.0);
        assert!(tt.cutback);

        // Yaw-dominated turn (yaw·100/roll ≥ 1): no cutback.
        inputs.roll = 4.0;
        inputs.roll_aggregate = 6000.0;
        tt.apply(&inputs, &t, true, 0.0, 0.0);
        assert!(!tt.cutback);
    }

    #[test]
    fn cutback_inverts_under_atr() {
        let t = tuning();
        let mut tt = TurnTilt::new();
        let mut inputs = turning_inputs();
        inputs.roll = 10.0;
        inputs.roll_aggregate = 6000.0;
        inputs.yaw_change = 0.06;
        inputs.abs_yaw_change = 0.06;
        // Strong same-sign ATR with cutback: the target flips sign.
        let mut e = TurnTiltEffect::default();
        for _ in 0..10_000 {
            e = tt.apply(&inputs, &t, true, 0.0, 3.0);
        }
        assert!(tt.cutback);
        assert!(e.offset < 0.0, "cutback should invert, got {}", e.offset);

        // Small ATR with cutback: cancelled outright.
        let mut tt = TurnTilt::new();
        for _ in 0..1000 {
            tt.apply(&inputs, &t, true, 0.0, 0.5);
        }
        assert_eq!(tt.target, 0.0);
    }
}
