//! Balance PID with adaptive gains.
//!
//! Not a textbook PID: gains ease between targets at asymmetric rates
//! (stiffen fast, relax slow), the proportional term gets a center boost
//! and an acceleration boost, P+D braking amps are clamped against travel
//! direction, the derivative is PT1-filtered and clamped, and the final
//! output is smoothed (~5 ms effective latency). Soft start runs a reduced
//! P+D blend during the centering ramp.
//!
//! Gain state persists across ticks; [`PidController::reset`] re-arms it
//! for a fresh engage.

use mono_common::consts::START_CENTER_DELAY_MS;
use mono_common::state::SetpointMode;

use crate::inputs::Inputs;
use crate::ports::SignalPort;
use crate::tuning::Tuning;
use crate::util::sign;

#[derive(Debug, Clone, Default)]
pub struct PidController {
    /// Eased proportional gain.
    pub kp: f64,
    /// Eased integral gain.
    pub ki: f64,
    /// Eased derivative gain.
    pub kd: f64,
    /// Integral accumulator (degree-ticks).
    pub integral: f64,
    /// This tick's proportional error [deg].
    pub proportional: f64,
    /// PT1-filtered derivative [deg/tick].
    pub derivative: f64,
    /// Smoothed output current [A]. The output stage writes the clamped
    /// value back here so the smoother never chases an unreachable value.
    pub pid_value: f64,
    d_filter_state: f64,
    center_stiffness_delay: u32,
    center_jerk_counter: u32,
    center_jerk_adder: f64,
}

impl PidController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm for a fresh engage.
    pub fn reset(&mut self, tuning: &Tuning) {
        self.integral = 0.0;
        self.proportional = 0.0;
        self.derivative = 0.0;
        self.d_filter_state = 0.0;
        self.pid_value = 0.0;
        if tuning.use_soft_start {
            self.kp = 1.0;
            self.ki = 0.0;
            self.kd = 0.0;
        } else {
            // Quick start engages at most of the configured stiffness.
            self.kp = tuning.kp_base * 0.8;
            self.ki = tuning.ki_base;
            self.kd = 0.0;
        }
        self.center_stiffness_delay = START_CENTER_DELAY_MS as u32;
        self.center_jerk_counter = 0;
        self.center_jerk_adder = 0.0;
    }

    /// Zero the integral (reverse-stop exit).
    #[inline]
    pub fn reset_integral(&mut self) {
        self.integral = 0.0;
    }

    /// Compute the raw (unclamped) output current for this tick.
    pub fn compute(
        &mut self,
        inputs: &Inputs,
        tuning: &Tuning,
        setpoint: f64,
        mode: SetpointMode,
        torquetilt_interp: f64,
        signals: &mut dyn SignalPort,
    ) -> f64 {
        let proportional = setpoint - inputs.pitch;
        let abs_prop = proportional.abs();
        self.proportional = proportional;

        // Integral, partially offset by torque tilt so sustained tilt
        // produces controlled nose/tail lift instead of windup.
        self.integral += proportional;
        let tt_impact = if torquetilt_interp < 0.0 {
            tuning.integral_tt_impact_downhill
        } else {
            let mut impact = tuning.integral_tt_impact_uphill;
            const MAX_IMPACT_ERPM: f64 = 2500.0;
            const STARTING_IMPACT: f64 = 0.3;
            if inputs.abs_erpm < MAX_IMPACT_ERPM {
                // Reduced nose lift at lower speeds.
                let erpm_scaling = STARTING_IMPACT.max(inputs.abs_erpm / MAX_IMPACT_ERPM);
                impact = 1.0 - (1.0 - impact) * erpm_scaling;
            }
            impact
        };
        self.integral -= torquetilt_interp * tt_impact;

        // Derivative through the PT1 pole.
        let raw_derivative = inputs.last_pitch - inputs.pitch;
        self.d_filter_state += tuning.d_pt1_k * (raw_derivative - self.d_filter_state);
        self.derivative = self.d_filter_state;

        // Leaning against travel is braking.
        let braking = sign(proportional) != sign(inputs.erpm);

        // ── Adaptive gain targets ──
        let mut p_multiplier = 1.0;
        let mut di_multiplier = 1.0;
        const MAX_DI_MULT: f64 = 1.7;
        if torquetilt_interp.abs() > 2.0 {
            p_multiplier = torquetilt_interp.abs() / 6.0 * tuning.tt_pid_intensity;
            di_multiplier = (1.0 + p_multiplier / 2.0).min(MAX_DI_MULT);
            p_multiplier = (1.0 + p_multiplier).min(2.0);
        }
        let kp_target = tuning.kp_base * p_multiplier;
        let ki_target = tuning.ki_base * di_multiplier;
        let mut kd_target = tuning.kd_base;
        if abs_prop > tuning.center_boost_angle + 0.5 {
            // kD is high for the stiff center; relax it away from center.
            kd_target = kd_target * di_multiplier / MAX_DI_MULT;
        }

        if mode.shaping_active() {
            if kp_target > self.kp {
                // Stiffen quickly (~50 ms)...
                self.kp = self.kp * 0.98 + kp_target * 0.02;
                self.ki = self.ki * 0.98 + ki_target * 0.02;
            } else {
                // ...loosen slowly (~500 ms).
                self.kp = self.kp * 0.998 + kp_target * 0.002;
                self.ki = self.ki * 0.998 + ki_target * 0.002;
            }
            self.kd = self.kd * 0.98 + kd_target * 0.02;
        } else if mode == SetpointMode::Centering {
            self.kp = self.kp * 0.995 + kp_target * 0.005;
            self.ki = self.ki * 0.995 + ki_target * 0.005;
            self.kd = self.kd * 0.995 + kd_target * 0.005;
        } else if mode == SetpointMode::ReverseStop {
            self.integral = 0.0;
            self.kp = self.kp * 0.99 + 2.0 * 0.01;
            self.kd = self.kd * 0.99 + 400.0 * 0.01;
            self.ki = 0.0;
        }

        if tuning.use_soft_start && mode == SetpointMode::Centering {
            // Soft start: heavily smoothed P+D only.
            let pid_prop = self.kp * proportional;
            let pid_derivative = self.kd * self.derivative;
            self.pid_value = 0.05 * (pid_prop + pid_derivative) + 0.95 * self.pid_value;
            self.integral = 0.0;
            self.ki = 0.0;
            return self.pid_value;
        }

        // ── P with center boost / engage jerk / acceleration boost ──
        let mut pid_prop = self.kp * proportional;
        let center_boost = abs_prop.min(tuning.center_boost_angle);
        if self.center_stiffness_delay > 0 {
            let delay_total = START_CENTER_DELAY_MS;
            let ramp = (delay_total - self.center_stiffness_delay as f64) / delay_total;
            pid_prop += center_boost * tuning.center_boost_kp_adder * sign(proportional) * ramp;
            self.center_stiffness_delay -= 1;

            if self.center_jerk_counter < tuning.center_jerk_duration_ticks {
                if self.center_jerk_counter > tuning.center_jerk_duration_ticks / 2 {
                    self.center_jerk_adder =
                        self.center_jerk_adder * 0.95 + tuning.center_jerk_strength * 0.05;
                } else {
                    self.center_jerk_adder =
                        self.center_jerk_adder * 0.95 - tuning.center_jerk_strength * 0.05;
                }
                pid_prop += self.center_jerk_adder;
                if self.center_jerk_counter == 0 {
                    signals.beep_alert(1, false);
                }
                self.center_jerk_counter += 1;
            }
        } else {
            pid_prop += center_boost * tuning.center_boost_kp_adder * sign(proportional);

            if abs_prop > tuning.accel_boost_threshold && !braking {
                let mut accel_boost = (abs_prop - tuning.accel_boost_threshold)
                    * self.kp
                    * tuning.accel_boost_intensity;
                if abs_prop > tuning.accel_boost_threshold2 {
                    accel_boost += (abs_prop - tuning.accel_boost_threshold2)
                        * self.kp
                        * tuning.accel_boost_intensity;
                }
                pid_prop += accel_boost * sign(proportional);
            }
        }

        // ── D, clamped ──
        let mut pid_derivative = self.kd * self.derivative;
        if pid_derivative.abs() > tuning.max_derivative {
            pid_derivative = tuning.max_derivative * sign(pid_derivative);
        }

        // ── P+D brake clamp against travel direction ──
        let mut new_pd_value = pid_prop + pid_derivative;
        if sign(inputs.erpm) != sign(new_pd_value) {
            let mut pid_max = tuning.max_brake_amps.max(pid_prop.abs());
            let tt = torquetilt_interp.abs();
            if tt > 2.0 {
                pid_max *= 0.75 + tt / 8.0;
            }
            if inputs.abs_erpm > 2000.0 {
                pid_max *= 0.8 + inputs.abs_erpm / 10_000.0;
            }
            if new_pd_value.abs() > pid_max {
                new_pd_value = sign(new_pd_value) * pid_max;
            }
        }

        let pid_integral = self.ki * self.integral;

        // Smooth the requested current (~5 ms effective latency).
        self.pid_value = 0.2 * (new_pd_value + pid_integral) + 0.8 * self.pid_value;
        self.pid_value
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
