//! Derived tuning: everything computed once at configure time.
//!
//! Takes the wire [`BalanceConfig`] plus the motor controller limits and
//! produces the values the loop actually runs on: per-tick step sizes
//! (`deg/s ÷ Hz`), decoded feature flags from the repurposed fields, filter
//! coefficients, and clamped safety parameters.
//!
//! The alias decode table (wire field → meaning here):
//!
//! | wire field | decoded as |
//! |---|---|
//! | `startup_speed` fraction .1/.2/.3 | reverse-stop / stealth start / both |
//! | `fault_delay_switch_full` ≡ 1 (mod 10) | forbid high-speed full-switch faults |
//! | `roll_steer_erpm_kp` | center jerk duration [ms] |
//! | `yaw_current_clamp` | center jerk strength [A] |
//! | `yaw_ki` | yaw aggregate target |
//! | `yaw_kp` | downhill strength multiplier [%] |
//! | `yaw_kd` | accel factor (second factor 1.3×) |
//! | `booster_angle` / `booster_ramp` / `booster_current` | center boost angle / kp adder / TT intensity |
//! | `kd_biquad_lowpass` / `kd_biquad_highpass` | integral TT impact down / up (`1 − v/100`) |
//! | `kd_pt1_highpass_frequency` | brake nose-lift ratio (`(21 − v)/4`, v clamped 1..20) |
//! | `roll_steer_kp` int / frac×100 | max brake amps / derivative clamp |
//! | `brake_current` frac×100 | engage click current |
//! | `multi_esc` | persisted lock flag |
//! | `radio.channel == 99` | lock persistence permitted |
//! | `radio.retry_delay_us == 3750 ∧ retries == 13` | boost override in `radio.address` |

use mono_common::config::BalanceConfig;
use mono_common::consts::REVERSE_TOLERANCE_ERPM;

use crate::ports::MotorConfig;

/// Validated, derived tuning bundle. Immutable during a ride.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// The raw wire configuration (thresholds are read from here directly).
    pub cfg: BalanceConfig,

    // ── Loop timing ──
    /// Motor watchdog grace period fed on every current write [s].
    pub motor_timeout_s: f64,
    /// EMA coefficient for the loop-overshoot filter (0 = disabled).
    pub loop_overshoot_alpha: f64,

    // ── Step sizes [deg/tick] ──
    pub startup_step: f64,
    pub tiltback_duty_step: f64,
    pub tiltback_hv_step: f64,
    pub tiltback_lv_step: f64,
    pub tiltback_return_step: f64,
    pub torquetilt_on_step: f64,
    pub torquetilt_off_step: f64,
    pub turntilt_step: f64,
    pub noseangling_step: f64,
    pub reverse_stop_step: f64,

    // ── Reverse stop ──
    pub use_reverse_stop: bool,
    pub reverse_tolerance: f64,

    // ── Start behavior ──
    pub use_soft_start: bool,
    /// Engage click count (0 = stealth start).
    pub start_clicks_max: u32,
    /// Engage click current [A].
    pub click_current: f64,
    pub center_jerk_duration_ticks: u32,
    pub center_jerk_strength: f64,

    // ── Faults ──
    pub allow_high_speed_full_switch_faults: bool,

    // ── PID ──
    pub kp_base: f64,
    pub ki_base: f64,
    pub kd_base: f64,
    /// PT1 coefficient for the D term.
    pub d_pt1_k: f64,
    pub center_boost_angle: f64,
    pub center_boost_kp_adder: f64,
    pub accel_boost_threshold: f64,
    pub accel_boost_threshold2: f64,
    pub accel_boost_intensity: f64,
    pub max_brake_amps: f64,
    pub max_derivative: f64,

    // ── Adaptive torque response ──
    pub tt_pid_intensity: f64,
    pub tt_strength_uphill: f64,
    pub tt_strength_downhill: f64,
    pub integral_tt_impact_uphill: f64,
    pub integral_tt_impact_downhill: f64,
    pub accel_factor: f64,
    pub accel_factor2: f64,
    /// Normalized cutoff for the torque-tilt current low-pass.
    pub torquetilt_filter_fc: f64,
    pub ttt_brake_ratio: f64,
    pub shedfactor: f64,

    // ── Turn tilt ──
    pub yaw_aggregate_target: f64,
    pub turntilt_boost_per_erpm: f64,
    pub cutback_enable: bool,
    pub cutback_minspeed: f64,
    pub roll_aggregate_threshold: f64,

    // ── Nose angling ──
    /// Variable nose bias per erpm [deg].
    pub tiltback_variable: f64,
    pub tiltback_variable_max_erpm: f64,

    // ── Motor limits ──
    pub erpm_sign: f64,
    pub current_max: f64,
    pub current_min: f64,
    /// FET temperature at which tilt-back warning begins [°C].
    pub max_temp_fet: f64,

    // ── Inactivity & lock ──
    pub inactivity_timeout_s: f64,
    pub initially_locked: bool,
    pub lock_persist_allowed: bool,
}

impl Tuning {
    /// Derive the runtime tuning from the wire configuration and the motor
    /// controller limits. Out-of-range values are clamped, never rejected.
    pub fn derive(cfg: BalanceConfig, motor: &MotorConfig) -> Self {
        let hz = cfg.hertz;

        let motor_timeout_s = (1000.0 / hz) / 1000.0 * 20.0;

        // Feature selection in the startup_speed fraction.
        let ss_rest = cfg.startup_speed - cfg.startup_speed.trunc();
        let mut use_reverse_stop = false;
        let mut start_clicks_max = 2u32;
        if ss_rest > 0.09 && ss_rest < 0.11 {
            use_reverse_stop = true;
        } else if ss_rest > 0.19 && ss_rest < 0.21 {
            start_clicks_max = 0;
        } else if ss_rest > 0.29 && ss_rest < 0.31 {
            start_clicks_max = 0;
            use_reverse_stop = true;
        }

        let click_current = ((cfg.brake_current - cfg.brake_current.trunc()) * 100.0).min(30.0);

        let mut center_jerk_strength = cfg.yaw_current_clamp;
        if center_jerk_strength > 50.0 || center_jerk_strength < -50.0 {
            center_jerk_strength = 0.0;
        }
        let jerk_ms = cfg.roll_steer_erpm_kp;
        let center_jerk_duration_ticks = if (0.0..=100.0).contains(&jerk_ms) {
            jerk_ms as u32
        } else {
            0
        };

        let allow_high_speed_full_switch_faults =
            (cfg.fault_delay_switch_full.trunc() as i64) % 10 != 1;

        let mut shedfactor = 0.996;
        if shedfactor > 1.0 {
            shedfactor = 0.99;
        }
        if shedfactor < 0.5 {
            shedfactor = 0.98;
        }

        let turntilt_boost_per_erpm = if cfg.turntilt_erpm_boost_end > 0.0 {
            cfg.turntilt_erpm_boost / 100.0 / cfg.turntilt_erpm_boost_end
        } else {
            0.0
        };

        // Outlandish PID values can break a motor; cap them hard.
        let kp_base = cfg.kp.min(10.0);
        let ki_base = cfg.ki.min(0.01);
        let kd_base = cfg.kd.min(1500.0);

        let tt_pid_intensity = cfg.booster_current.clamp(0.0, 1.5);

        let mut tt_strength_uphill = cfg.torquetilt_strength * 10.0;
        if tt_strength_uphill > 2.5 {
            tt_strength_uphill = 1.5;
        }
        if tt_strength_uphill < 0.0 {
            tt_strength_uphill = 0.0;
        }
        let tt_strength_downhill = tt_strength_uphill * (1.0 + cfg.yaw_kp / 100.0);

        let integral_tt_impact_downhill = (1.0 - cfg.kd_biquad_lowpass / 100.0).clamp(0.0, 1.0);
        let integral_tt_impact_uphill = (1.0 - cfg.kd_biquad_highpass / 100.0).clamp(0.0, 1.0);

        let loop_overshoot_alpha = if cfg.loop_time_filter > 0.0 {
            let w = 2.0 * std::f64::consts::PI * (1.0 / hz) * cfg.loop_time_filter;
            w / (w + 1.0)
        } else {
            0.0
        };

        let mut d_filter_freq = 10.0;
        if cfg.kd_pt1_lowpass_frequency >= 1.0 {
            d_filter_freq = cfg.kd_pt1_lowpass_frequency;
        }
        if d_filter_freq > 30.0 {
            d_filter_freq = 10.0;
        }
        let dt = 1.0 / hz;
        let rc = 1.0 / (2.0 * std::f64::consts::PI * d_filter_freq);
        let d_pt1_k = dt / (rc + dt);

        let mut tt_filter = cfg.torquetilt_filter;
        if tt_filter == 0.0 {
            tt_filter = 5.0;
        }
        if tt_filter > 30.0 {
            tt_filter = 30.0;
        }
        let torquetilt_filter_fc = tt_filter / hz;

        let center_boost_angle = if cfg.booster_angle > 3.0 {
            1.0
        } else {
            cfg.booster_angle
        };
        let mut center_boost_kp_adder = (cfg.booster_ramp / 3.5 * kp_base) - kp_base;
        if center_boost_kp_adder < 0.0 {
            center_boost_kp_adder = 1.0;
        }
        center_boost_kp_adder = center_boost_kp_adder.min(7.0);

        let mut accel_boost_threshold = 8.0;
        let mut accel_boost_threshold2 = 14.0;
        let mut accel_boost_intensity = 0.5;
        if cfg.radio.boost_override_armed() {
            accel_boost_threshold = cfg.radio.address[0] as f64;
            accel_boost_threshold2 = cfg.radio.address[1] as f64;
            accel_boost_intensity = cfg.radio.address[2] as f64 / 10.0;
            // Bogus override values turn the booster off entirely.
            if !(4.0..=20.0).contains(&accel_boost_threshold) {
                accel_boost_intensity = 0.0;
            } else if accel_boost_threshold2 < accel_boost_threshold
                || accel_boost_threshold2 > 20.0
            {
                accel_boost_intensity = 0.0;
            } else if !(0.0..=1.0).contains(&accel_boost_intensity) {
                accel_boost_intensity = 0.0;
            }
        }

        let mut max_brake_amps = cfg.roll_steer_kp;
        if max_brake_amps < 10.0 {
            max_brake_amps = motor.current_max / 2.0;
        }
        let mut max_derivative = 100.0 * (max_brake_amps - max_brake_amps.trunc());
        if max_derivative < 10.0 {
            max_derivative = motor.current_max / 2.0;
        }

        let mut ttt_brake_ratio = cfg.kd_pt1_highpass_frequency.clamp(1.0, 20.0);
        ttt_brake_ratio = (21.0 - ttt_brake_ratio) / 4.0;

        // Variable nose bias: configured per 1000 erpm, used per erpm.
        let tiltback_variable = cfg.tiltback_variable / 1000.0;
        let tiltback_variable_max_erpm = if tiltback_variable > 0.0 {
            (cfg.tiltback_variable_max / tiltback_variable).abs()
        } else {
            100_000.0
        };

        let erpm_sign = if motor.invert_direction { -1.0 } else { 1.0 };

        Self {
            motor_timeout_s,
            loop_overshoot_alpha,
            startup_step: cfg.startup_speed / hz,
            tiltback_duty_step: cfg.tiltback_duty_speed / hz,
            tiltback_hv_step: cfg.tiltback_hv_speed / hz,
            tiltback_lv_step: cfg.tiltback_lv_speed / hz,
            tiltback_return_step: cfg.tiltback_return_speed / hz,
            torquetilt_on_step: cfg.torquetilt_on_speed / hz,
            torquetilt_off_step: cfg.torquetilt_off_speed / hz,
            turntilt_step: cfg.turntilt_speed / hz,
            noseangling_step: cfg.noseangling_speed / hz,
            reverse_stop_step: 100.0 / hz,
            use_reverse_stop,
            reverse_tolerance: REVERSE_TOLERANCE_ERPM,
            use_soft_start: cfg.startup_speed < 10.0,
            start_clicks_max,
            click_current,
            center_jerk_duration_ticks,
            center_jerk_strength,
            allow_high_speed_full_switch_faults,
            kp_base,
            ki_base,
            kd_base,
            d_pt1_k,
            center_boost_angle,
            center_boost_kp_adder,
            accel_boost_threshold,
            accel_boost_threshold2,
            accel_boost_intensity,
            max_brake_amps,
            max_derivative,
            tt_pid_intensity,
            tt_strength_uphill,
            tt_strength_downhill,
            integral_tt_impact_uphill,
            integral_tt_impact_downhill,
            accel_factor: cfg.yaw_kd,
            accel_factor2: cfg.yaw_kd * 1.3,
            torquetilt_filter_fc,
            ttt_brake_ratio,
            shedfactor,
            yaw_aggregate_target: cfg.yaw_ki,
            turntilt_boost_per_erpm,
            cutback_enable: true,
            cutback_minspeed: 2000.0,
            roll_aggregate_threshold: 5000.0,
            tiltback_variable,
            tiltback_variable_max_erpm,
            erpm_sign,
            current_max: motor.current_max,
            current_min: motor.current_min,
            max_temp_fet: motor.temp_fet_start - 2.0,
            inactivity_timeout_s: cfg.shutdown_mode.timeout_s(),
            initially_locked: cfg.multi_esc,
            lock_persist_allowed: cfg.radio.channel == mono_common::consts::LOCK_PERSIST_CHANNEL,
            cfg,
        }
    }

    // ── Tick/time helpers ──

    /// Milliseconds per loop tick.
    #[inline]
    pub fn tick_ms(&self) -> f64 {
        1000.0 / self.cfg.hertz
    }

    /// Tick count → elapsed milliseconds.
    #[inline]
    pub fn ticks_to_ms(&self, ticks: u64) -> f64 {
        ticks as f64 * self.tick_ms()
    }

    /// Tick count → elapsed seconds.
    #[inline]
    pub fn ticks_to_s(&self, ticks: u64) -> f64 {
        ticks as f64 / self.cfg.hertz
    }

    /// Seconds → tick count.
    #[inline]
    pub fn s_to_ticks(&self, s: f64) -> u64 {
        (s * self.cfg.hertz) as u64
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
