//! Per-tick input sampling and derived signals.
//!
//! Reads the IMU, motor telemetry and foot pads once per tick and maintains
//! the derived state the shapers feed on: the yaw-rate EMA and its
//! aggregate, the roll aggregate, and the 40-sample acceleration window
//! with its running mean.

use mono_common::config::BalanceConfig;
use mono_common::consts::{ACCEL_WINDOW, ADC_FULL_SCALE, V_REG};
use mono_common::state::SwitchState;

use crate::ports::Board;
use crate::tuning::Tuning;
use crate::util::sign;

/// Everything the rest of the loop needs from one tick, by value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inputs {
    pub pitch: f64,
    pub last_pitch: f64,
    pub roll: f64,
    pub abs_roll: f64,
    pub gyro: [f64; 3],
    pub duty: f64,
    pub abs_duty: f64,
    pub erpm: f64,
    pub abs_erpm: f64,
    pub motor_current: f64,
    pub motor_position: f64,
    pub input_voltage: f64,
    pub temp_fet: f64,
    pub adc1: f64,
    pub adc2: f64,
    pub switch: SwitchState,
    /// Running mean of the raw smooth-erpm deltas.
    pub acceleration: f64,
    pub yaw_change: f64,
    pub abs_yaw_change: f64,
    pub yaw_aggregate: f64,
    pub roll_aggregate: f64,
}

/// Owns the cross-tick sampling state.
#[derive(Debug, Clone)]
pub struct InputSampler {
    last_pitch: f64,
    last_yaw: f64,
    last_yaw_change: f64,
    yaw_change: f64,
    yaw_aggregate: f64,
    roll_aggregate: f64,
    last_smooth_erpm: f64,
    accel_hist: [f64; ACCEL_WINDOW],
    accel_idx: usize,
    accel_avg: f64,
    pad_alerting: bool,
}

impl Default for InputSampler {
    fn default() -> Self {
        Self {
            last_pitch: 0.0,
            last_yaw: 0.0,
            last_yaw_change: 0.0,
            yaw_change: 0.0,
            yaw_aggregate: 0.0,
            roll_aggregate: 0.0,
            last_smooth_erpm: 0.0,
            accel_hist: [0.0; ACCEL_WINDOW],
            accel_idx: 0,
            accel_avg: 0.0,
            pad_alerting: false,
        }
    }
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the per-ride derived state (called on every transition into
    /// RUNNING). The erpm tracking survives so acceleration stays smooth
    /// across a remount.
    pub fn reset_ride(&mut self) {
        self.last_yaw_change = 0.0;
        self.last_yaw = 0.0;
        self.yaw_change = 0.0;
        self.yaw_aggregate = 0.0;
        self.roll_aggregate = 0.0;
        self.accel_hist = [0.0; ACCEL_WINDOW];
        self.accel_idx = 0;
        self.accel_avg = 0.0;
    }

    /// Sample all ports and update the derived signals for one tick.
    ///
    /// `riding` gates the pad-release alert: it only sounds while the board
    /// is actually being ridden at speed.
    pub fn sample(&mut self, board: &mut Board<'_>, tuning: &Tuning, riding: bool) -> Inputs {
        let cfg = &tuning.cfg;

        let motor_current = board.motor.total_current_directional_filtered();
        let motor_position = board.motor.position();

        let last_pitch = self.last_pitch;
        let pitch = board.imu.pitch().to_degrees();
        self.last_pitch = pitch;
        let roll = board.imu.roll().to_degrees();
        let mut gyro = [0.0; 3];
        board.imu.gyro(&mut gyro);

        let duty = board.motor.duty_now();
        let erpm = board.motor.rpm();
        let abs_erpm = erpm.abs();

        let yaw = board.imu.yaw().to_degrees();
        self.update_yaw(yaw);

        // Cutback groundwork: aggregate roll only while leaned well over.
        let abs_roll = roll.abs();
        if abs_roll > 8.0 {
            self.roll_aggregate += roll;
        } else {
            self.roll_aggregate = 0.0;
        }

        let smooth = tuning.erpm_sign * board.motor.smooth_erpm();
        let acc_raw = smooth - self.last_smooth_erpm;
        self.last_smooth_erpm = smooth;
        self.push_accel(acc_raw);

        let (adc1, adc2) = scale_adcs(board.pads.adc_raw());
        let switch = switch_from_adcs(adc1, adc2, cfg);

        // Pad released at riding speed can mean an imminent nosedive; force
        // the buzzer on until the pad returns or the board slows down.
        if switch == SwitchState::Off && riding && abs_erpm > cfg.fault_adc_half_erpm {
            if !self.pad_alerting {
                tracing::warn!(abs_erpm, "pad released at speed");
            }
            self.pad_alerting = true;
            board.signals.beep_on(true);
        } else {
            self.pad_alerting = false;
            board.signals.beep_off(false);
        }

        Inputs {
            pitch,
            last_pitch,
            roll,
            abs_roll,
            gyro,
            duty,
            abs_duty: duty.abs(),
            erpm,
            abs_erpm,
            motor_current,
            motor_position,
            input_voltage: board.motor.input_voltage(),
            temp_fet: board.motor.temp_fet_filtered(),
            adc1,
            adc2,
            switch,
            acceleration: self.accel_avg,
            yaw_change: self.yaw_change,
            abs_yaw_change: self.yaw_change.abs(),
            yaw_aggregate: self.yaw_aggregate,
            roll_aggregate: self.roll_aggregate,
        }
    }

    /// Yaw-rate bookkeeping for one tick. Returns whether the raw delta was
    /// substituted (IMU not updating, or the ±180° wrap).
    fn update_yaw(&mut self, yaw_deg: f64) -> bool {
        let mut change = yaw_deg - self.last_yaw;
        let mut unchanged = false;
        // Exact zeros only happen when the IMU did not update between
        // loops; deltas above 100° are the sign flip at ±180°.
        if change == 0.0 || change.abs() > 100.0 {
            change = self.last_yaw_change;
            unchanged = true;
        }
        self.last_yaw_change = change;
        self.last_yaw = yaw_deg;

        let change = change.clamp(-0.10, 0.10);
        self.yaw_change = self.yaw_change * 0.8 + 0.2 * change;

        if sign(self.yaw_change) != sign(self.yaw_aggregate) {
            self.yaw_aggregate = 0.0;
        }
        if self.yaw_change.abs() > 0.04 && !unchanged {
            self.yaw_aggregate += self.yaw_change;
        }
        unchanged
    }

    /// Push one raw acceleration sample into the ring, keeping the running
    /// mean exact (the mean equals the arithmetic mean of the window).
    fn push_accel(&mut self, acc_raw: f64) {
        self.accel_avg += (acc_raw - self.accel_hist[self.accel_idx]) / ACCEL_WINDOW as f64;
        self.accel_hist[self.accel_idx] = acc_raw;
        self.accel_idx = (self.accel_idx + 1) % ACCEL_WINDOW;
    }

    /// Mean of the acceleration window.
    #[inline]
    pub fn acceleration(&self) -> f64 {
        self.accel_avg
    }

    /// Drop the accumulated yaw (turn tilt requests this when it backs off).
    #[inline]
    pub fn clear_yaw_aggregate(&mut self) {
        self.yaw_aggregate = 0.0;
    }
}

/// Scale raw 12-bit pad counts to volts.
#[inline]
fn scale_adcs(raw: (u16, u16)) -> (f64, f64) {
    (
        raw.0 as f64 / ADC_FULL_SCALE * V_REG,
        raw.1 as f64 / ADC_FULL_SCALE * V_REG,
    )
}

/// Derive the switch state from the pad voltages. A zero threshold disables
/// that pad; with both disabled the switch is considered pressed.
pub fn switch_from_adcs(adc1: f64, adc2: f64, cfg: &BalanceConfig) -> SwitchState {
    if cfg.fault_adc1 == 0.0 && cfg.fault_adc2 == 0.0 {
        SwitchState::On
    } else if cfg.fault_adc2 == 0.0 {
        if adc1 > cfg.fault_adc1 {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    } else if cfg.fault_adc1 == 0.0 {
        if adc2 > cfg.fault_adc2 {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    } else if adc1 > cfg.fault_adc1 && adc2 > cfg.fault_adc2 {
        SwitchState::On
    } else if adc1 > cfg.fault_adc1 || adc2 > cfg.fault_adc2 {
        SwitchState::Half
    } else {
        SwitchState::Off
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
