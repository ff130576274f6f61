//! Output stage: clamping, engage clicks, brake handling, engage tune.
//!
//! Every current write feeds the motor-side watchdog with a 20-tick grace
//! period so the controller never times out between loop iterations. The
//! clamp keeps 3 A of headroom inside the controller's own limits and makes
//! saturation audible.

use crate::ports::{MotorPort, SignalPort};
use crate::tuning::Tuning;

#[derive(Debug, Clone, Default)]
pub struct Actuator {
    /// Tick deadline after which braking goes silent (0 = unarmed).
    brake_timeout: u64,
    start_clicks: u32,
    /// Output is saturated against the current limits.
    pub current_limiting: bool,
}

impl Actuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm for a fresh engage.
    pub fn reset(&mut self, tuning: &Tuning) {
        self.brake_timeout = 0;
        self.start_clicks = tuning.start_clicks_max;
        self.current_limiting = false;
    }

    /// Clamp the requested current into the safe interior of the motor
    /// limits, beeping while saturated.
    pub fn clamp(&mut self, requested: f64, tuning: &Tuning, signals: &mut dyn SignalPort) -> f64 {
        if requested > tuning.current_max - 3.0 {
            signals.beep_on(true);
            self.current_limiting = true;
            tuning.current_max - 3.0
        } else if requested < tuning.current_min + 3.0 {
            signals.beep_on(true);
            self.current_limiting = true;
            tuning.current_min + 3.0
        } else {
            if self.current_limiting {
                self.current_limiting = false;
                signals.beep_off(false);
            }
            requested
        }
    }

    /// Write the motor current, overlaying the engage click on the first
    /// two ticks of a ride.
    pub fn drive(&mut self, current: f64, tuning: &Tuning, motor: &mut dyn MotorPort) {
        let output = if self.start_clicks > 0 {
            self.start_clicks -= 1;
            if self.start_clicks == 0 || self.start_clicks == 2 {
                current - tuning.click_current
            } else {
                current + tuning.click_current
            }
        } else {
            current
        };
        motor.set_current_off_delay(tuning.motor_timeout_s);
        motor.set_current(output);
    }

    /// Brake, honoring the configured brake timeout: as long as the wheel
    /// turns the deadline keeps extending; once expired the motor floats.
    pub fn brake(&mut self, now: u64, abs_erpm: f64, tuning: &Tuning, motor: &mut dyn MotorPort) {
        if tuning.cfg.brake_timeout > 0.0 && (abs_erpm > 1.0 || self.brake_timeout == 0) {
            self.brake_timeout = now + tuning.s_to_ticks(tuning.cfg.brake_timeout);
        }
        if self.brake_timeout != 0 && now > self.brake_timeout {
            return;
        }
        motor.set_brake_current(tuning.cfg.brake_current);
    }
}

/// Wiggle the motor so the rider hears the board come alive. With
/// `change_freqs` the wiggle steps through four switching frequencies (an
/// actual tune); without, a single ±1 A nudge.
pub fn play_engage_tune(
    motor: &mut dyn MotorPort,
    signals: &mut dyn SignalPort,
    change_freqs: bool,
) {
    let original_sw = motor.configuration().switching_frequency;
    let mut current = 1.0;
    for (i, freq) in [2093.0, 2637.0, 3135.0, 4186.0].iter().enumerate() {
        if change_freqs {
            motor.change_switching_frequency(*freq);
        }
        motor.set_current(current);
        signals.delay_ms(50);
        motor.set_current(0.0);
        signals.delay_ms(10);
        current = -current;
        if !change_freqs && i > 0 {
            // No tune requested: one back-and-forth wiggle is enough.
            break;
        }
    }
    if change_freqs {
        motor.change_switching_frequency(original_sw);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MotorConfig;
    use crate::sim::{MotorCommand, RecordingSignals, SimMotor};
    use mono_common::config::BalanceConfig;

    fn tuning_with(f: impl FnOnce(&mut BalanceConfig)) -> Tuning {
        let mut cfg = BalanceConfig::default();
        cfg.hertz = 1000.0;
        f(&mut cfg);
        Tuning::derive(cfg, &MotorConfig::default())
    }

    #[test]
    fn clamp_keeps_three_amp_headroom() {
        let t = tuning_with(|_| {}); // limits ±60
        let mut act = Actuator::new();
        let mut signals = RecordingSignals::default();

        assert_eq!(act.clamp(100.0, &t, &mut signals), 57.0);
        assert!(act.current_limiting);
        assert!(signals.beep_on_calls > 0);

        assert_eq!(act.clamp(-100.0, &t, &mut signals), -57.0);
        assert!(act.current_limiting);

        // Back in range: limiting clears, beep stops.
        assert_eq!(act.clamp(10.0, &t, &mut signals), 10.0);
        assert!(!act.current_limiting);
        assert!(signals.beep_off_calls > 0);
    }

    #[test]
    fn clamp_inside_range_untouched() {
        let t = tuning_with(|_| {});
        let mut act = Actuator::new();
        let mut signals = RecordingSignals::default();
        assert_eq!(act.clamp(56.9, &t, &mut signals), 56.9);
        assert!(!act.current_limiting);
        assert_eq!(signals.beep_on_calls, 0);
    }

    #[test]
    fn engage_clicks_bracket_the_first_two_ticks() {
        let t = tuning_with(|c| c.brake_current = 6.1); // click ≈ 10 A
        let mut act = Actuator::new();
        act.reset(&t);
        let mut motor = SimMotor::default();

        act.drive(20.0, &t, &mut motor);
        act.drive(20.0, &t, &mut motor);
        act.drive(20.0, &t, &mut motor);

        let currents: Vec<f64> = motor
            .commands
            .iter()
            .filter_map(|c| match c {
                MotorCommand::Current(a) => Some(*a),
                _ => None,
            })
            .collect();
        assert_eq!(currents.len(), 3);
        // Tick 1: +click, tick 2: −click, tick 3: plain.
        assert!((currents[0] - (20.0 + t.click_current)).abs() < 1e-9);
        assert!((currents[1] - (20.0 - t.click_current)).abs() < 1e-9);
        assert!((currents[2] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn stealth_start_has_no_clicks() {
        let t = tuning_with(|c| c.startup_speed = 5.2);
        assert_eq!(t.start_clicks_max, 0);
        let mut act = Actuator::new();
        act.reset(&t);
        let mut motor = SimMotor::default();
        act.drive(20.0, &t, &mut motor);
        assert!(matches!(motor.commands[..], [MotorCommand::Current(a)] if (a - 20.0).abs() < 1e-9));
    }

    #[test]
    fn drive_feeds_motor_watchdog() {
        let t = tuning_with(|_| {});
        let mut act = Actuator::new();
        act.reset(&t);
        let mut motor = SimMotor::default();
        act.drive(5.0, &t, &mut motor);
        // 20 loop periods of grace at 1 kHz.
        assert!((motor.current_off_delay - 0.02).abs() < 1e-12);
    }

    #[test]
    fn brake_without_timeout_always_brakes() {
        let t = tuning_with(|c| {
            c.brake_timeout = 0.0;
            c.brake_current = 6.0;
        });
        let mut act = Actuator::new();
        act.reset(&t);
        let mut motor = SimMotor::default();
        for now in 0..10_000u64 {
            act.brake(now, 0.0, &t, &mut motor);
        }
        assert_eq!(motor.commands.len(), 10_000);
        assert!(matches!(motor.commands[0], MotorCommand::Brake(a) if (a - 6.0).abs() < 1e-9));
    }

    #[test]
    fn brake_timeout_silences_stopped_wheel() {
        let t = tuning_with(|c| c.brake_timeout = 1.0); // 1 s → 1000 ticks
        let mut act = Actuator::new();
        act.reset(&t);
        let mut motor = SimMotor::default();

        // Wheel stopped the whole time: armed once at t=0, expires at 1000.
        for now in 0..2000u64 {
            act.brake(now, 0.0, &t, &mut motor);
        }
        let brakes = motor.commands.len();
        assert!(
            brakes <= 1001,
            "braking should stop after the timeout, got {brakes}"
        );

        // A turning wheel keeps re-arming the deadline.
        let mut motor = SimMotor::default();
        let mut act = Actuator::new();
        act.reset(&t);
        for now in 0..2000u64 {
            act.brake(now, 100.0, &t, &mut motor);
        }
        assert_eq!(motor.commands.len(), 2000);
    }

    #[test]
    fn engage_tune_restores_switching_frequency() {
        let mut motor = SimMotor::default();
        let mut signals = RecordingSignals::default();
        play_engage_tune(&mut motor, &mut signals, true);
        // Four tune frequencies plus the restore.
        assert_eq!(motor.sw_freq_changes.len(), 5);
        assert_eq!(
            *motor.sw_freq_changes.last().unwrap(),
            motor.config.switching_frequency
        );
        // Wiggle currents alternate ±1 A with zeros between.
        assert!(motor.commands.len() >= 8);
    }

    #[test]
    fn plain_wiggle_without_freq_changes() {
        let mut motor = SimMotor::default();
        let mut signals = RecordingSignals::default();
        play_engage_tune(&mut motor, &mut signals, false);
        assert!(motor.sw_freq_changes.is_empty());
        // Two pulses (+1, −1) with zeroing writes: 4 current commands.
        assert_eq!(motor.commands.len(), 4);
    }
}
