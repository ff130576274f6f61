//! Debounced fault detection.
//!
//! Every fault predicate owns a hold-off timer: while the predicate is
//! false the timer is pinned to "now"; once it holds long enough the fault
//! fires. `ignore_timers` bypasses the debounce (used by the sticky duty
//! fault, which needs another fault to take over before it may clear).
//!
//! Evaluation order matters for ride feel: switch before angles, duty last.

use mono_common::state::{BalancePhase, SetpointMode, SwitchState};

use crate::inputs::Inputs;
use crate::tuning::Tuning;

/// Fault timers, tick-stamped.
#[derive(Debug, Clone, Default)]
pub struct FaultMonitor {
    switch_timer: u64,
    switch_half_timer: u64,
    pitch_timer: u64,
    roll_timer: u64,
    duty_timer: u64,
    reverse_timer: u64,
}

impl FaultMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm the reverse-stop timers on entry into reverse riding.
    #[inline]
    pub fn arm_reverse(&mut self, now: u64) {
        self.reverse_timer = now;
    }

    /// Evaluate all fault predicates for this tick.
    ///
    /// Returns the fault phase to enter, or `None`. Timers advance as a
    /// side effect either way.
    pub fn check(
        &mut self,
        now: u64,
        inputs: &Inputs,
        tuning: &Tuning,
        mode: SetpointMode,
        reverse_total_erpm: f64,
        ignore_timers: bool,
    ) -> Option<BalancePhase> {
        let cfg = &tuning.cfg;
        let elapsed = |timer: u64| tuning.ticks_to_ms(now.saturating_sub(timer));

        // Switch fully open.
        if inputs.switch == SwitchState::Off {
            if elapsed(self.switch_timer) > cfg.fault_delay_switch_full || ignore_timers {
                return Some(BalancePhase::FaultSwitchFull);
            }
            if inputs.abs_erpm < cfg.fault_adc_half_erpm * 4.0
                && elapsed(self.switch_timer) > cfg.fault_delay_switch_half
            {
                // Low speed: the shorter half-switch delay is enough.
                return Some(BalancePhase::FaultSwitchFull);
            }
            if inputs.abs_erpm < cfg.fault_adc_half_erpm && inputs.pitch.abs() > 15.0 {
                // Quick stop.
                return Some(BalancePhase::FaultSwitchFull);
            }
            if inputs.abs_erpm > 3000.0 && !tuning.allow_high_speed_full_switch_faults {
                // Never drop the motor at speed; hold the timer instead.
                self.switch_timer = now;
            }
        } else {
            self.switch_timer = now;
        }

        // Reverse riding has its own abort rules.
        if mode == SetpointMode::ReverseStop {
            if inputs.switch == SwitchState::Off {
                return Some(BalancePhase::FaultSwitchFull);
            }
            if inputs.pitch.abs() > 15.0 {
                return Some(BalancePhase::FaultReverse);
            }
            if inputs.pitch.abs() > 10.0 && elapsed(self.reverse_timer) > 500.0 {
                return Some(BalancePhase::FaultReverse);
            }
            if inputs.pitch.abs() > 5.0 && elapsed(self.reverse_timer) > 1000.0 {
                return Some(BalancePhase::FaultReverse);
            }
            if reverse_total_erpm.abs() > tuning.reverse_tolerance * 3.0 {
                return Some(BalancePhase::FaultReverse);
            }
            if inputs.pitch.abs() < 5.0 {
                self.reverse_timer = now;
            }
        }

        // Switch partially open while (almost) stopped.
        if (inputs.switch == SwitchState::Half || inputs.switch == SwitchState::Off)
            && inputs.abs_erpm < cfg.fault_adc_half_erpm
        {
            if elapsed(self.switch_half_timer) > cfg.fault_delay_switch_half || ignore_timers {
                return Some(BalancePhase::FaultSwitchHalf);
            }
        } else {
            self.switch_half_timer = now;
        }

        // Pitch angle.
        if inputs.pitch.abs() > cfg.fault_pitch {
            if elapsed(self.pitch_timer) > cfg.fault_delay_pitch || ignore_timers {
                return Some(BalancePhase::FaultAnglePitch);
            }
        } else {
            self.pitch_timer = now;
        }

        // Roll angle.
        if inputs.roll.abs() > cfg.fault_roll {
            if elapsed(self.roll_timer) > cfg.fault_delay_roll || ignore_timers {
                return Some(BalancePhase::FaultAngleRoll);
            }
        } else {
            self.roll_timer = now;
        }

        // Duty cycle.
        if inputs.abs_duty > cfg.fault_duty {
            if elapsed(self.duty_timer) > cfg.fault_delay_duty || ignore_timers {
                return Some(BalancePhase::FaultDuty);
            }
        } else {
            self.duty_timer = now;
        }

        None
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
