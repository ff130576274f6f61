//! Setpoint director: picks the adjustment mode and target pitch.
//!
//! Priority order per tick: finish the centering ramp, then reverse-stop,
//! then duty / high-voltage / low-voltage / FET-temperature tilt-backs,
//! otherwise level. The interpolated setpoint chases the target at the
//! step size belonging to the active mode.

use mono_common::consts::START_GRACE_PERIOD_MS;
use mono_common::state::{BalancePhase, SetpointMode};

use crate::inputs::Inputs;
use crate::ports::SignalPort;
use crate::tuning::Tuning;

/// What the director decided this tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directive {
    /// Running-phase label (plain or a tilt-back variant).
    pub tiltback_phase: Option<BalancePhase>,
    /// Reverse-stop was just entered; re-arm its fault timer.
    pub entered_reverse: bool,
    /// Reverse-stop was just left cleanly; zero the PID integral.
    pub reset_integral: bool,
}

/// Mode, target, and interpolation state for the base setpoint.
#[derive(Debug, Clone)]
pub struct SetpointDirector {
    pub mode: SetpointMode,
    pub target: f64,
    pub interpolated: f64,
    reverse_total_erpm: f64,
    softstart_timer: u64,
    hv_timer: u64,
}

impl Default for SetpointDirector {
    fn default() -> Self {
        Self {
            mode: SetpointMode::Centering,
            target: 0.0,
            interpolated: 0.0,
            reverse_total_erpm: 0.0,
            softstart_timer: 0,
            hv_timer: 0,
        }
    }
}

impl SetpointDirector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-arm for a fresh ride. The engage ramp starts from half the
    /// current pitch so the board meets the rider where they stand.
    pub fn reset(&mut self, pitch: f64, now: u64) {
        self.mode = SetpointMode::Centering;
        self.target = 0.0;
        self.interpolated = pitch / 2.0;
        self.reverse_total_erpm = 0.0;
        self.softstart_timer = now;
        self.hv_timer = now;
    }

    /// Signed reverse-stop erpm accumulator (fault detection reads it).
    #[inline]
    pub fn reverse_total_erpm(&self) -> f64 {
        self.reverse_total_erpm
    }

    /// Classify the tick and update `mode`/`target`.
    pub fn classify(
        &mut self,
        now: u64,
        inputs: &Inputs,
        tuning: &Tuning,
        signals: &mut dyn SignalPort,
    ) -> Directive {
        let cfg = &tuning.cfg;
        let mut directive = Directive::default();
        let elapsed_ms = |timer: u64| tuning.ticks_to_ms(now.saturating_sub(timer));

        // The HV debounce timer arms while the pack is below the threshold.
        if inputs.input_voltage < cfg.tiltback_hv {
            self.hv_timer = now;
        }

        match self.mode {
            SetpointMode::Centering => {
                if self.interpolated != self.target {
                    // Ramp still in progress; tilt-backs wait their turn.
                    self.softstart_timer = now;
                } else if elapsed_ms(self.softstart_timer) > START_GRACE_PERIOD_MS {
                    self.mode = SetpointMode::TiltbackNone;
                } else if !tuning.use_soft_start {
                    self.mode = SetpointMode::TiltbackNone;
                }
            }
            SetpointMode::ReverseStop => {
                self.reverse_total_erpm += inputs.erpm;
                let magnitude = self.reverse_total_erpm.abs();
                if magnitude > tuning.reverse_tolerance {
                    // Tilt down 10° per 50k aggregate erpm past the grace.
                    self.target = 10.0 * (magnitude - tuning.reverse_tolerance) / 50_000.0;
                } else if magnitude <= tuning.reverse_tolerance / 2.0 && inputs.erpm >= 0.0 {
                    self.mode = SetpointMode::TiltbackNone;
                    self.reverse_total_erpm = 0.0;
                    self.target = 0.0;
                    directive.reset_integral = true;
                }
            }
            _ => {
                if inputs.abs_duty > cfg.tiltback_duty {
                    self.target = if inputs.erpm > 0.0 {
                        cfg.tiltback_duty_angle
                    } else {
                        -cfg.tiltback_duty_angle
                    };
                    self.mode = SetpointMode::TiltbackDuty;
                    directive.tiltback_phase = Some(BalancePhase::RunningTiltbackDuty);
                } else if inputs.input_voltage > cfg.tiltback_hv {
                    if elapsed_ms(self.hv_timer) > 500.0
                        || inputs.input_voltage > cfg.tiltback_hv + 1.0
                    {
                        self.target = if inputs.erpm > 0.0 {
                            cfg.tiltback_hv_angle
                        } else {
                            -cfg.tiltback_hv_angle
                        };
                        self.mode = SetpointMode::TiltbackHv;
                        directive.tiltback_phase = Some(BalancePhase::RunningTiltbackHv);
                    } else {
                        // The rider gets 500 ms to react to the triple-beep;
                        // a short spike never tilts.
                        self.mode = SetpointMode::TiltbackNone;
                    }
                    signals.beep_alert(3, false);
                } else if inputs.input_voltage < cfg.tiltback_lv {
                    self.target = if inputs.erpm > 0.0 {
                        cfg.tiltback_lv_angle
                    } else {
                        -cfg.tiltback_lv_angle
                    };
                    self.mode = SetpointMode::TiltbackLv;
                    directive.tiltback_phase = Some(BalancePhase::RunningTiltbackLv);
                    signals.beep_alert(3, false);
                } else if inputs.temp_fet > tuning.max_temp_fet {
                    // LV angle at HV ramp speed; one degree of hysteresis.
                    signals.beep_alert(3, true);
                    if inputs.temp_fet > tuning.max_temp_fet + 1.0 {
                        self.target = if inputs.erpm > 0.0 {
                            cfg.tiltback_lv_angle
                        } else {
                            -cfg.tiltback_lv_angle
                        };
                        self.mode = SetpointMode::TiltbackHv;
                        directive.tiltback_phase = Some(BalancePhase::RunningTiltbackLv);
                    } else {
                        self.mode = SetpointMode::TiltbackNone;
                    }
                } else {
                    if tuning.use_reverse_stop && inputs.erpm < 0.0 {
                        self.mode = SetpointMode::ReverseStop;
                        self.reverse_total_erpm = 0.0;
                        directive.entered_reverse = true;
                    } else {
                        self.mode = SetpointMode::TiltbackNone;
                    }
                    self.target = 0.0;
                }
            }
        }

        directive
    }

    /// Advance the interpolated setpoint one step toward the target,
    /// snapping when within one step.
    pub fn interpolate(&mut self, tuning: &Tuning) {
        if self.interpolated == self.target {
            return;
        }
        let step = self.step_size(tuning);
        if (self.target - self.interpolated).abs() < step {
            self.interpolated = self.target;
        } else if self.target > self.interpolated {
            self.interpolated += step;
        } else {
            self.interpolated -= step;
        }
    }

    /// Step size for the active mode [deg/tick].
    pub fn step_size(&self, tuning: &Tuning) -> f64 {
        match self.mode {
            SetpointMode::Centering => tuning.startup_step,
            SetpointMode::ReverseStop => tuning.reverse_stop_step,
            SetpointMode::TiltbackNone => tuning.tiltback_return_step,
            SetpointMode::TiltbackDuty => tuning.tiltback_duty_step,
            SetpointMode::TiltbackHv => tuning.tiltback_hv_step,
            SetpointMode::TiltbackLv => tuning.tiltback_lv_step,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
