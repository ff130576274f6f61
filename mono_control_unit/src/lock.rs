//! Ride-lock gesture recognizer.
//!
//! A nine-step foot-pad sequence toggles a persistent lock that keeps the
//! board from engaging: pads ON → OFF → pad 1 → OFF → pad 2 → OFF →
//! pad 1 → OFF → pad 2. Any wrong pad event drops back to the start, and
//! each step must be at least 50 ms after the previous one to filter
//! bounce. Runs only inside fault states.
//!
//! Persisting a newly-locked state requires the magic radio channel;
//! unlocking always persists so nobody bricks a board by accident.

use mono_common::state::SwitchState;

use crate::inputs::Inputs;
use crate::ports::SignalPort;
use crate::tuning::Tuning;

const STEP_DEBOUNCE_MS: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct LockRecognizer {
    step: i8,
    locked: bool,
    timer: u64,
}

impl LockRecognizer {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            step: -1,
            locked: tuning.initially_locked,
            timer: 0,
        }
    }

    /// Whether riding is currently disabled.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Current gesture step (−1 when idle).
    #[inline]
    pub fn step(&self) -> i8 {
        self.step
    }

    /// Abandon any in-flight gesture (riding resumed).
    #[inline]
    pub fn cancel(&mut self) {
        self.step = -1;
    }

    /// Advance the recognizer one tick.
    pub fn update(
        &mut self,
        now: u64,
        inputs: &Inputs,
        tuning: &Tuning,
        signals: &mut dyn SignalPort,
    ) {
        if tuning.ticks_to_ms(now.saturating_sub(self.timer)) < STEP_DEBOUNCE_MS {
            return;
        }
        let cfg = &tuning.cfg;
        let pad1 = inputs.adc1 > cfg.fault_adc1;
        let pad2 = inputs.adc2 > cfg.fault_adc2;
        let old_step = self.step;

        match self.step {
            -1 => {
                if inputs.switch == SwitchState::On {
                    self.step = 0;
                }
            }
            0 => {
                if inputs.switch == SwitchState::Off {
                    self.step = 1;
                }
            }
            1 => {
                if pad2 {
                    self.step = -1;
                } else if pad1 {
                    self.step = 2;
                }
            }
            2 => {
                if pad2 || inputs.switch == SwitchState::On {
                    self.step = -1;
                } else if inputs.switch == SwitchState::Off {
                    self.step = 3;
                }
            }
            3 => {
                if pad1 {
                    self.step = -1;
                } else if pad2 {
                    self.step = 4;
                }
            }
            4 => {
                if pad1 || inputs.switch == SwitchState::On {
                    self.step = -1;
                } else if inputs.switch == SwitchState::Off {
                    self.step = 5;
                }
            }
            5 => {
                if pad2 {
                    self.step = -1;
                } else if pad1 {
                    self.step = 6;
                }
            }
            6 => {
                if pad2 || inputs.switch == SwitchState::On {
                    self.step = -1;
                } else if inputs.switch == SwitchState::Off {
                    self.step = 7;
                }
            }
            7 => {
                if pad1 {
                    self.step = -1;
                } else if pad2 {
                    self.step = 8;
                }
            }
            8 => {
                self.step = -1;
                self.locked = !self.locked;
                if !self.locked || tuning.lock_persist_allowed {
                    signals.persist_lock(self.locked);
                    if self.locked {
                        tracing::info!("board locked");
                        signals.beep_alert(2, true);
                    } else {
                        tracing::info!("board unlocked");
                        signals.beep_alert(3, false);
                    }
                }
            }
            _ => {}
        }

        if old_step != self.step {
            self.timer = now;
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MotorConfig;
    use crate::sim::RecordingSignals;
    use mono_common::config::BalanceConfig;

    fn tuning(persist_channel: bool) -> Tuning {
        let mut cfg = BalanceConfig::default();
        cfg.hertz = 1000.0;
        cfg.fault_adc1 = 2.0;
        cfg.fault_adc2 = 2.0;
        if persist_channel {
            cfg.radio.channel = 99;
        }
        Tuning::derive(cfg, &MotorConfig::default())
    }

    fn pads(adc1: bool, adc2: bool) -> Inputs {
        let (v1, v2) = (if adc1 { 2.5 } else { 0.0 }, if adc2 { 2.5 } else { 0.0 });
        let switch = if adc1 && adc2 {
            SwitchState::On
        } else if adc1 || adc2 {
            SwitchState::Half
        } else {
            SwitchState::Off
        };
        Inputs {
            adc1: v1,
            adc2: v2,
            switch,
            ..Inputs::default()
        }
    }

    /// Canonical gesture: ON, OFF, pad1, OFF, pad2, OFF, pad1, OFF, pad2.
    fn canonical() -> Vec<Inputs> {
        vec![
            pads(true, true),
            pads(false, false),
            pads(true, false),
            pads(false, false),
            pads(false, true),
            pads(false, false),
            pads(true, false),
            pads(false, false),
            pads(false, true),
            pads(false, false), // step 8 fires on the tick after
        ]
    }

    fn run_gesture(
        lock: &mut LockRecognizer,
        tuning: &Tuning,
        signals: &mut RecordingSignals,
        events: &[Inputs],
        spacing_ms: u64,
    ) {
        let mut now = 1000;
        for step in events {
            now += spacing_ms;
            lock.update(now, step, tuning, signals);
        }
    }

    #[test]
    fn canonical_gesture_locks_and_persists() {
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        assert!(!lock.is_locked());

        run_gesture(&mut lock, &t, &mut signals, &canonical(), 60);
        assert!(lock.is_locked());
        assert_eq!(signals.persisted, vec![true]);
        assert_eq!(signals.alerts, vec![(2, true)]);
        assert_eq!(lock.step(), -1);
    }

    #[test]
    fn unlock_beeps_three_short() {
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        run_gesture(&mut lock, &t, &mut signals, &canonical(), 60);
        assert!(lock.is_locked());

        let mut signals = RecordingSignals::default();
        run_gesture(&mut lock, &t, &mut signals, &canonical(), 60);
        assert!(!lock.is_locked());
        assert_eq!(signals.persisted, vec![false]);
        assert_eq!(signals.alerts, vec![(3, false)]);
    }

    #[test]
    fn lock_without_magic_channel_does_not_persist() {
        let t = tuning(false);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        run_gesture(&mut lock, &t, &mut signals, &canonical(), 60);
        // Lock toggles in memory but is neither persisted nor announced.
        assert!(lock.is_locked());
        assert!(signals.persisted.is_empty());
        assert!(signals.alerts.is_empty());
    }

    #[test]
    fn wrong_pad_resets() {
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        // ON, OFF, pad1, OFF — then pad1 again where pad2 is expected.
        let events = vec![
            pads(true, true),
            pads(false, false),
            pads(true, false),
            pads(false, false),
            pads(true, false), // wrong: resets
        ];
        run_gesture(&mut lock, &t, &mut signals, &events, 60);
        assert_eq!(lock.step(), -1);
        assert!(!lock.is_locked());
    }

    #[test]
    fn extra_full_press_resets_mid_gesture() {
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        // Reach step 4 (ON, OFF, pad1, OFF, pad2), then a full press.
        let events = vec![
            pads(true, true),
            pads(false, false),
            pads(true, false),
            pads(false, false),
            pads(false, true),
            pads(true, true), // both pads: reset
        ];
        run_gesture(&mut lock, &t, &mut signals, &events, 60);
        assert_eq!(lock.step(), -1);
        assert!(!lock.is_locked());
    }

    #[test]
    fn debounce_ignores_fast_events() {
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        // 10 ms spacing: only the first transition (−1→0) can happen;
        // everything after lands inside the 50 ms window of the previous
        // accepted step... and each accepted step re-arms the window.
        let mut now = 1000u64;
        lock.update(now, &pads(true, true), &t, &mut signals); // −1 → 0
        for event in [pads(false, false), pads(true, false), pads(false, false)] {
            now += 10;
            lock.update(now, &event, &t, &mut signals);
        }
        // Only 30 ms passed since step 0 was accepted: still at step 0.
        assert_eq!(lock.step(), 0);
    }

    #[test]
    fn gesture_survives_slow_rider() {
        // Steps 2 s apart still work; there is no upper bound.
        let t = tuning(true);
        let mut lock = LockRecognizer::new(&t);
        let mut signals = RecordingSignals::default();
        run_gesture(&mut lock, &t, &mut signals, &canonical(), 2000);
        assert!(lock.is_locked());
    }
}
