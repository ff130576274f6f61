//! Ride supervisor: the state machine wrapping the whole loop.
//!
//! STARTUP waits for the IMU and a sane motor configuration, then drops
//! into FAULT_STARTUP so the normal mount conditions gate the first ride.
//! RUNNING (plus its tilt-back variants) runs the full pipeline —
//! faults → setpoint → shapers → PID → output — and any detected fault
//! routes the motor to braking until the rider remounts level with pads
//! pressed. FAULT_DUTY is sticky and only reclassification by another
//! fault can clear it. The lock gesture is recognized in fault states
//! only, and a locked board refuses to arm.

use mono_common::state::{packed_state, BalancePhase, SetpointMode, SwitchState};

use crate::cycle::LoopTiming;
use crate::faults::FaultMonitor;
use crate::inputs::{InputSampler, Inputs};
use crate::lock::LockRecognizer;
use crate::output::{play_engage_tune, Actuator};
use crate::pid::PidController;
use crate::ports::Board;
use crate::setpoint::SetpointDirector;
use crate::shapers::{LoopFeedback, NoseAngler, TorqueTilt, TurnTilt};
use crate::telemetry::{self, DebugTap, Snapshot};
use crate::tuning::Tuning;

pub struct Supervisor {
    tuning: Tuning,
    phase: BalancePhase,
    sampler: InputSampler,
    faults: FaultMonitor,
    director: SetpointDirector,
    nose: NoseAngler,
    torque: TorqueTilt,
    turn: TurnTilt,
    pid: PidController,
    actuator: Actuator,
    lock: LockRecognizer,
    tap: DebugTap,
    /// Written by the loop runner before each tick; surfaced in telemetry.
    pub timing: LoopTiming,
    tick: u64,
    setpoint: f64,
    inactivity_started: Option<u64>,
    inactivity_timeout_s: f64,
    last_inputs: Inputs,
}

impl Supervisor {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            phase: BalancePhase::Startup,
            sampler: InputSampler::new(),
            faults: FaultMonitor::new(),
            director: SetpointDirector::new(),
            nose: NoseAngler::new(),
            torque: TorqueTilt::new(&tuning),
            turn: TurnTilt::new(),
            pid: PidController::new(),
            actuator: Actuator::new(),
            lock: LockRecognizer::new(&tuning),
            tap: DebugTap::new(),
            timing: LoopTiming::default(),
            tick: 0,
            setpoint: 0.0,
            inactivity_started: None,
            inactivity_timeout_s: tuning.inactivity_timeout_s,
            last_inputs: Inputs::default(),
            tuning,
        }
    }

    // ── Accessors ──

    #[inline]
    pub fn phase(&self) -> BalancePhase {
        self.phase
    }

    #[inline]
    pub fn mode(&self) -> SetpointMode {
        self.director.mode
    }

    #[inline]
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    #[inline]
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    #[inline]
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Terminal debug command routing.
    #[inline]
    pub fn tap_mut(&mut self) -> &mut DebugTap {
        &mut self.tap
    }

    /// Immutable scalar snapshot for external readers.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pitch: self.last_inputs.pitch,
            roll: self.last_inputs.roll,
            setpoint: self.setpoint,
            pid_output: self.pid.pid_value,
            motor_current: self.last_inputs.motor_current,
            erpm: self.last_inputs.erpm,
            duty: self.last_inputs.duty,
            adc1: self.last_inputs.adc1,
            adc2: self.last_inputs.adc2,
            torquetilt_target: self.torque.target,
            turntilt_target: self.turn.target,
            integral: self.pid.integral,
            ki: self.pid.ki,
            switch_state: self.last_inputs.switch as u8,
            phase: self.phase as u8,
            packed_state: packed_state(self.phase, self.director.mode, self.turn.cutback),
            locked: self.lock.is_locked() as u8,
        }
    }

    // ── The tick ──

    /// Run one control tick against the board's ports.
    pub fn tick(&mut self, board: &mut Board<'_>) {
        self.tick += 1;
        let riding = self.phase.is_running();
        let inputs = self.sampler.sample(board, &self.tuning, riding);

        match self.phase {
            BalancePhase::Startup => self.startup_tick(board, &inputs),
            phase if phase.is_running() => self.running_tick(board, &inputs),
            BalancePhase::FaultDuty => self.duty_fault_tick(board, &inputs),
            _ => self.fault_tick(board, &inputs),
        }

        self.last_inputs = inputs;
        self.stream_debug(board);
    }

    /// Shut the outputs down on loop exit.
    pub fn shutdown(&mut self, board: &mut Board<'_>) {
        board.signals.beep_off(true);
        self.actuator
            .brake(self.tick, self.last_inputs.abs_erpm, &self.tuning, board.motor);
    }

    // ── Phase bodies ──

    fn startup_tick(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        self.actuator
            .brake(self.tick, inputs.abs_erpm, &self.tuning, board.motor);

        if board.imu.startup_done() {
            if board.motor.configuration().factory_defaults {
                // A never-detected motor must not balance anyone.
                tracing::warn!("motor configuration at factory defaults, refusing to arm");
                board.signals.beep_on(true);
                board.signals.delay_ms(100);
                board.signals.beep_off(true);
                board.signals.delay_ms(100);
                return;
            }
            self.engage_ready(board, inputs);
        }
        self.inactivity_started = None;
    }

    /// Startup finished: fall into FAULT_STARTUP and greet the rider.
    fn engage_ready(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        self.reset_ride(inputs.pitch);
        self.phase = BalancePhase::FaultStartup;
        board.signals.set_forward_light(false);
        board.signals.set_brake_light(false);

        let cfg = &self.tuning.cfg;
        if cfg.deadzone > 0.0 {
            play_engage_tune(board.motor, board.signals, cfg.deadzone == 1.0);
        }

        // Ready beep, then one beep per volt the pack sits below LV + 5.
        board.signals.beep_on(true);
        board.signals.delay_ms(100);
        board.signals.beep_off(true);
        let mut threshold = cfg.tiltback_lv + 5.0;
        if inputs.input_voltage < threshold {
            board.signals.delay_ms(300);
            while inputs.input_voltage < threshold {
                board.signals.delay_ms(200);
                board.signals.beep_on(true);
                board.signals.delay_ms(300);
                board.signals.beep_off(true);
                threshold -= 1.0;
            }
        }
        tracing::info!(voltage = inputs.input_voltage, "startup complete, waiting for rider");
    }

    fn running_tick(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        self.inactivity_started = None;
        self.lock.cancel();

        if let Some(fault) = self.faults.check(
            self.tick,
            inputs,
            &self.tuning,
            self.director.mode,
            self.director.reverse_total_erpm(),
            false,
        ) {
            tracing::warn!(?fault, erpm = inputs.erpm, pitch = inputs.pitch, "fault");
            self.phase = fault;
            return;
        }

        let directive = self
            .director
            .classify(self.tick, inputs, &self.tuning, board.signals);
        if directive.entered_reverse {
            self.faults.arm_reverse(self.tick);
        }
        if directive.reset_integral {
            self.pid.reset_integral();
        }
        self.phase = directive.tiltback_phase.unwrap_or(BalancePhase::Running);

        self.director.interpolate(&self.tuning);
        let mut setpoint = self.director.interpolated;

        if self.director.mode.shaping_active() {
            // Nose bias and torque response stay active during tilt-backs;
            // turn tilt only in plain RUNNING.
            setpoint += self.nose.apply(inputs, &self.tuning, self.torque.interpolated);
            let feedback = LoopFeedback {
                proportional: self.pid.proportional,
                pid_value: self.pid.pid_value,
            };
            setpoint += self
                .torque
                .apply(inputs, &self.tuning, setpoint, &feedback, self.turn.cutback);
            let effect = self.turn.apply(
                inputs,
                &self.tuning,
                self.phase == BalancePhase::Running,
                self.nose.interpolated(),
                self.torque.target,
            );
            if effect.clear_yaw_aggregate {
                self.sampler.clear_yaw_aggregate();
            }
            setpoint += effect.offset;
        }
        self.setpoint = setpoint;

        let raw = self.pid.compute(
            inputs,
            &self.tuning,
            setpoint,
            self.director.mode,
            self.torque.interpolated,
            board.signals,
        );
        let limited = self.actuator.clamp(raw, &self.tuning, board.signals);
        // The smoother chases the value the motor actually got.
        self.pid.pid_value = limited;
        self.actuator.drive(limited, &self.tuning, board.motor);

        self.update_lights(board, inputs);
    }

    fn fault_tick(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        let cfg = &self.tuning.cfg;

        // A board charged in FAULT_STARTUP only nags once the pack nears
        // the low-voltage band.
        if self.phase != BalancePhase::FaultStartup
            || inputs.input_voltage < cfg.tiltback_lv + 2.0
        {
            let started = *self.inactivity_started.get_or_insert(self.tick);
            if self.inactivity_timeout_s > 0.0
                && self.tuning.ticks_to_s(self.tick - started) > self.inactivity_timeout_s
            {
                board.signals.beep_alert(3, false);
                // Nag again every ten seconds until someone shows up.
                self.inactivity_timeout_s = 10.0;
                self.inactivity_started = Some(self.tick);
            }
        }

        self.lock.update(self.tick, inputs, &self.tuning, board.signals);

        // Mount conditions: level board, pads pressed, not locked.
        if !self.lock.is_locked()
            && inputs.pitch.abs() < cfg.startup_pitch_tolerance
            && inputs.roll.abs() < cfg.startup_roll_tolerance
            && inputs.switch == SwitchState::On
        {
            self.reset_ride(inputs.pitch);
            return;
        }

        self.actuator
            .brake(self.tick, inputs.abs_erpm, &self.tuning, board.motor);
        board.signals.set_forward_light(false);
        board.signals.set_brake_light(false);
    }

    fn duty_fault_tick(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        // The duty fault must not clear itself the moment the motor rests,
        // or it would spool right back up. Only another fault (evaluated
        // with timers bypassed) may take over.
        if let Some(fault) = self.faults.check(
            self.tick,
            inputs,
            &self.tuning,
            self.director.mode,
            self.director.reverse_total_erpm(),
            true,
        ) {
            if fault != self.phase {
                tracing::info!(?fault, "duty fault reclassified");
            }
            self.phase = fault;
        }
        self.actuator
            .brake(self.tick, inputs.abs_erpm, &self.tuning, board.motor);
        board.signals.set_forward_light(false);
        board.signals.set_brake_light(false);
    }

    // ── Helpers ──

    /// Re-arm every component for a fresh ride and enter RUNNING.
    fn reset_ride(&mut self, pitch: f64) {
        self.pid.reset(&self.tuning);
        self.director.reset(pitch, self.tick);
        self.nose.reset();
        self.torque.reset();
        self.turn.reset();
        self.sampler.reset_ride();
        self.actuator.reset(&self.tuning);
        self.phase = BalancePhase::Running;
        self.setpoint = pitch;
        tracing::info!(pitch, "ride engaged");
    }

    fn update_lights(&mut self, board: &mut Board<'_>, inputs: &Inputs) {
        if inputs.abs_erpm > self.tuning.cfg.fault_adc_half_erpm {
            if self.pid.pid_value > -4.0 {
                board.signals.set_forward_light(true);
                board.signals.set_brake_light(false);
            } else {
                board.signals.set_forward_light(false);
                board.signals.set_brake_light(true);
            }
        } else {
            // Parked: aux mode 5 keeps courtesy lighting on.
            let courtesy = board.motor.configuration().aux_output_mode == 5;
            board.signals.set_forward_light(courtesy);
            board.signals.set_brake_light(courtesy);
        }
    }

    fn stream_debug(&mut self, board: &mut Board<'_>) {
        if let Some(field) = self.tap.sample_pending() {
            let value = self.debug_value(field);
            board.plot.print_value(value);
        }
        let experiments = *self.tap.experiments();
        let now_ms = self.tuning.ticks_to_ms(self.tick);
        for (graph, field) in experiments.iter().enumerate() {
            if *field != 0 {
                board.plot.plot_set_graph(graph);
                board.plot.plot_point(now_ms, self.debug_value(*field));
            }
        }
    }

    /// Value of one debug field (§ terminal commands).
    pub fn debug_value(&self, field: u8) -> f64 {
        match field {
            telemetry::FIELD_MOTOR_POSITION => self.last_inputs.motor_position,
            telemetry::FIELD_SETPOINT => self.setpoint,
            telemetry::FIELD_FILTERED_MOTOR_CURRENT => self.torque.filtered_current,
            telemetry::FIELD_DERIVATIVE => self.pid.derivative,
            telemetry::FIELD_PITCH_DELTA => self.last_inputs.last_pitch - self.last_inputs.pitch,
            telemetry::FIELD_MOTOR_CURRENT => self.last_inputs.motor_current,
            telemetry::FIELD_ERPM => self.last_inputs.erpm,
            telemetry::FIELD_ABS_ERPM => self.last_inputs.abs_erpm,
            telemetry::FIELD_LOOP_TIME => self.timing.loop_time_us,
            telemetry::FIELD_LOOP_DIFF_TIME => self.timing.diff_us,
            telemetry::FIELD_LOOP_OVERSHOOT => self.timing.overshoot_us,
            telemetry::FIELD_FILTERED_LOOP_OVERSHOOT => self.timing.filtered_overshoot_us,
            telemetry::FIELD_FILTERED_DIFF_TIME => self.timing.filtered_diff_us,
            _ => 0.0,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
