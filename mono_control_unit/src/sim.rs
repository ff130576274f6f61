//! Simulated rig: motor, IMU, pads, signals and plot sink backed by plain
//! fields. The demo binary rides it with a toy physics model; tests script
//! it directly and inspect the recorded commands.

use mono_common::consts::{ADC_FULL_SCALE, V_REG};

use crate::ports::{Board, ImuPort, MotorConfig, MotorPort, PadPort, PlotSink, Rig, SignalPort};

/// Raw pad count that reads as the given voltage.
pub fn raw_for_volts(volts: f64) -> u16 {
    (volts / V_REG * ADC_FULL_SCALE).round() as u16
}

// ─── Motor ──────────────────────────────────────────────────────────

/// One motor write, in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    Current(f64),
    Brake(f64),
}

#[derive(Debug, Clone)]
pub struct SimMotor {
    pub erpm: f64,
    pub duty: f64,
    pub current: f64,
    pub smooth_erpm: f64,
    pub temp_fet: f64,
    pub voltage: f64,
    pub position: f64,
    pub config: MotorConfig,
    pub current_off_delay: f64,
    pub commands: Vec<MotorCommand>,
    pub sw_freq_changes: Vec<f64>,
}

impl Default for SimMotor {
    fn default() -> Self {
        Self {
            erpm: 0.0,
            duty: 0.0,
            current: 0.0,
            smooth_erpm: 0.0,
            temp_fet: 40.0,
            voltage: 80.0,
            position: 0.0,
            config: MotorConfig::default(),
            current_off_delay: 0.0,
            commands: Vec::new(),
            sw_freq_changes: Vec::new(),
        }
    }
}

impl SimMotor {
    /// Last commanded drive current, if the last command was a drive.
    pub fn last_current(&self) -> Option<f64> {
        match self.commands.last() {
            Some(MotorCommand::Current(a)) => Some(*a),
            _ => None,
        }
    }

    /// True when the most recent command was a brake.
    pub fn last_was_brake(&self) -> bool {
        matches!(self.commands.last(), Some(MotorCommand::Brake(_)))
    }
}

impl MotorPort for SimMotor {
    fn rpm(&self) -> f64 {
        self.erpm
    }
    fn duty_now(&self) -> f64 {
        self.duty
    }
    fn total_current_directional_filtered(&self) -> f64 {
        self.current
    }
    fn smooth_erpm(&self) -> f64 {
        self.smooth_erpm
    }
    fn temp_fet_filtered(&self) -> f64 {
        self.temp_fet
    }
    fn input_voltage(&self) -> f64 {
        self.voltage
    }
    fn position(&self) -> f64 {
        self.position
    }
    fn configuration(&self) -> MotorConfig {
        self.config
    }
    fn set_current(&mut self, current: f64) {
        self.commands.push(MotorCommand::Current(current));
    }
    fn set_brake_current(&mut self, current: f64) {
        self.commands.push(MotorCommand::Brake(current));
    }
    fn set_current_off_delay(&mut self, delay_s: f64) {
        self.current_off_delay = delay_s;
    }
    fn change_switching_frequency(&mut self, freq_hz: f64) {
        self.sw_freq_changes.push(freq_hz);
    }
}

// ─── IMU ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SimImu {
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub yaw_deg: f64,
    pub gyro: [f64; 3],
    pub ready: bool,
}

impl ImuPort for SimImu {
    fn pitch(&self) -> f64 {
        self.pitch_deg.to_radians()
    }
    fn roll(&self) -> f64 {
        self.roll_deg.to_radians()
    }
    fn yaw(&self) -> f64 {
        self.yaw_deg.to_radians()
    }
    fn gyro(&self, out: &mut [f64; 3]) {
        *out = self.gyro;
    }
    fn startup_done(&self) -> bool {
        self.ready
    }
}

// ─── Pads ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SimPads {
    pub adc1_raw: u16,
    pub adc2_raw: u16,
}

impl SimPads {
    pub fn press_both(&mut self) {
        self.adc1_raw = raw_for_volts(2.5);
        self.adc2_raw = raw_for_volts(2.5);
    }
    pub fn release_both(&mut self) {
        self.adc1_raw = 0;
        self.adc2_raw = 0;
    }
    pub fn press_one(&mut self) {
        self.adc1_raw = raw_for_volts(2.5);
        self.adc2_raw = 0;
    }
}

impl PadPort for SimPads {
    fn adc_raw(&self) -> (u16, u16) {
        (self.adc1_raw, self.adc2_raw)
    }
}

// ─── Signals ────────────────────────────────────────────────────────

/// Records every outbound signal token for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingSignals {
    pub beep_on_calls: u32,
    pub beep_off_calls: u32,
    pub beeping: bool,
    /// `(count, long)` per alert request.
    pub alerts: Vec<(u32, bool)>,
    pub forward_light: bool,
    pub brake_light: bool,
    /// Lock values handed to the persistence callback, in order.
    pub persisted: Vec<bool>,
    pub delays: Vec<u64>,
}

impl SignalPort for RecordingSignals {
    fn beep_on(&mut self, _force: bool) {
        self.beep_on_calls += 1;
        self.beeping = true;
    }
    fn beep_off(&mut self, _force: bool) {
        self.beep_off_calls += 1;
        self.beeping = false;
    }
    fn beep_alert(&mut self, count: u32, long: bool) {
        self.alerts.push((count, long));
    }
    fn set_forward_light(&mut self, on: bool) {
        self.forward_light = on;
    }
    fn set_brake_light(&mut self, on: bool) {
        self.brake_light = on;
    }
    fn persist_lock(&mut self, locked: bool) {
        self.persisted.push(locked);
    }
    fn delay_ms(&mut self, ms: u64) {
        self.delays.push(ms);
    }
}

// ─── Plot sink ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RecordingPlot {
    pub printed: Vec<f64>,
    pub graphs: Vec<String>,
    pub selected: usize,
    /// `(graph, x, y)` per streamed point.
    pub points: Vec<(usize, f64, f64)>,
    pub inits: u32,
}

impl PlotSink for RecordingPlot {
    fn print_value(&mut self, value: f64) {
        self.printed.push(value);
    }
    fn plot_init(&mut self, _x_label: &str, _title: &str) {
        self.inits += 1;
        self.graphs.clear();
    }
    fn plot_add_graph(&mut self, name: &str) {
        self.graphs.push(name.to_string());
    }
    fn plot_set_graph(&mut self, graph: usize) {
        self.selected = graph;
    }
    fn plot_point(&mut self, x: f64, y: f64) {
        self.points.push((self.selected, x, y));
    }
}

// ─── Rig ────────────────────────────────────────────────────────────

/// Complete simulated board.
#[derive(Debug, Clone, Default)]
pub struct SimRig {
    pub motor: SimMotor,
    pub imu: SimImu,
    pub pads: SimPads,
    pub signals: RecordingSignals,
    pub plot: RecordingPlot,
    /// Advance the toy physics model on every [`SimRig::board`] call.
    pub auto_physics: bool,
}

impl SimRig {
    /// A rig ready to ride: IMU settled, pads pressed, healthy pack.
    pub fn ready() -> Self {
        let mut rig = Self::default();
        rig.imu.ready = true;
        rig.pads.press_both();
        rig
    }

    /// Borrow all ports for one tick.
    pub fn board(&mut self) -> Board<'_> {
        if self.auto_physics {
            self.step_physics();
        }
        Board {
            motor: &mut self.motor,
            imu: &self.imu,
            pads: &self.pads,
            signals: &mut self.signals,
            plot: &mut self.plot,
        }
    }

    /// Crude single-tick plant model for the demo ride: commanded current
    /// accelerates the wheel and rights the board.
    fn step_physics(&mut self) {
        if let Some(current) = self.motor.last_current() {
            self.motor.current = self.motor.current * 0.9 + current * 0.1;
        }
        self.motor.erpm += self.motor.current * 1.5;
        self.motor.erpm *= 0.999;
        self.motor.smooth_erpm = self.motor.smooth_erpm * 0.95 + self.motor.erpm * 0.05;
        self.motor.duty = (self.motor.erpm / 20_000.0).clamp(-0.95, 0.95);
        // Torque rights the board; a touch of damping keeps it stable.
        self.imu.pitch_deg -= self.motor.current * 0.002;
        self.imu.pitch_deg *= 0.999;
    }
}

impl Rig for SimRig {
    fn board(&mut self) -> Board<'_> {
        SimRig::board(self)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
