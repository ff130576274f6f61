//! Capability ports to the host hardware.
//!
//! The control unit never talks to hardware directly; it drives these thin
//! trait contracts. Production firmware backs them with the motor controller,
//! IMU and ADC drivers; tests and the demo binary back them with
//! [`crate::sim`]. The traits are deliberately minimal — they capture
//! exactly the calls the loop makes, nothing more.

// ─── Motor Controller ───────────────────────────────────────────────

/// Static limits and identity read from the motor controller configuration.
#[derive(Debug, Clone, Copy)]
pub struct MotorConfig {
    /// Most negative allowed motor current [A].
    pub current_min: f64,
    /// Most positive allowed motor current [A].
    pub current_max: f64,
    /// Motor direction is inverted.
    pub invert_direction: bool,
    /// Motor resistance/flux-linkage still at factory defaults — the motor
    /// was never detected and must not be ridden.
    pub factory_defaults: bool,
    /// FET temperature at which the controller begins throttling [°C].
    pub temp_fet_start: f64,
    /// Present switching frequency [Hz].
    pub switching_frequency: f64,
    /// Auxiliary output mode (drives the light policy).
    pub aux_output_mode: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            current_min: -60.0,
            current_max: 60.0,
            invert_direction: false,
            factory_defaults: false,
            temp_fet_start: 85.0,
            switching_frequency: 30_000.0,
            aux_output_mode: 0,
        }
    }
}

/// Motor controller capability set.
pub trait MotorPort {
    /// Signed electrical rpm.
    fn rpm(&self) -> f64;
    /// Signed duty cycle, −1..1.
    fn duty_now(&self) -> f64;
    /// Direction-filtered total motor current [A].
    fn total_current_directional_filtered(&self) -> f64;
    /// Low-pass-filtered signed erpm (for acceleration estimation).
    fn smooth_erpm(&self) -> f64;
    /// Filtered FET temperature [°C].
    fn temp_fet_filtered(&self) -> f64;
    /// Battery input voltage [V].
    fn input_voltage(&self) -> f64;
    /// Motor position [deg] (telemetry only).
    fn position(&self) -> f64;
    /// Current limits and identity.
    fn configuration(&self) -> MotorConfig;

    /// Request a motor current [A].
    fn set_current(&mut self, current: f64);
    /// Request a braking current [A].
    fn set_brake_current(&mut self, current: f64);
    /// Grace period before the controller zeroes an unrefreshed current [s].
    fn set_current_off_delay(&mut self, delay_s: f64);
    /// Change the switching frequency [Hz] (engage tune only).
    fn change_switching_frequency(&mut self, freq_hz: f64);
}

// ─── IMU ────────────────────────────────────────────────────────────

/// IMU capability set. Angles are radians; the loop converts to degrees.
pub trait ImuPort {
    fn pitch(&self) -> f64;
    fn roll(&self) -> f64;
    fn yaw(&self) -> f64;
    /// Angular rates [deg/s] into `out`.
    fn gyro(&self, out: &mut [f64; 3]);
    /// True once the startup filter has settled.
    fn startup_done(&self) -> bool;
}

// ─── Foot Pads ──────────────────────────────────────────────────────

/// Raw pad ADC front-end. Returns 12-bit counts; scaling to volts happens
/// in the input sampler.
pub trait PadPort {
    fn adc_raw(&self) -> (u16, u16);
}

// ─── Signals (buzzer, lights, persistence) ──────────────────────────

/// Outbound host signals: buzzer tokens, light tokens, lock persistence,
/// and the short blocking delays of the startup sequence.
///
/// Implementations own pattern timing; repeated `beep_alert` calls while an
/// alert is still playing are ignored.
pub trait SignalPort {
    /// Continuous beep on. `force` overrides an in-flight alert pattern.
    fn beep_on(&mut self, force: bool);
    /// Continuous beep off. `force` also cancels alert patterns.
    fn beep_off(&mut self, force: bool);
    /// Play `count` beeps, long or short.
    fn beep_alert(&mut self, count: u32, long: bool);

    fn set_forward_light(&mut self, on: bool);
    fn set_brake_light(&mut self, on: bool);

    /// Persist the ride-lock flag to durable storage.
    fn persist_lock(&mut self, locked: bool);

    /// Block for `ms` milliseconds (startup tune pacing only — never called
    /// from the steady-state loop body).
    fn delay_ms(&mut self, ms: u64);
}

// ─── Plot / Debug Sink ──────────────────────────────────────────────

/// Sink for the terminal debug commands: sampled values and the
/// six-graph experiment plot stream.
pub trait PlotSink {
    /// Print one sampled value.
    fn print_value(&mut self, value: f64);
    /// (Re)initialize the experiment plot.
    fn plot_init(&mut self, x_label: &str, title: &str);
    /// Add a named graph to the plot.
    fn plot_add_graph(&mut self, name: &str);
    /// Select the graph subsequent points go to.
    fn plot_set_graph(&mut self, graph: usize);
    /// Emit one data point on the selected graph.
    fn plot_point(&mut self, x: f64, y: f64);
}

// ─── Port Bundle ────────────────────────────────────────────────────

/// All ports the loop needs for one tick, borrowed together.
pub struct Board<'a> {
    pub motor: &'a mut dyn MotorPort,
    pub imu: &'a dyn ImuPort,
    pub pads: &'a dyn PadPort,
    pub signals: &'a mut dyn SignalPort,
    pub plot: &'a mut dyn PlotSink,
}

/// Anything that can lend out a full port bundle once per tick.
pub trait Rig {
    fn board(&mut self) -> Board<'_>;
}
