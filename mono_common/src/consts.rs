//! Constants shared between the configuration layer and the control unit.

/// ADC reference voltage for the foot-pad front end [V].
pub const V_REG: f64 = 3.3;

/// Full-scale count of the 12-bit pad ADC.
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// Length of the acceleration averaging window [samples].
pub const ACCEL_WINDOW: usize = 40;

/// Grace period spent in CENTERING after the setpoint ramp completes [ms].
pub const START_GRACE_PERIOD_MS: f64 = 100.0;

/// Duration of the stiff-center ease-in after engaging [ms].
pub const START_CENTER_DELAY_MS: f64 = 1000.0;

/// Aggregate erpm a rider may roll backwards before reverse-stop tilts in.
pub const REVERSE_TOLERANCE_ERPM: f64 = 50_000.0;

/// Magic radio channel that permits persisting the lock flag.
pub const LOCK_PERSIST_CHANNEL: u8 = 99;
