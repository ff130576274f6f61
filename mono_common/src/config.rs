//! Balance controller configuration schema.
//!
//! The wire schema keeps the historical field names, including the fields
//! whose meaning was repurposed over the product's life (noted per field).
//! Decoding those aliases into named tuning parameters happens once, in the
//! control unit's derivation step — never here. This keeps stored
//! configurations loadable bit-for-bit across firmware generations.
//!
//! Loading is TOML via serde; validation rejects only values the derivation
//! step cannot clamp into a safe range (zero/negative loop rate, inverted
//! ADC thresholds). Everything else is clamped downstream.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::V_REG;

// ─── Error Type ─────────────────────────────────────────────────────

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

// ─── Inactivity Shutdown ────────────────────────────────────────────

/// How long the board may sit in a fault state before nagging the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ShutdownMode {
    /// Never nag.
    #[default]
    #[serde(rename = "off")]
    Off,
    #[serde(rename = "off_after_10s")]
    OffAfter10s,
    #[serde(rename = "off_after_1m")]
    OffAfter1m,
    #[serde(rename = "off_after_5m")]
    OffAfter5m,
    #[serde(rename = "off_after_10m")]
    OffAfter10m,
    #[serde(rename = "off_after_30m")]
    OffAfter30m,
    #[serde(rename = "off_after_1h")]
    OffAfter1h,
    #[serde(rename = "off_after_5h")]
    OffAfter5h,
}

impl ShutdownMode {
    /// Inactivity timeout in seconds; 0 disables the nag.
    #[inline]
    pub const fn timeout_s(&self) -> f64 {
        match self {
            Self::Off => 0.0,
            Self::OffAfter10s => 10.0,
            Self::OffAfter1m => 60.0,
            Self::OffAfter5m => 60.0 * 5.0,
            Self::OffAfter10m => 60.0 * 10.0,
            Self::OffAfter30m => 60.0 * 30.0,
            Self::OffAfter1h => 60.0 * 60.0,
            Self::OffAfter5h => 60.0 * 60.0 * 5.0,
        }
    }
}

// ─── Radio (pairing) Block ──────────────────────────────────────────

/// Pairing-radio block. The balance app never talks to the radio; the block
/// doubles as overflow parameter storage:
///
/// - `channel == 99` permits persisting the lock flag,
/// - `retry_delay_us == 3750 && retries == 13` arms the boost-threshold
///   override carried in `address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub channel: u8,
    pub retry_delay_us: u32,
    pub retries: u8,
    pub address: [u8; 3],
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            retry_delay_us: 250,
            retries: 3,
            address: [0xc6, 0xc5, 0x0],
        }
    }
}

impl RadioConfig {
    /// True when the boost-threshold override in `address` is armed.
    #[inline]
    pub fn boost_override_armed(&self) -> bool {
        self.retry_delay_us == 3750 && self.retries == 13
    }
}

// ─── Balance Configuration ──────────────────────────────────────────

/// Complete tunable set for one board, immutable during a ride.
///
/// Delays are milliseconds, speeds are degrees per second, angles degrees,
/// currents amps, erpm thresholds electrical rpm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Control loop rate [Hz].
    pub hertz: f64,
    /// Cutoff for the loop-overshoot EMA [Hz]; 0 disables sleep correction.
    pub loop_time_filter: f64,

    // ── Fault thresholds & debounce delays ──
    pub fault_pitch: f64,
    pub fault_roll: f64,
    pub fault_duty: f64,
    /// Pad 1 press threshold [V]; 0 disables the pad.
    pub fault_adc1: f64,
    /// Pad 2 press threshold [V]; 0 disables the pad.
    pub fault_adc2: f64,
    pub fault_delay_pitch: f64,
    pub fault_delay_roll: f64,
    pub fault_delay_duty: f64,
    pub fault_delay_switch_half: f64,
    /// Full-switch debounce [ms]. A value ending in 1 (mod 10) forbids
    /// high-speed full-switch faults.
    pub fault_delay_switch_full: f64,
    /// Speed below which a half-pressed switch counts as a fault [erpm].
    pub fault_adc_half_erpm: f64,

    // ── Tilt-back ──
    pub tiltback_duty_angle: f64,
    pub tiltback_duty_speed: f64,
    pub tiltback_duty: f64,
    pub tiltback_hv_angle: f64,
    pub tiltback_hv_speed: f64,
    pub tiltback_hv: f64,
    pub tiltback_lv_angle: f64,
    pub tiltback_lv_speed: f64,
    pub tiltback_lv: f64,
    pub tiltback_return_speed: f64,
    pub tiltback_constant: f64,
    pub tiltback_constant_erpm: f64,
    /// Variable nose bias per 1000 erpm [deg].
    pub tiltback_variable: f64,
    pub tiltback_variable_max: f64,
    pub noseangling_speed: f64,

    // ── Startup ──
    pub startup_pitch_tolerance: f64,
    pub startup_roll_tolerance: f64,
    /// Engage ramp speed [deg/s]. The fractional part selects features:
    /// .1 reverse-stop, .2 stealth start, .3 both. Values below 10 enable
    /// soft start.
    pub startup_speed: f64,
    /// Engage tune selector: 0 none, 1 full tune with switching-frequency
    /// changes, anything else a single wiggle.
    pub deadzone: f64,

    // ── PID ──
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// D-term PT1 cutoff [Hz], clamped to 1..30, default 10.
    pub kd_pt1_lowpass_frequency: f64,
    /// Repurposed: lingering brake nose-lift ratio, mapped `(21 − v) / 4`.
    pub kd_pt1_highpass_frequency: f64,
    /// Repurposed: integral torque-tilt impact downhill, `1 − v/100`.
    pub kd_biquad_lowpass: f64,
    /// Repurposed: integral torque-tilt impact uphill, `1 − v/100`.
    pub kd_biquad_highpass: f64,
    /// Repurposed: center boost angle [deg].
    pub booster_angle: f64,
    /// Repurposed: center boost kp adder (scaled against configured kp).
    pub booster_ramp: f64,
    /// Repurposed: torque-tilt PID stiffening intensity.
    pub booster_current: f64,

    // ── Adaptive torque response ──
    pub torquetilt_start_current: f64,
    pub torquetilt_angle_limit: f64,
    pub torquetilt_on_speed: f64,
    pub torquetilt_off_speed: f64,
    pub torquetilt_strength: f64,
    /// Motor-current low-pass cutoff [Hz], clamped to 5..30.
    pub torquetilt_filter: f64,

    // ── Turn tilt ──
    pub turntilt_strength: f64,
    pub turntilt_angle_limit: f64,
    pub turntilt_start_angle: f64,
    pub turntilt_start_erpm: f64,
    pub turntilt_speed: f64,
    pub turntilt_erpm_boost: f64,
    pub turntilt_erpm_boost_end: f64,

    // ── Repurposed yaw/roll steering slots ──
    /// Repurposed: downhill torque-tilt strength multiplier [%].
    pub yaw_kp: f64,
    /// Repurposed: aggregate yaw-change target for the turn boost.
    pub yaw_ki: f64,
    /// Repurposed: current→acceleration factor (second factor is 1.3×).
    pub yaw_kd: f64,
    /// Repurposed: center jerk strength [A].
    pub yaw_current_clamp: f64,
    /// Repurposed: integer part is max brake amps, fractional ×100 is the
    /// derivative clamp.
    pub roll_steer_kp: f64,
    /// Repurposed: center jerk duration [ms].
    pub roll_steer_erpm_kp: f64,

    // ── Braking & shutdown ──
    /// Brake current [A]. The fractional part ×100 doubles as the engage
    /// click current.
    pub brake_current: f64,
    /// Brake timeout [s]; 0 disables.
    pub brake_timeout: f64,
    pub shutdown_mode: ShutdownMode,

    /// Repurposed: persisted ride-lock flag.
    pub multi_esc: bool,

    pub radio: RadioConfig,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            hertz: 1000.0,
            loop_time_filter: 3.0,
            fault_pitch: 20.0,
            fault_roll: 45.0,
            fault_duty: 0.95,
            fault_adc1: 2.0,
            fault_adc2: 2.0,
            fault_delay_pitch: 250.0,
            fault_delay_roll: 250.0,
            fault_delay_duty: 500.0,
            fault_delay_switch_half: 250.0,
            fault_delay_switch_full: 250.0,
            fault_adc_half_erpm: 1000.0,
            tiltback_duty_angle: 6.0,
            tiltback_duty_speed: 3.0,
            tiltback_duty: 0.9,
            tiltback_hv_angle: 6.0,
            tiltback_hv_speed: 3.0,
            tiltback_hv: 91.0,
            tiltback_lv_angle: 6.0,
            tiltback_lv_speed: 3.0,
            tiltback_lv: 60.0,
            tiltback_return_speed: 5.0,
            tiltback_constant: 0.0,
            tiltback_constant_erpm: 500.0,
            tiltback_variable: 0.0,
            tiltback_variable_max: 1.0,
            noseangling_speed: 5.0,
            startup_pitch_tolerance: 5.0,
            startup_roll_tolerance: 8.0,
            startup_speed: 5.0,
            deadzone: 0.0,
            kp: 6.0,
            ki: 0.005,
            kd: 1200.0,
            kd_pt1_lowpass_frequency: 10.0,
            kd_pt1_highpass_frequency: 9.0,
            kd_biquad_lowpass: 70.0,
            kd_biquad_highpass: 50.0,
            booster_angle: 1.0,
            booster_ramp: 4.0,
            booster_current: 1.0,
            torquetilt_start_current: 15.0,
            torquetilt_angle_limit: 8.0,
            torquetilt_on_speed: 5.0,
            torquetilt_off_speed: 3.0,
            torquetilt_strength: 0.15,
            torquetilt_filter: 5.0,
            turntilt_strength: 4.0,
            turntilt_angle_limit: 3.0,
            turntilt_start_angle: 2.0,
            turntilt_start_erpm: 500.0,
            turntilt_speed: 3.0,
            turntilt_erpm_boost: 100.0,
            turntilt_erpm_boost_end: 5000.0,
            yaw_kp: 50.0,
            yaw_ki: 1.5,
            yaw_kd: 55.0,
            yaw_current_clamp: 0.0,
            roll_steer_kp: 30.25,
            roll_steer_erpm_kp: 0.0,
            brake_current: 6.1,
            brake_timeout: 0.0,
            shutdown_mode: ShutdownMode::Off,
            multi_esc: false,
            radio: RadioConfig::default(),
        }
    }
}

impl BalanceConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the values the derivation step cannot clamp away.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hertz > 0.0) || self.hertz > 5000.0 {
            return Err(ConfigError::ValidationError(format!(
                "hertz {} out of range (0, 5000]",
                self.hertz
            )));
        }
        for (name, v) in [
            ("fault_adc1", self.fault_adc1),
            ("fault_adc2", self.fault_adc2),
        ] {
            if !(0.0..=V_REG).contains(&v) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} {v} out of range [0, {V_REG}]"
                )));
            }
        }
        for (name, v) in [
            ("fault_delay_pitch", self.fault_delay_pitch),
            ("fault_delay_roll", self.fault_delay_roll),
            ("fault_delay_duty", self.fault_delay_duty),
            ("fault_delay_switch_half", self.fault_delay_switch_half),
            ("fault_delay_switch_full", self.fault_delay_switch_full),
            ("brake_timeout", self.brake_timeout),
        ] {
            if v < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        BalanceConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_minimal_toml() {
        let config = BalanceConfig::from_toml("hertz = 832.0\nkp = 4.5\n").unwrap();
        assert_eq!(config.hertz, 832.0);
        assert_eq!(config.kp, 4.5);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.fault_duty, 0.95);
    }

    #[test]
    fn parse_radio_block() {
        let config = BalanceConfig::from_toml(
            r#"
[radio]
channel = 99
retry_delay_us = 3750
retries = 13
address = [8, 14, 5]
"#,
        )
        .unwrap();
        assert_eq!(config.radio.channel, 99);
        assert!(config.radio.boost_override_armed());
        assert_eq!(config.radio.address, [8, 14, 5]);
    }

    #[test]
    fn boost_override_requires_both_markers() {
        let mut radio = RadioConfig {
            retry_delay_us: 3750,
            retries: 13,
            ..RadioConfig::default()
        };
        assert!(radio.boost_override_armed());
        radio.retries = 12;
        assert!(!radio.boost_override_armed());
        radio.retries = 13;
        radio.retry_delay_us = 250;
        assert!(!radio.boost_override_armed());
    }

    #[test]
    fn reject_zero_hertz() {
        let err = BalanceConfig::from_toml("hertz = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("hertz"));
    }

    #[test]
    fn reject_negative_delay() {
        let err = BalanceConfig::from_toml("fault_delay_pitch = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("fault_delay_pitch"));
    }

    #[test]
    fn reject_pad_threshold_above_vreg() {
        let err = BalanceConfig::from_toml("fault_adc1 = 4.2\n").unwrap_err();
        assert!(err.to_string().contains("fault_adc1"));
    }

    #[test]
    fn reject_malformed_toml() {
        assert!(BalanceConfig::from_toml("this is not toml @@@").is_err());
    }

    #[test]
    fn shutdown_mode_timeouts() {
        assert_eq!(ShutdownMode::Off.timeout_s(), 0.0);
        assert_eq!(ShutdownMode::OffAfter10s.timeout_s(), 10.0);
        assert_eq!(ShutdownMode::OffAfter5m.timeout_s(), 300.0);
        assert_eq!(ShutdownMode::OffAfter5h.timeout_s(), 18_000.0);
    }

    #[test]
    fn shutdown_mode_snake_case_wire_names() {
        let config = BalanceConfig::from_toml("shutdown_mode = \"off_after_10m\"\n").unwrap();
        assert_eq!(config.shutdown_mode, ShutdownMode::OffAfter10m);
    }
}
