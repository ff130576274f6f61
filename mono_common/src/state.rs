//! Ride/fault state enums for the balance control unit.
//!
//! All enums use `#[repr(u8)]` so telemetry snapshots can carry them as raw
//! bytes. Discriminants are part of the telemetry wire contract and must not
//! be renumbered; existing dashboards key on them.

use serde::{Deserialize, Serialize};

// ─── Ride Phase ─────────────────────────────────────────────────────

/// Top-level phase of the ride supervisor.
///
/// Discriminant 5 is retired and must stay unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BalancePhase {
    /// Waiting for the IMU to settle and the motor config to be sane.
    Startup = 0,
    /// Balancing normally.
    Running = 1,
    /// Balancing with duty-cycle tilt-back active.
    RunningTiltbackDuty = 2,
    /// Balancing with high-voltage tilt-back active.
    RunningTiltbackHv = 3,
    /// Balancing with low-voltage tilt-back active.
    RunningTiltbackLv = 4,
    /// Pitch exceeded the fault angle.
    FaultAnglePitch = 6,
    /// Roll exceeded the fault angle.
    FaultAngleRoll = 7,
    /// Foot pad half-released at low speed.
    FaultSwitchHalf = 8,
    /// Foot pad fully released.
    FaultSwitchFull = 9,
    /// Duty cycle exceeded the fault threshold. Sticky: cleared only by
    /// another fault firing.
    FaultDuty = 10,
    /// Initial fault entered after startup completes; riding begins from here.
    FaultStartup = 11,
    /// Reverse-stop aborted the ride.
    FaultReverse = 12,
}

impl BalancePhase {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Startup),
            1 => Some(Self::Running),
            2 => Some(Self::RunningTiltbackDuty),
            3 => Some(Self::RunningTiltbackHv),
            4 => Some(Self::RunningTiltbackLv),
            6 => Some(Self::FaultAnglePitch),
            7 => Some(Self::FaultAngleRoll),
            8 => Some(Self::FaultSwitchHalf),
            9 => Some(Self::FaultSwitchFull),
            10 => Some(Self::FaultDuty),
            11 => Some(Self::FaultStartup),
            12 => Some(Self::FaultReverse),
            _ => None,
        }
    }

    /// True while the loop is actively driving the motor.
    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Running
                | Self::RunningTiltbackDuty
                | Self::RunningTiltbackHv
                | Self::RunningTiltbackLv
        )
    }

    /// True in any fault state (motor output restricted to braking).
    #[inline]
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::FaultAnglePitch
                | Self::FaultAngleRoll
                | Self::FaultSwitchHalf
                | Self::FaultSwitchFull
                | Self::FaultDuty
                | Self::FaultStartup
                | Self::FaultReverse
        )
    }
}

impl Default for BalancePhase {
    fn default() -> Self {
        Self::Startup
    }
}

// ─── Setpoint Adjustment Mode ───────────────────────────────────────

/// Which ramp the setpoint director is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetpointMode {
    /// Initial ramp from the engage pitch toward level.
    Centering = 0,
    /// Reverse-stop tilt accumulating against backwards riding.
    ReverseStop = 1,
    /// No tilt-back; target is level.
    TiltbackNone = 2,
    /// Duty-cycle tilt-back.
    TiltbackDuty = 3,
    /// High-voltage tilt-back.
    TiltbackHv = 4,
    /// Low-voltage tilt-back.
    TiltbackLv = 5,
}

impl SetpointMode {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Centering),
            1 => Some(Self::ReverseStop),
            2 => Some(Self::TiltbackNone),
            3 => Some(Self::TiltbackDuty),
            4 => Some(Self::TiltbackHv),
            5 => Some(Self::TiltbackLv),
            _ => None,
        }
    }

    /// True once the engage ramp is done and the nose/torque/turn shapers
    /// (and normal PID gain easing) are allowed to act.
    #[inline]
    pub const fn shaping_active(&self) -> bool {
        matches!(
            self,
            Self::TiltbackNone | Self::TiltbackDuty | Self::TiltbackHv | Self::TiltbackLv
        )
    }
}

impl Default for SetpointMode {
    fn default() -> Self {
        Self::Centering
    }
}

// ─── Switch State ───────────────────────────────────────────────────

/// Foot-pad switch state derived from the pad ADCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SwitchState {
    /// No pad pressed.
    Off = 0,
    /// Exactly one pad of a dual-pad setup pressed.
    Half = 1,
    /// All configured pads pressed (or no pads configured).
    On = 2,
}

impl SwitchState {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::Half),
            2 => Some(Self::On),
            _ => None,
        }
    }
}

impl Default for SwitchState {
    fn default() -> Self {
        Self::Off
    }
}

// ─── Packed Telemetry State ─────────────────────────────────────────

/// Pack phase, setpoint mode, and the cutback flag into the single state
/// byte streamed to dashboards: `phase + (mode << 4) + 128·cutback`.
#[inline]
pub const fn packed_state(phase: BalancePhase, mode: SetpointMode, cutback: bool) -> u8 {
    phase as u8 + ((mode as u8) << 4) + if cutback { 128 } else { 0 }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_phase_roundtrip() {
        for v in [0u8, 1, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12] {
            let phase = BalancePhase::from_u8(v).unwrap();
            assert_eq!(phase as u8, v);
        }
        assert!(BalancePhase::from_u8(5).is_none());
        assert!(BalancePhase::from_u8(13).is_none());
        assert!(BalancePhase::from_u8(255).is_none());
    }

    #[test]
    fn setpoint_mode_roundtrip() {
        for v in 0..=5u8 {
            let mode = SetpointMode::from_u8(v).unwrap();
            assert_eq!(mode as u8, v);
        }
        assert!(SetpointMode::from_u8(6).is_none());
    }

    #[test]
    fn switch_state_roundtrip() {
        for v in 0..=2u8 {
            let sw = SwitchState::from_u8(v).unwrap();
            assert_eq!(sw as u8, v);
        }
        assert!(SwitchState::from_u8(3).is_none());
    }

    #[test]
    fn phase_classification() {
        assert!(!BalancePhase::Startup.is_running());
        assert!(!BalancePhase::Startup.is_fault());
        assert!(BalancePhase::Running.is_running());
        assert!(BalancePhase::RunningTiltbackDuty.is_running());
        assert!(BalancePhase::RunningTiltbackHv.is_running());
        assert!(BalancePhase::RunningTiltbackLv.is_running());
        for fault in [
            BalancePhase::FaultAnglePitch,
            BalancePhase::FaultAngleRoll,
            BalancePhase::FaultSwitchHalf,
            BalancePhase::FaultSwitchFull,
            BalancePhase::FaultDuty,
            BalancePhase::FaultStartup,
            BalancePhase::FaultReverse,
        ] {
            assert!(fault.is_fault(), "{fault:?} should be a fault");
            assert!(!fault.is_running());
        }
    }

    #[test]
    fn shaping_active_excludes_centering_and_reversestop() {
        assert!(!SetpointMode::Centering.shaping_active());
        assert!(!SetpointMode::ReverseStop.shaping_active());
        assert!(SetpointMode::TiltbackNone.shaping_active());
        assert!(SetpointMode::TiltbackDuty.shaping_active());
        assert!(SetpointMode::TiltbackHv.shaping_active());
        assert!(SetpointMode::TiltbackLv.shaping_active());
    }

    #[test]
    fn packed_state_layout() {
        let v = packed_state(BalancePhase::Running, SetpointMode::TiltbackNone, false);
        assert_eq!(v, 1 + (2 << 4));
        let v = packed_state(BalancePhase::Running, SetpointMode::TiltbackDuty, true);
        assert_eq!(v, 1 + (3 << 4) + 128);
        let v = packed_state(BalancePhase::FaultStartup, SetpointMode::Centering, false);
        assert_eq!(v, 11);
    }
}
