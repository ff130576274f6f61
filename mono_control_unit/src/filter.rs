//! Signal conditioning filters.
//!
//! Second-order biquad (low-pass / high-pass, fixed Q = 0.5 for maximum
//! smoothness) and a first-order PT1 pole. Both operate on normalized
//! cutoffs so the loop rate is baked in at configuration time.

use std::f64::consts::PI;

// ─── Biquad (2nd-order, transposed direct form II) ──────────────────

/// Biquad filter kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    Lowpass,
    Highpass,
}

/// Second-order filter with precomputed coefficients and two state taps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Biquad {
    a0: f64,
    a1: f64,
    a2: f64,
    b1: f64,
    b2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    /// Build a biquad for the given kind and normalized cutoff
    /// (`fc = cutoff_hz / sample_rate_hz`).
    pub fn new(kind: BiquadKind, fc: f64) -> Self {
        let k = (PI * fc).tan();
        let q = 0.5;
        let norm = 1.0 / (1.0 + k / q + k * k);
        let (a0, a1) = match kind {
            BiquadKind::Lowpass => {
                let a0 = k * k * norm;
                (a0, 2.0 * a0)
            }
            BiquadKind::Highpass => {
                let a0 = norm;
                (a0, -2.0 * a0)
            }
        };
        Self {
            a0,
            a1,
            a2: a0,
            b1: 2.0 * (k * k - 1.0) * norm,
            b2: (1.0 - k / q + k * k) * norm,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Run one sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let out = input * self.a0 + self.z1;
        self.z1 = input * self.a1 + self.z2 - self.b1 * out;
        self.z2 = input * self.a2 - self.b2 * out;
        out
    }

    /// Zero the state taps, keeping coefficients.
    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

// ─── PT1 (1st-order pole) ───────────────────────────────────────────

/// First-order low-pass: `y += k · (x − y)` with `k = dt / (RC + dt)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pt1 {
    k: f64,
    state: f64,
}

impl Pt1 {
    /// Build from a cutoff frequency [Hz] and a sample rate [Hz].
    pub fn from_cutoff(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let dt = 1.0 / sample_rate_hz;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        Self {
            k: dt / (rc + dt),
            state: 0.0,
        }
    }

    /// Run one sample through the pole.
    #[inline]
    pub fn apply(&mut self, input: f64) -> f64 {
        self.state += self.k * (input - self.state);
        self.state
    }

    /// Current filter output.
    #[inline]
    pub fn state(&self) -> f64 {
        self.state
    }

    #[inline]
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
