//! Fixed-rate loop runner: pacing, overshoot correction, RT setup.
//!
//! One tick = read → decide → write, then sleep for
//! `loop_period − filtered_overshoot` so the average wall-time period
//! equals the configured period; the overshoot is EMA-filtered with the
//! coefficient derived at configure time. A termination flag is checked at
//! the top of every iteration; on exit the supervisor silences the buzzer
//! and routes the motor to braking.
//!
//! ## RT Setup (feature `rt`, Linux)
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to an isolated core.
//! 4. `sched_setscheduler(SCHED_FIFO)` — RT priority.
//!
//! Without the feature the loop paces itself with `std::thread::sleep`,
//! which is plenty for simulation and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::ports::Rig;
use crate::supervisor::Supervisor;
use crate::tuning::Tuning;

// ─── Loop timing telemetry ──────────────────────────────────────────

/// Per-tick timing values surfaced through the debug fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopTiming {
    /// Configured loop period [µs].
    pub loop_time_us: f64,
    /// Measured time since the previous tick [µs].
    pub diff_us: f64,
    /// This tick's overshoot past the corrected period [µs].
    pub overshoot_us: f64,
    /// EMA-filtered overshoot [µs] (subtracted from the sleep).
    pub filtered_overshoot_us: f64,
    /// EMA-filtered tick period [µs] (metric only).
    pub filtered_diff_us: f64,
}

// ─── Cycle statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics. Updated every tick, no allocation.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub tick_count: u64,
    /// Last tick body duration [ns].
    pub last_tick_ns: i64,
    /// Minimum tick body duration [ns].
    pub min_tick_ns: i64,
    /// Maximum tick body duration [ns].
    pub max_tick_ns: i64,
    /// Running sum for average computation.
    pub sum_tick_ns: i64,
    /// Ticks whose body ran past the loop period.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
        }
    }

    #[inline]
    fn record(&mut self, duration_ns: i64, budget_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns < self.min_tick_ns {
            self.min_tick_ns = duration_ns;
        }
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        self.sum_tick_ns += duration_ns;
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average tick body duration [ns] (0 before the first tick).
    #[inline]
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup.
#[derive(Debug)]
pub enum CycleError {
    /// RT system call failed.
    RtSetup(String),
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
        }
    }
}

impl std::error::Error for CycleError {}

// ─── RT setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{mlockall, MlockallFlags};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch a chunk of stack to force page allocation before the loop starts.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xff) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;
    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup sequence. No-ops without the `rt` feature.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Runner ─────────────────────────────────────────────────────────

/// Owns the pacing state of the loop; the supervisor owns everything else.
pub struct CycleRunner {
    loop_time_us: f64,
    overshoot_alpha: f64,
    filtered_overshoot_us: f64,
    filtered_diff_us: f64,
    stats: CycleStats,
}

impl CycleRunner {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            loop_time_us: 1_000_000.0 / tuning.cfg.hertz,
            overshoot_alpha: tuning.loop_overshoot_alpha,
            filtered_overshoot_us: 0.0,
            filtered_diff_us: 0.0,
            stats: CycleStats::new(),
        }
    }

    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Drive the loop until `shutdown` is raised or `max_ticks` elapse.
    ///
    /// Returns the accumulated cycle statistics. The terminal sleep is the
    /// configured period minus the filtered overshoot, never a busy-wait.
    pub fn run<R: Rig>(
        &mut self,
        supervisor: &mut Supervisor,
        rig: &mut R,
        shutdown: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> CycleStats {
        let budget_ns = (self.loop_time_us * 1000.0) as i64;
        let mut last_wake: Option<Instant> = None;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if let Some(max) = max_ticks {
                if self.stats.tick_count >= max {
                    break;
                }
            }

            let wake = Instant::now();
            let diff_us = match last_wake {
                Some(prev) => wake.duration_since(prev).as_secs_f64() * 1e6,
                None => self.loop_time_us,
            };
            last_wake = Some(wake);
            self.filtered_diff_us = 0.03 * diff_us + 0.97 * self.filtered_diff_us;

            let mut overshoot_us = 0.0;
            if self.overshoot_alpha > 0.0 {
                overshoot_us =
                    diff_us - (self.loop_time_us - self.filtered_overshoot_us.round());
                self.filtered_overshoot_us = self.overshoot_alpha * overshoot_us
                    + (1.0 - self.overshoot_alpha) * self.filtered_overshoot_us;
            }

            supervisor.timing = LoopTiming {
                loop_time_us: self.loop_time_us,
                diff_us,
                overshoot_us,
                filtered_overshoot_us: self.filtered_overshoot_us,
                filtered_diff_us: self.filtered_diff_us,
            };

            let body_start = Instant::now();
            {
                let mut board = rig.board();
                supervisor.tick(&mut board);
            }
            let body_ns = body_start.elapsed().as_nanos() as i64;
            self.stats.record(body_ns, budget_ns);

            let sleep_us = (self.loop_time_us - self.filtered_overshoot_us.round() - body_ns as f64 / 1000.0)
                .max(0.0);
            if sleep_us > 0.0 {
                std::thread::sleep(std::time::Duration::from_micros(sleep_us as u64));
            }
        }

        let mut board = rig.board();
        supervisor.shutdown(&mut board);
        tracing::info!(
            ticks = self.stats.tick_count,
            overruns = self.stats.overruns,
            avg_ns = self.stats.avg_tick_ns(),
            "loop stopped"
        );
        self.stats.clone()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MotorConfig;
    use crate::sim::SimRig;
    use mono_common::config::BalanceConfig;

    fn fast_tuning() -> Tuning {
        let mut cfg = BalanceConfig::default();
        cfg.hertz = 5000.0; // keep the test quick
        Tuning::derive(cfg, &MotorConfig::default())
    }

    #[test]
    fn cycle_stats_basics() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.avg_tick_ns(), 0);
        stats.record(500, 1000);
        stats.record(1500, 1000);
        assert_eq!(stats.tick_count, 2);
        assert_eq!(stats.min_tick_ns, 500);
        assert_eq!(stats.max_tick_ns, 1500);
        assert_eq!(stats.avg_tick_ns(), 1000);
        assert_eq!(stats.overruns, 1);
    }

    #[test]
    fn runner_honors_max_ticks() {
        let tuning = fast_tuning();
        let mut supervisor = Supervisor::new(tuning.clone());
        let mut runner = CycleRunner::new(&tuning);
        let mut rig = SimRig::ready();
        let shutdown = AtomicBool::new(false);
        let stats = runner.run(&mut supervisor, &mut rig, &shutdown, Some(50));
        assert_eq!(stats.tick_count, 50);
        assert_eq!(supervisor.current_tick(), 50);
    }

    #[test]
    fn runner_stops_on_shutdown_flag() {
        let tuning = fast_tuning();
        let mut supervisor = Supervisor::new(tuning.clone());
        let mut runner = CycleRunner::new(&tuning);
        let mut rig = SimRig::ready();
        let shutdown = AtomicBool::new(true);
        let stats = runner.run(&mut supervisor, &mut rig, &shutdown, None);
        assert_eq!(stats.tick_count, 0);
        // Exit path forced the buzzer off and braked.
        assert!(rig.signals.beep_off_calls > 0);
        assert!(rig.motor.last_was_brake());
    }

    #[test]
    fn rt_setup_is_noop_without_feature() {
        #[cfg(not(feature = "rt"))]
        rt_setup(0, 80).unwrap();
    }

    #[test]
    fn timing_surfaced_to_supervisor() {
        let tuning = fast_tuning();
        let mut supervisor = Supervisor::new(tuning.clone());
        let mut runner = CycleRunner::new(&tuning);
        let mut rig = SimRig::ready();
        let shutdown = AtomicBool::new(false);
        runner.run(&mut supervisor, &mut rig, &shutdown, Some(5));
        assert_eq!(supervisor.timing.loop_time_us, 200.0);
        assert!(supervisor.timing.diff_us > 0.0);
    }
}
