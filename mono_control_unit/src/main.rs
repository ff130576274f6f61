//! # Mono Control Unit
//!
//! Loads a balance configuration, builds the simulated rig, and rides it
//! for a fixed number of ticks. On hardware the same supervisor and cycle
//! runner are driven with real ports instead of [`mono_control_unit::sim`].

use std::path::PathBuf;
use std::process;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing::{error, info};

use mono_common::config::BalanceConfig;
use mono_control_unit::cycle::{rt_setup, CycleRunner};
use mono_control_unit::sim::SimRig;
use mono_control_unit::supervisor::Supervisor;
use mono_control_unit::tuning::Tuning;

#[derive(Debug, Parser)]
#[command(name = "mono_control_unit", about = "Self-balancing board control unit")]
struct Args {
    /// Balance configuration TOML (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of loop ticks to simulate.
    #[arg(long, default_value_t = 5000)]
    ticks: u64,

    /// Run the RT setup sequence before entering the loop (needs the `rt`
    /// build feature and CAP_SYS_NICE).
    #[arg(long)]
    realtime: bool,

    /// CPU core to pin to when `--realtime` is set.
    #[arg(long, default_value_t = 0)]
    cpu: usize,

    /// SCHED_FIFO priority when `--realtime` is set.
    #[arg(long, default_value_t = 80)]
    priority: i32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match BalanceConfig::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                error!("FATAL: {e}");
                process::exit(1);
            }
        },
        None => BalanceConfig::default(),
    };

    if args.realtime {
        if let Err(e) = rt_setup(args.cpu, args.priority) {
            error!("FATAL: {e}");
            process::exit(1);
        }
    }

    let mut rig = SimRig::ready();
    rig.auto_physics = true;
    rig.imu.pitch_deg = 2.0;

    let tuning = Tuning::derive(config, &rig.motor.config);
    info!(
        hertz = tuning.cfg.hertz,
        soft_start = tuning.use_soft_start,
        reverse_stop = tuning.use_reverse_stop,
        "tuning derived"
    );

    let mut supervisor = Supervisor::new(tuning.clone());
    let mut runner = CycleRunner::new(&tuning);
    let shutdown = AtomicBool::new(false);

    let stats = runner.run(&mut supervisor, &mut rig, &shutdown, Some(args.ticks));

    let snap = supervisor.snapshot();
    info!(
        phase = snap.phase,
        pitch = format!("{:.2}", snap.pitch),
        setpoint = format!("{:.2}", snap.setpoint),
        output = format!("{:.2}", snap.pid_output),
        erpm = format!("{:.0}", snap.erpm),
        "final state"
    );
    info!(
        ticks = stats.tick_count,
        avg_ns = stats.avg_tick_ns(),
        max_ns = stats.max_tick_ns,
        overruns = stats.overruns,
        "timing"
    );
}
