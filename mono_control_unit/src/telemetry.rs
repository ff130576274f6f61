//! Telemetry: external snapshot and the terminal debug tap.
//!
//! The snapshot is the only window other tasks get into the loop: a flat
//! struct of scalar fields, copied whole. Word-sized single-publisher
//! writes keep reads tear-free without locks; the size is pinned so the
//! struct never silently grows into something that no longer copies cheaply.
//!
//! The debug tap implements the three terminal commands: two render slots
//! for the realtime graph, one-shot value sampling, and six experiment
//! plot channels.

use static_assertions::const_assert_eq;

use crate::ports::PlotSink;

// ─── Debug field ids (wire contract, do not renumber) ───────────────

pub const FIELD_MOTOR_POSITION: u8 = 1;
pub const FIELD_SETPOINT: u8 = 2;
pub const FIELD_FILTERED_MOTOR_CURRENT: u8 = 3;
pub const FIELD_DERIVATIVE: u8 = 4;
pub const FIELD_PITCH_DELTA: u8 = 5;
pub const FIELD_MOTOR_CURRENT: u8 = 6;
pub const FIELD_ERPM: u8 = 7;
pub const FIELD_ABS_ERPM: u8 = 8;
pub const FIELD_LOOP_TIME: u8 = 9;
pub const FIELD_LOOP_DIFF_TIME: u8 = 10;
pub const FIELD_LOOP_OVERSHOOT: u8 = 11;
pub const FIELD_FILTERED_LOOP_OVERSHOOT: u8 = 12;
pub const FIELD_FILTERED_DIFF_TIME: u8 = 13;

// ─── Snapshot ───────────────────────────────────────────────────────

/// Immutable copy of the loop's scalar state for external readers.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Snapshot {
    pub pitch: f64,
    pub roll: f64,
    pub setpoint: f64,
    /// Smoothed, clamped output current [A].
    pub pid_output: f64,
    pub motor_current: f64,
    pub erpm: f64,
    pub duty: f64,
    pub adc1: f64,
    pub adc2: f64,
    pub torquetilt_target: f64,
    pub turntilt_target: f64,
    pub integral: f64,
    pub ki: f64,
    pub switch_state: u8,
    pub phase: u8,
    /// `phase + (mode << 4) + 128·cutback`.
    pub packed_state: u8,
    pub locked: u8,
}

// 13 scalar f64 fields plus four state bytes, padded to alignment.
const_assert_eq!(core::mem::size_of::<Snapshot>(), 112);

// ─── Debug tap ──────────────────────────────────────────────────────

/// Routing state for the terminal debug commands.
#[derive(Debug, Clone, Default)]
pub struct DebugTap {
    render: [u8; 2],
    sample_field: u8,
    sample_count: u32,
    sample_index: u32,
    experiments: [u8; 6],
}

impl DebugTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `app_balance_render <field> [graph]` — route a field to one of the
    /// two realtime render slots. Out-of-range graphs fall back to 1.
    pub fn handle_render(&mut self, args: &[&str]) -> Result<(), String> {
        if args.is_empty() || args.len() > 2 {
            return Err("usage: app_balance_render <field> [graph 1|2]".to_string());
        }
        let field = parse_u8(args[0])?;
        let graph = match args.get(1) {
            Some(raw) => {
                let g: usize = raw
                    .parse()
                    .map_err(|_| format!("invalid graph: {raw}"))?;
                if (1..=2).contains(&g) {
                    g
                } else {
                    1
                }
            }
            None => 1,
        };
        self.render[graph - 1] = field;
        Ok(())
    }

    /// `app_balance_sample <field> <count>` — print the next `count`
    /// values of `field`.
    pub fn handle_sample(&mut self, args: &[&str]) -> Result<(), String> {
        if args.len() != 2 {
            return Err("usage: app_balance_sample <field> <count>".to_string());
        }
        self.sample_field = parse_u8(args[0])?;
        self.sample_count = args[1]
            .parse()
            .map_err(|_| format!("invalid count: {}", args[1]))?;
        self.sample_index = 0;
        Ok(())
    }

    /// `app_balance_experiment <field> <graph>` — stream a field onto one
    /// of the six experiment plot channels.
    pub fn handle_experiment(
        &mut self,
        args: &[&str],
        plot: &mut dyn PlotSink,
    ) -> Result<(), String> {
        if args.len() != 2 {
            return Err("usage: app_balance_experiment <field> <graph 1-6>".to_string());
        }
        let field = parse_u8(args[0])?;
        let graph: usize = args[1]
            .parse()
            .map_err(|_| format!("invalid graph: {}", args[1]))?;
        if !(1..=6).contains(&graph) {
            return Err(format!("graph {graph} out of range 1-6"));
        }
        self.experiments[graph - 1] = field;
        plot.plot_init("Milliseconds", "Balance Debug Data");
        for name in ["1", "2", "3", "4", "5", "6"] {
            plot.plot_add_graph(name);
        }
        Ok(())
    }

    /// Field routed to a render slot (slot 0 or 1); 0 = none.
    #[inline]
    pub fn render_field(&self, slot: usize) -> u8 {
        self.render[slot]
    }

    /// Field being sampled, if the countdown is still running.
    pub fn sample_pending(&mut self) -> Option<u8> {
        if self.sample_index < self.sample_count {
            self.sample_index += 1;
            Some(self.sample_field)
        } else {
            None
        }
    }

    /// The six experiment channels; 0 = channel off.
    #[inline]
    pub fn experiments(&self) -> &[u8; 6] {
        &self.experiments
    }
}

fn parse_u8(raw: &str) -> Result<u8, String> {
    raw.parse().map_err(|_| format!("invalid field: {raw}"))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingPlot;

    #[test]
    fn render_defaults_to_graph_one() {
        let mut tap = DebugTap::new();
        tap.handle_render(&["7"]).unwrap();
        assert_eq!(tap.render_field(0), FIELD_ERPM);
        assert_eq!(tap.render_field(1), 0);
    }

    #[test]
    fn render_second_graph() {
        let mut tap = DebugTap::new();
        tap.handle_render(&["2", "2"]).unwrap();
        assert_eq!(tap.render_field(1), FIELD_SETPOINT);
    }

    #[test]
    fn render_out_of_range_graph_falls_back() {
        let mut tap = DebugTap::new();
        tap.handle_render(&["4", "9"]).unwrap();
        assert_eq!(tap.render_field(0), FIELD_DERIVATIVE);
    }

    #[test]
    fn render_requires_arguments() {
        let mut tap = DebugTap::new();
        assert!(tap.handle_render(&[]).is_err());
        assert!(tap.handle_render(&["1", "2", "3"]).is_err());
        assert!(tap.handle_render(&["pitch"]).is_err());
    }

    #[test]
    fn sample_counts_down() {
        let mut tap = DebugTap::new();
        tap.handle_sample(&["6", "3"]).unwrap();
        assert_eq!(tap.sample_pending(), Some(FIELD_MOTOR_CURRENT));
        assert_eq!(tap.sample_pending(), Some(FIELD_MOTOR_CURRENT));
        assert_eq!(tap.sample_pending(), Some(FIELD_MOTOR_CURRENT));
        assert_eq!(tap.sample_pending(), None);
    }

    #[test]
    fn experiment_initializes_plot() {
        let mut tap = DebugTap::new();
        let mut plot = RecordingPlot::default();
        tap.handle_experiment(&["8", "3"], &mut plot).unwrap();
        assert_eq!(tap.experiments()[2], FIELD_ABS_ERPM);
        assert_eq!(plot.inits, 1);
        assert_eq!(plot.graphs.len(), 6);
    }

    #[test]
    fn experiment_rejects_bad_graph() {
        let mut tap = DebugTap::new();
        let mut plot = RecordingPlot::default();
        assert!(tap.handle_experiment(&["8", "7"], &mut plot).is_err());
        assert!(tap.handle_experiment(&["8"], &mut plot).is_err());
    }

    #[test]
    fn snapshot_is_plain_copy() {
        let snap = Snapshot {
            pitch: 1.5,
            phase: 11,
            ..Snapshot::default()
        };
        let copy = snap;
        assert_eq!(copy.pitch, 1.5);
        assert_eq!(copy.phase, 11);
    }
}
