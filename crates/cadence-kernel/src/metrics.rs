//! Kernel metrics registry.
//!
//! A fixed set of named series, each a multi-window simple moving average
//! plus its most recent raw sample. Durations are recorded in nanoseconds.
//! The maintenance average feeds back into scheduling through
//! [`KernelMetrics::compute_proc_time`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::error;

use crate::domain::MultiSma;
use crate::error::Result;
use crate::time::KernelTime;
use crate::SMA_WINDOWS;

/// One metric series: a multi-window SMA guarded for concurrent `record`.
pub struct Series {
    sma: Mutex<MultiSma>,
}

impl Series {
    fn new() -> Self {
        Self {
            sma: Mutex::new(MultiSma::new(&SMA_WINDOWS)),
        }
    }

    /// Append a sample.
    pub fn record(&self, sample: f64) {
        self.sma.lock().add(sample);
    }

    /// One mean per window, in [`SMA_WINDOWS`] order.
    pub fn averages(&self) -> Vec<f64> {
        self.sma.lock().averages()
    }

    /// The most recent raw sample.
    pub fn last(&self) -> f64 {
        self.sma.lock().last()
    }
}

/// The kernel's metric series.
pub struct KernelMetrics {
    cycle: Series,
    maint: Series,
    maint_percent: Series,
    gen_block: Series,
    add_block: Series,
    conf_block: Series,
    eval: Series,
    computed_proc: Series,
    computed_proc_percent: Series,
    actual_proc: Series,
    actual_proc_percent: Series,
    block_q_count: Series,
    recv_q_counts: RwLock<HashMap<String, Arc<Series>>>,
}

impl KernelMetrics {
    /// Create the registry with every series empty.
    pub fn new() -> Self {
        Self {
            cycle: Series::new(),
            maint: Series::new(),
            maint_percent: Series::new(),
            gen_block: Series::new(),
            add_block: Series::new(),
            conf_block: Series::new(),
            eval: Series::new(),
            computed_proc: Series::new(),
            computed_proc_percent: Series::new(),
            actual_proc: Series::new(),
            actual_proc_percent: Series::new(),
            block_q_count: Series::new(),
            recv_q_counts: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed cycle's duration and derive the percent series
    /// from the latest raw maintenance and processing samples.
    pub fn set_cycle_time(&self, duration_ns: f64) {
        self.cycle.record(duration_ns);
        if duration_ns > 0.0 {
            self.maint_percent.record(100.0 * self.maint.last() / duration_ns);
            self.actual_proc_percent
                .record(100.0 * self.actual_proc.last() / duration_ns);
        }
    }

    /// Record a maintenance slice duration.
    pub fn set_maint_time(&self, duration_ns: f64) {
        self.maint.record(duration_ns);
    }

    /// Record a block generation duration.
    pub fn set_gen_block_time(&self, duration_ns: f64) {
        self.gen_block.record(duration_ns);
    }

    /// Record a batch admission duration.
    pub fn set_add_block_time(&self, duration_ns: f64) {
        self.add_block.record(duration_ns);
    }

    /// Record a block confirmation duration.
    pub fn set_conf_block_time(&self, duration_ns: f64) {
        self.conf_block.record(duration_ns);
    }

    /// Record a head-block evaluation duration.
    pub fn set_eval_time(&self, duration_ns: f64) {
        self.eval.record(duration_ns);
    }

    /// Record an actual processing slice duration.
    pub fn set_actual_proc_time(&self, duration_ns: f64) {
        self.actual_proc.record(duration_ns);
    }

    /// Record the intake registry depth sampled during maintenance.
    pub fn set_block_q_count(&self, count: usize) {
        self.block_q_count.record(count as f64);
    }

    /// Record a receive queue depth for `protocol`.
    pub fn set_recv_q_count(&self, protocol: &str, count: usize) {
        self.recv_q_series(protocol).record(count as f64);
    }

    fn set_computed_proc_time(&self, duration_ns: f64, block_frequency: f64) {
        self.computed_proc.record(duration_ns);
        let percent = duration_ns * block_frequency * 100.0 / 1e9;
        self.computed_proc_percent.record(percent);
    }

    /// The processing-slice budget for the coming cycle:
    /// `block_interval - avg(maint)` over the shortest window. A negative
    /// budget is an overrun: logged and clamped to zero.
    pub fn compute_proc_time(&self, time: &KernelTime) -> Duration {
        let interval_ns = time.block_interval().as_nanos() as f64;
        let maint_avg = self.maint.averages()[0];
        let proc_ns = interval_ns - maint_avg;
        self.set_computed_proc_time(proc_ns, time.block_frequency());

        if proc_ns < 0.0 {
            error!(
                ktime = %time,
                overrun_ns = -proc_ns,
                "proc time overrun, maintenance exceeds the block interval"
            );
            return Duration::ZERO;
        }
        Duration::from_nanos(proc_ns as u64)
    }

    fn recv_q_series(&self, protocol: &str) -> Arc<Series> {
        if let Some(series) = self.recv_q_counts.read().get(protocol) {
            return Arc::clone(series);
        }
        let mut map = self.recv_q_counts.write();
        Arc::clone(
            map.entry(protocol.to_string())
                .or_insert_with(|| Arc::new(Series::new())),
        )
    }

    /// Latest cycle duration.
    pub fn cycle_time(&self) -> f64 {
        self.cycle.last()
    }

    /// Cycle duration window means.
    pub fn cycle_times(&self) -> Vec<f64> {
        self.cycle.averages()
    }

    /// Latest maintenance duration.
    pub fn maint_time(&self) -> f64 {
        self.maint.last()
    }

    /// Maintenance duration window means.
    pub fn maint_times(&self) -> Vec<f64> {
        self.maint.averages()
    }

    /// Maintenance share of the cycle, window means.
    pub fn maint_time_percents(&self) -> Vec<f64> {
        self.maint_percent.averages()
    }

    /// Latest block generation duration.
    pub fn gen_block_time(&self) -> f64 {
        self.gen_block.last()
    }

    /// Block generation window means.
    pub fn gen_block_times(&self) -> Vec<f64> {
        self.gen_block.averages()
    }

    /// Latest batch admission duration.
    pub fn add_block_time(&self) -> f64 {
        self.add_block.last()
    }

    /// Batch admission window means.
    pub fn add_block_times(&self) -> Vec<f64> {
        self.add_block.averages()
    }

    /// Latest confirmation duration.
    pub fn conf_block_time(&self) -> f64 {
        self.conf_block.last()
    }

    /// Confirmation window means.
    pub fn conf_block_times(&self) -> Vec<f64> {
        self.conf_block.averages()
    }

    /// Latest head-block evaluation duration.
    pub fn eval_time(&self) -> f64 {
        self.eval.last()
    }

    /// Head-block evaluation window means.
    pub fn eval_times(&self) -> Vec<f64> {
        self.eval.averages()
    }

    /// Latest computed processing budget.
    pub fn computed_proc_time(&self) -> f64 {
        self.computed_proc.last()
    }

    /// Computed processing budget window means.
    pub fn computed_proc_times(&self) -> Vec<f64> {
        self.computed_proc.averages()
    }

    /// Computed budget share of the interval, window means.
    pub fn computed_proc_time_percents(&self) -> Vec<f64> {
        self.computed_proc_percent.averages()
    }

    /// Latest actual processing duration.
    pub fn actual_proc_time(&self) -> f64 {
        self.actual_proc.last()
    }

    /// Actual processing window means.
    pub fn actual_proc_times(&self) -> Vec<f64> {
        self.actual_proc.averages()
    }

    /// Actual processing share of the cycle, window means.
    pub fn actual_proc_time_percents(&self) -> Vec<f64> {
        self.actual_proc_percent.averages()
    }

    /// Latest intake registry depth.
    pub fn block_q_count(&self) -> f64 {
        self.block_q_count.last()
    }

    /// Intake registry depth window means.
    pub fn block_q_counts(&self) -> Vec<f64> {
        self.block_q_count.averages()
    }

    /// Latest receive queue depth per protocol.
    pub fn recv_q_count_map(&self) -> HashMap<String, f64> {
        self.recv_q_counts
            .read()
            .iter()
            .map(|(name, series)| (name.clone(), series.last()))
            .collect()
    }

    /// Receive queue depth window means per protocol.
    pub fn recv_q_counts_map(&self) -> HashMap<String, Vec<f64>> {
        self.recv_q_counts
            .read()
            .iter()
            .map(|(name, series)| (name.clone(), series.averages()))
            .collect()
    }

    /// Human-readable snapshot of every series.
    pub fn text_snapshot(&self, time: &KernelTime, block_number: u64) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(out, "Kernel time (cycle.micros): {time}");
        let _ = writeln!(out, "Kernel uptime: {:?}", time.up_time());
        let _ = writeln!(out, "Moving average windows (num blocks): {SMA_WINDOWS:?}");
        let _ = writeln!(out, "Block queue count: {}", self.block_q_count());
        let _ = writeln!(out, "Receive queue count:");
        for (name, counts) in self.recv_q_counts_map() {
            let _ = writeln!(out, "  {name}: {counts:?}");
        }
        let _ = writeln!(out, "--- Cycles ---");
        let _ = writeln!(out, "Cycle number: {}", time.cycle_number());
        let _ = writeln!(out, "Block number: {block_number}");
        let _ = writeln!(
            out,
            "Configured cycle time (block interval): {:?}",
            time.block_interval()
        );
        let _ = writeln!(out, "Actual cycle time (ns): {:?}", self.cycle_times());
        let _ = writeln!(out, "--- Process Timeslice ---");
        let _ = writeln!(
            out,
            "Process timeslice time (ns): {:?}",
            self.actual_proc_times()
        );
        let _ = writeln!(
            out,
            "Process timeslice % of block interval: {:?}",
            self.actual_proc_time_percents()
        );
        let _ = writeln!(
            out,
            "Scheduled process timeslice time (ns): {:?}",
            self.computed_proc_times()
        );
        let _ = writeln!(
            out,
            "Scheduled process timeslice % of block interval: {:?}",
            self.computed_proc_time_percents()
        );
        let _ = writeln!(
            out,
            "Block generation time (ns): {:?}",
            self.gen_block_times()
        );
        let _ = writeln!(
            out,
            "Block add performance (ns): {:?}",
            self.add_block_times()
        );
        let _ = writeln!(out, "--- Maintenance Timeslice ---");
        let _ = writeln!(
            out,
            "Maintenance timeslice time (ns): {:?}",
            self.maint_times()
        );
        let _ = writeln!(
            out,
            "Maintenance timeslice % of block interval: {:?}",
            self.maint_time_percents()
        );
        let _ = writeln!(
            out,
            "Block confirmation time (ns): {:?}",
            self.conf_block_times()
        );
        let _ = writeln!(
            out,
            "Head block evaluation time (ns): {:?}",
            self.eval_times()
        );
        out
    }

    /// JSON snapshot of every series.
    pub fn json_snapshot(&self, time: &KernelTime, block_number: u64) -> Result<String> {
        let snapshot = MetricsSnapshot {
            kernel_time: time.to_string(),
            uptime_ns: time.up_time().as_nanos() as u64,
            moving_average_windows: SMA_WINDOWS.to_vec(),
            block_queue_count: self.block_q_count(),
            block_queue_counts: self.block_q_counts(),
            receive_queue_count: self.recv_q_count_map(),
            receive_queue_counts: self.recv_q_counts_map(),
            cycle_number: time.cycle_number(),
            configured_cycle_time_ns: time.block_interval().as_nanos() as u64,
            configured_block_frequency: time.block_frequency(),
            actual_cycle_time: self.cycle_time(),
            actual_cycle_times: self.cycle_times(),
            process_timeslice: self.actual_proc_time(),
            process_timeslices: self.actual_proc_times(),
            process_timeslice_percents: self.actual_proc_time_percents(),
            scheduled_process_timeslice: self.computed_proc_time(),
            scheduled_process_timeslices: self.computed_proc_times(),
            scheduled_process_timeslice_percents: self.computed_proc_time_percents(),
            block_generation_number: block_number,
            block_generation_time: self.gen_block_time(),
            block_generation_times: self.gen_block_times(),
            block_add_performance: self.add_block_time(),
            block_add_performances: self.add_block_times(),
            maintenance_timeslice: self.maint_time(),
            maintenance_timeslices: self.maint_times(),
            maintenance_timeslice_percents: self.maint_time_percents(),
            block_confirmation_time: self.conf_block_time(),
            block_confirmation_times: self.conf_block_times(),
            head_block_evaluation_time: self.eval_time(),
            head_block_evaluation_times: self.eval_times(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }
}

impl Default for KernelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of a metrics snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsSnapshot {
    kernel_time: String,
    uptime_ns: u64,
    moving_average_windows: Vec<usize>,
    block_queue_count: f64,
    block_queue_counts: Vec<f64>,
    receive_queue_count: HashMap<String, f64>,
    receive_queue_counts: HashMap<String, Vec<f64>>,
    cycle_number: u64,
    configured_cycle_time_ns: u64,
    configured_block_frequency: f64,
    actual_cycle_time: f64,
    actual_cycle_times: Vec<f64>,
    process_timeslice: f64,
    process_timeslices: Vec<f64>,
    process_timeslice_percents: Vec<f64>,
    scheduled_process_timeslice: f64,
    scheduled_process_timeslices: Vec<f64>,
    scheduled_process_timeslice_percents: Vec<f64>,
    block_generation_number: u64,
    block_generation_time: f64,
    block_generation_times: Vec<f64>,
    block_add_performance: f64,
    block_add_performances: Vec<f64>,
    maintenance_timeslice: f64,
    maintenance_timeslices: Vec<f64>,
    maintenance_timeslice_percents: Vec<f64>,
    block_confirmation_time: f64,
    block_confirmation_times: Vec<f64>,
    head_block_evaluation_time: f64,
    head_block_evaluation_times: Vec<f64>,
}
