//! Kernel time.
//!
//! Tracks the block frequency, the current cycle number, and uptime. The
//! scheduler calls [`KernelTime::start_cycle`] at the top of every
//! processing slice; it is the only writer. Everything else reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::metrics::KernelMetrics;

/// Kernel clock: block frequency, cycle counter, uptime.
pub struct KernelTime {
    block_frequency: f64,
    block_interval: Duration,
    /// Monotonic origin all timestamps are measured from.
    base: Instant,
    cycle_number: AtomicU64,
    /// Nanoseconds since `base` at which the current cycle started.
    cycle_start_ns: AtomicU64,
    /// Sum of completed cycle durations.
    up_time_ns: AtomicU64,
    /// False until the first `start_cycle`, which has no prior cycle to
    /// account for.
    started_once: AtomicBool,
}

impl KernelTime {
    /// Create a clock for the given block frequency (blocks per second).
    pub fn new(block_frequency: f64) -> Self {
        let block_interval = Duration::from_nanos((1e9 / block_frequency) as u64);
        Self {
            block_frequency,
            block_interval,
            base: Instant::now(),
            cycle_number: AtomicU64::new(0),
            cycle_start_ns: AtomicU64::new(0),
            up_time_ns: AtomicU64::new(0),
            started_once: AtomicBool::new(false),
        }
    }

    /// Configured block frequency in blocks per second.
    pub fn block_frequency(&self) -> f64 {
        self.block_frequency
    }

    /// Target duration of one cycle: `1s / block_frequency`.
    pub fn block_interval(&self) -> Duration {
        self.block_interval
    }

    /// Sum of completed cycle durations.
    pub fn up_time(&self) -> Duration {
        Duration::from_nanos(self.up_time_ns.load(Ordering::Relaxed))
    }

    /// Number of the current cycle. Zero before the first cycle starts.
    pub fn cycle_number(&self) -> u64 {
        self.cycle_number.load(Ordering::Relaxed)
    }

    /// Nanoseconds elapsed inside the current cycle.
    pub fn nanos_since_cycle_start(&self) -> u64 {
        let now = self.base.elapsed().as_nanos() as u64;
        now.saturating_sub(self.cycle_start_ns.load(Ordering::Relaxed))
    }

    /// Begin a new cycle: feed the just-completed cycle's duration to the
    /// metrics and the uptime accumulator (the very first cycle has no
    /// prior start and contributes nothing), then advance the counter.
    pub fn start_cycle(&self, metrics: &KernelMetrics) {
        let now = self.base.elapsed().as_nanos() as u64;
        if self.started_once.load(Ordering::Relaxed) {
            let cycle_ns = now - self.cycle_start_ns.load(Ordering::Relaxed);
            metrics.set_cycle_time(cycle_ns as f64);
            self.up_time_ns.fetch_add(cycle_ns, Ordering::Relaxed);
        }
        self.cycle_number.fetch_add(1, Ordering::Relaxed);
        self.cycle_start_ns.store(now, Ordering::Relaxed);
        self.started_once.store(true, Ordering::Relaxed);
    }
}

impl fmt::Display for KernelTime {
    /// Kernel time as `<cycle>.<micros>`: comma-grouped cycle number and
    /// microseconds into the cycle, zero-padded to six digits.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.nanos_since_cycle_start() / 1_000;
        write!(
            f,
            "{}.{:06}",
            group_digits(self.cycle_number()),
            micros
        )
    }
}

/// Decimal digit grouping: `1234567` becomes `"1,234,567"`.
fn group_digits(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_reciprocal_of_frequency() {
        let time = KernelTime::new(10.0);
        assert_eq!(time.block_interval(), Duration::from_millis(100));
        assert_eq!(time.block_frequency(), 10.0);
    }

    #[test]
    fn test_first_cycle_contributes_no_uptime() {
        let time = KernelTime::new(10.0);
        let metrics = KernelMetrics::new();
        time.start_cycle(&metrics);
        assert_eq!(time.cycle_number(), 1);
        assert_eq!(time.up_time(), Duration::ZERO);
        assert_eq!(metrics.cycle_time(), 0.0);
    }

    #[test]
    fn test_cycles_accumulate_uptime() {
        let time = KernelTime::new(10.0);
        let metrics = KernelMetrics::new();
        time.start_cycle(&metrics);
        std::thread::sleep(Duration::from_millis(5));
        time.start_cycle(&metrics);
        assert_eq!(time.cycle_number(), 2);
        assert!(time.up_time() >= Duration::from_millis(5));
        assert!(metrics.cycle_time() > 0.0);
    }

    #[test]
    fn test_display_shape() {
        let time = KernelTime::new(10.0);
        let metrics = KernelMetrics::new();
        time.start_cycle(&metrics);
        let shown = time.to_string();
        let (cycle, micros) = shown.split_once('.').expect("cycle.micros");
        assert_eq!(cycle, "1");
        assert_eq!(micros.len(), 6);
    }

    #[test]
    fn test_digit_grouping() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1_000), "1,000");
        assert_eq!(group_digits(1_234_567), "1,234,567");
    }
}
