//! Multi-window simple moving averages.
//!
//! Each metric series keeps one SMA per window size. `add` is O(1) per
//! window: a full ring buffer displaces its oldest sample and the mean is
//! nudged by `(sample - displaced) / window`; a partially filled window
//! uses the running-mean form instead.

/// One fixed-size window over a sample stream.
#[derive(Debug, Clone)]
struct Window {
    size: usize,
    buf: Vec<f64>,
    next: usize,
    filled: usize,
    mean: f64,
}

impl Window {
    fn new(size: usize) -> Self {
        Self {
            size,
            buf: Vec::new(),
            next: 0,
            filled: 0,
            mean: 0.0,
        }
    }

    fn add(&mut self, sample: f64) {
        if self.filled < self.size {
            self.buf.push(sample);
            self.filled += 1;
            self.mean += (sample - self.mean) / self.filled as f64;
        } else {
            let displaced = self.buf[self.next];
            self.buf[self.next] = sample;
            self.mean += (sample - displaced) / self.size as f64;
        }
        self.next = (self.next + 1) % self.size;
    }
}

/// A family of simple moving averages over a fixed list of window sizes.
#[derive(Debug, Clone)]
pub struct MultiSma {
    windows: Vec<Window>,
    last: f64,
}

impl MultiSma {
    /// Create a family with one SMA per window size.
    pub fn new(window_sizes: &[usize]) -> Self {
        Self {
            windows: window_sizes.iter().map(|&s| Window::new(s)).collect(),
            last: 0.0,
        }
    }

    /// Append `sample` to every window.
    pub fn add(&mut self, sample: f64) {
        for window in &mut self.windows {
            window.add(sample);
        }
        self.last = sample;
    }

    /// One mean per window, in the window list's order. Windows that have
    /// seen no samples report zero.
    pub fn averages(&self) -> Vec<f64> {
        self.windows.iter().map(|w| w.mean).collect()
    }

    /// The most recent raw sample.
    pub fn last(&self) -> f64 {
        self.last
    }
}
