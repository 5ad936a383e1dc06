//! Engine-agnostic metrics for the navigation system.
//!
//! Feature-gated and runtime-toggled so it costs nothing when disabled.
//!
//! # Usage
//!
//! ```ignore
//! use nav_octree::metrics::COLLECT_METRICS;
//!
//! // Compile with --features metrics
//! // Runtime toggle:
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! let metrics = system.metrics();
//! println!("avg flush {:.1}us", metrics.avg_flush_timing_us());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// Check if metrics collection is enabled (both compile-time and runtime).
#[inline]
pub fn is_enabled() -> bool {
    #[cfg(feature = "metrics")]
    {
        COLLECT_METRICS.load(Ordering::Relaxed)
    }
    #[cfg(not(feature = "metrics"))]
    {
        false
    }
}

/// Rolling window of recent values.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Push a value, evicting the oldest at capacity.
    pub fn push(&mut self, value: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buffer.back()
    }
}

impl<T: Copy + Default + std::ops::Add<Output = T>> RollingWindow<T> {
    pub fn sum(&self) -> T {
        self.buffer.iter().copied().fold(T::default(), |acc, x| acc + x)
    }
}

impl RollingWindow<u64> {
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sum() as f64 / self.buffer.len() as f64
        }
    }

    pub fn min_max(&self) -> Option<(u64, u64)> {
        let min = *self.buffer.iter().min()?;
        let max = *self.buffer.iter().max()?;
        Some((min, max))
    }
}

impl Default for RollingWindow<u64> {
    fn default() -> Self {
        Self::new(128) // ~2 seconds of ticks at 60Hz
    }
}

/// Navigation system statistics, updated on flush and drain.
#[derive(Debug, Clone, Default)]
pub struct NavMetrics {
    // Bookkeeping
    /// Elements in the octree after the last flush.
    pub element_count: usize,
    /// Octree nodes after the last flush.
    pub node_count: usize,
    /// Approximate octree memory in bytes.
    pub octree_memory_bytes: usize,

    // Timing
    /// Flush durations in microseconds.
    pub flush_timings: RollingWindow<u64>,
    /// Intents applied per flush.
    pub intents_per_flush: RollingWindow<u64>,
    /// Areas handed to generators per drain.
    pub areas_per_drain: RollingWindow<u64>,

    // Totals
    pub total_flushes: u64,
    pub total_drains: u64,
    pub total_generator_failures: u64,
}

impl NavMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything except cumulative totals.
    pub fn reset(&mut self) {
        self.element_count = 0;
        self.node_count = 0;
        self.octree_memory_bytes = 0;
        self.flush_timings.clear();
        self.intents_per_flush.clear();
        self.areas_per_drain.clear();
    }

    pub fn record_flush(&mut self, timing_us: u64, intents: usize) {
        if is_enabled() {
            self.flush_timings.push(timing_us);
            self.intents_per_flush.push(intents as u64);
            self.total_flushes += 1;
        }
    }

    pub fn record_drain(&mut self, areas: usize) {
        if is_enabled() {
            self.areas_per_drain.push(areas as u64);
            self.total_drains += 1;
        }
    }

    pub fn record_generator_failure(&mut self) {
        if is_enabled() {
            self.total_generator_failures += 1;
        }
    }

    pub fn record_octree(&mut self, elements: usize, nodes: usize, memory_bytes: usize) {
        if is_enabled() {
            self.element_count = elements;
            self.node_count = nodes;
            self.octree_memory_bytes = memory_bytes;
        }
    }

    pub fn avg_flush_timing_us(&self) -> f64 {
        self.flush_timings.average()
    }

    pub fn octree_memory_mb(&self) -> f64 {
        self.octree_memory_bytes as f64 / 1_048_576.0
    }
}
