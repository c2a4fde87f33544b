//! Operation timing and aggregate statistics
//!
//! Samples are kept per operation name in a bounded window, and aggregates
//! are recomputed from that window on every query. Operations are reported
//! in the order they were first recorded.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lmdiag_core::domain::RingBuffer;
use lmdiag_log::Logger;
use tracing::trace;

use crate::metrics::MetricsRegistry;

/// Default slow-operation threshold.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(1000);

/// Default number of samples retained per operation.
pub const DEFAULT_MAX_SAMPLES: usize = 1000;

/// Aggregate statistics over the retained samples, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl AggregateStats {
    fn from_samples(samples: &RingBuffer<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &sample in samples.iter() {
            min = min.min(sample);
            max = max.max(sample);
            sum += sample;
        }
        let count = samples.len();
        Some(Self {
            avg: sum / count as f64,
            min,
            max,
            count,
        })
    }
}

/// Statistics for one named operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMetrics {
    pub name: String,
    pub stats: AggregateStats,
}

/// Handle returned by [`PerformanceMonitor::start_operation`].
///
/// Dropping the timer without calling [`stop`](Self::stop) records nothing.
#[must_use = "call stop() to record the measurement"]
pub struct OperationTimer {
    monitor: Arc<PerformanceMonitor>,
    name: String,
    started: Instant,
}

impl OperationTimer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records the time elapsed since the operation started and returns it.
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.monitor.record(&self.name, elapsed);
        elapsed
    }
}

pub struct PerformanceMonitor {
    logger: Arc<Logger>,
    metrics: Arc<MetricsRegistry>,
    slow_threshold: Duration,
    max_samples: usize,
    samples: Mutex<Vec<(String, RingBuffer<f64>)>>,
}

impl PerformanceMonitor {
    pub fn new(logger: Arc<Logger>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            logger,
            metrics,
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            max_samples: DEFAULT_MAX_SAMPLES,
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Durations strictly above `threshold` produce a WARNING log entry.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    /// Samples retained per operation; older samples are evicted first.
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, RingBuffer<f64>)>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_operation(self: &Arc<Self>, name: impl Into<String>) -> OperationTimer {
        OperationTimer {
            monitor: Arc::clone(self),
            name: name.into(),
            started: Instant::now(),
        }
    }

    /// Records an externally measured duration for `name`.
    pub fn record(&self, name: &str, duration: Duration) {
        let millis = duration.as_secs_f64() * 1000.0;

        {
            let mut samples = self.lock();
            match samples.iter_mut().find(|(op, _)| op == name) {
                Some((_, window)) => {
                    if window.push(millis).is_some() {
                        trace!(operation = name, "Evicted oldest performance sample");
                    }
                }
                None => {
                    let mut window = RingBuffer::new(self.max_samples);
                    window.push(millis);
                    samples.push((name.to_string(), window));
                }
            }
        }

        self.metrics.observe_operation(name, duration.as_secs_f64());

        if duration > self.slow_threshold {
            self.logger
                .warning(format!("Operation {name} took {millis:.2}ms"));
        }
    }

    /// Aggregates for every operation, in first-appearance order.
    pub fn metrics(&self) -> Vec<OperationMetrics> {
        self.lock()
            .iter()
            .filter_map(|(name, window)| {
                AggregateStats::from_samples(window).map(|stats| OperationMetrics {
                    name: name.clone(),
                    stats,
                })
            })
            .collect()
    }

    pub fn metrics_for(&self, name: &str) -> Option<AggregateStats> {
        self.lock()
            .iter()
            .find(|(op, _)| op == name)
            .and_then(|(_, window)| AggregateStats::from_samples(window))
    }

    /// Multi-line summary of every operation's statistics.
    pub fn generate_report(&self) -> String {
        let mut report = String::from("Performance Report:\n");
        for OperationMetrics { name, stats } in self.metrics() {
            let _ = write!(
                report,
                "\n{name}:\n  Average: {:.2}ms\n  Min: {:.2}ms\n  Max: {:.2}ms\n  Count: {}\n",
                stats.avg, stats.min, stats.max, stats.count
            );
        }
        report
    }

    pub fn clear_metrics(&self) {
        self.lock().clear();
    }
}
