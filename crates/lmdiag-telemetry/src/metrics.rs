//! Prometheus metrics registry for LMDiag
//!
//! Each [`DiagnosticsContext`](crate::DiagnosticsContext) owns its own
//! registry, so test instances never share counters.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: handled errors by severity
    pub errors_total: IntCounterVec,
    /// Counter: notifications shown by modality
    pub notifications_total: IntCounterVec,
    /// Counter: telemetry events by outcome (tracked, evicted, flushed, lost)
    pub telemetry_events_total: IntCounterVec,
    /// Counter: flush cycles by status (success, failure)
    pub telemetry_flushes_total: IntCounterVec,
    /// Gauge: current ring buffer occupancy (errors, events)
    pub buffer_len: IntGaugeVec,
    /// Histogram: measured operation durations in seconds
    pub operation_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("lmdiag".to_string()), None)?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Handled errors by severity"),
            &["severity"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Error notifications shown by modality"),
            &["modality"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let telemetry_events_total = IntCounterVec::new(
            Opts::new("telemetry_events_total", "Telemetry events by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(telemetry_events_total.clone()))?;

        let telemetry_flushes_total = IntCounterVec::new(
            Opts::new("telemetry_flushes_total", "Telemetry flush cycles by status"),
            &["status"],
        )?;
        registry.register(Box::new(telemetry_flushes_total.clone()))?;

        let buffer_len = IntGaugeVec::new(
            Opts::new("buffer_len", "Current ring buffer occupancy"),
            &["buffer"],
        )?;
        registry.register(Box::new(buffer_len.clone()))?;

        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Measured operation duration in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, f64::INFINITY]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            errors_total,
            notifications_total,
            telemetry_events_total,
            telemetry_flushes_total,
            buffer_len,
            operation_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    pub fn record_error(&self, severity: &str) {
        self.errors_total.with_label_values(&[severity]).inc();
    }

    pub fn record_notification(&self, modality: &str) {
        self.notifications_total.with_label_values(&[modality]).inc();
    }

    /// Record `count` telemetry events reaching `outcome`.
    pub fn record_events(&self, outcome: &str, count: u64) {
        self.telemetry_events_total
            .with_label_values(&[outcome])
            .inc_by(count);
    }

    pub fn record_flush(&self, status: &str) {
        self.telemetry_flushes_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn set_buffer_len(&self, buffer: &str, len: usize) {
        self.buffer_len
            .with_label_values(&[buffer])
            .set(i64::try_from(len).unwrap_or(i64::MAX));
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
