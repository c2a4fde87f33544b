//! Consent-gated telemetry buffer with periodic flush
//!
//! Events are accepted only while the matching consent flag is on, and are
//! held in a bounded buffer until the next flush. A flush takes the whole
//! buffer under the lock and sends the batch afterwards, so events tracked
//! while a send is in flight land in the next batch.
//!
//! ## Lifecycle
//!
//! [`TelemetryManager::start`] spawns the flush timer on the current tokio
//! runtime and [`TelemetryManager::stop`] cancels it. The timer task holds
//! only a weak reference, so dropping the last manager also ends it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::Context;
use lmdiag_core::{
    domain::{
        DiagnosticsError, ErrorCause, ErrorSeverity, Measurements, Properties, RingBuffer,
        TelemetryEvent,
    },
    ports::{read_flag, GateFlag, IConfigProvider, IReportingSink},
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error_handler::ErrorHandler;
use crate::metrics::MetricsRegistry;

/// Default capacity of the event buffer.
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Default period of the flush timer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Default count for [`TelemetryManager::recent_events`].
pub const DEFAULT_RECENT_COUNT: usize = 10;

struct FlushTimer {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct TelemetryManager {
    config: Arc<dyn IConfigProvider>,
    error_handler: Arc<ErrorHandler>,
    sink: Arc<dyn IReportingSink>,
    metrics: Arc<MetricsRegistry>,
    flush_interval: Duration,
    events: Mutex<RingBuffer<TelemetryEvent>>,
    timer: Mutex<Option<FlushTimer>>,
}

impl TelemetryManager {
    pub fn new(
        config: Arc<dyn IConfigProvider>,
        error_handler: Arc<ErrorHandler>,
        sink: Arc<dyn IReportingSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            error_handler,
            sink,
            metrics,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            events: Mutex::new(RingBuffer::new(DEFAULT_MAX_EVENTS)),
            timer: Mutex::new(None),
        }
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        *self.lock() = RingBuffer::new(capacity);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<TelemetryEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<FlushTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Buffers an event if `allowTelemetry` is on.
    ///
    /// Returns whether the event was accepted.
    pub fn track_event(
        &self,
        name: impl Into<String>,
        properties: Properties,
        measurements: Measurements,
    ) -> bool {
        if !read_flag(self.config.as_ref(), GateFlag::AllowTelemetry) {
            return false;
        }
        self.push(TelemetryEvent::new(name, properties, measurements));
        true
    }

    /// Tracks an `error` event if `allowCrashReports` is on.
    ///
    /// Like every wrapper, the event still passes through
    /// [`track_event`](Self::track_event) and its `allowTelemetry` gate.
    pub fn track_error(&self, error: impl Into<ErrorCause>, context: Option<Value>) -> bool {
        if !read_flag(self.config.as_ref(), GateFlag::AllowCrashReports) {
            return false;
        }
        let cause = error.into();
        let mut properties = Properties::new();
        properties.insert("error".to_string(), Value::String(cause.message));
        if let Some(stack) = cause.stack {
            properties.insert("stack".to_string(), Value::String(stack));
        }
        if let Some(context) = context {
            properties.insert("context".to_string(), context);
        }
        self.track_event("error", properties, Measurements::new())
    }

    /// Tracks a `performance` event if `allowUsageData` is on.
    pub fn track_performance(&self, operation: &str, duration_ms: f64, success: bool) -> bool {
        if !read_flag(self.config.as_ref(), GateFlag::AllowUsageData) {
            return false;
        }
        let mut properties = Properties::new();
        properties.insert("operation".to_string(), json!(operation));
        properties.insert("success".to_string(), json!(success));
        let mut measurements = Measurements::new();
        measurements.insert("duration".to_string(), duration_ms);
        self.track_event("performance", properties, measurements)
    }

    /// Tracks a `feature_usage` event if `allowUsageData` is on.
    pub fn track_feature_usage(&self, feature: &str, action: &str) -> bool {
        if !read_flag(self.config.as_ref(), GateFlag::AllowUsageData) {
            return false;
        }
        let mut properties = Properties::new();
        properties.insert("feature".to_string(), json!(feature));
        properties.insert("action".to_string(), json!(action));
        self.track_event("feature_usage", properties, Measurements::new())
    }

    fn push(&self, event: TelemetryEvent) {
        let mut events = self.lock();
        if let Some(evicted) = events.push(event) {
            trace!(event = %evicted.name, "Evicted oldest telemetry event");
            self.metrics.record_events("evicted", 1);
        }
        self.metrics.record_events("tracked", 1);
        self.metrics.set_buffer_len("events", events.len());
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of the pending events, oldest first.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.lock().snapshot()
    }

    pub fn events_by_type(&self, name: &str) -> Vec<TelemetryEvent> {
        self.lock().filtered(|event| event.name == name)
    }

    pub fn recent_events(&self, count: usize) -> Vec<TelemetryEvent> {
        self.lock().tail(count)
    }

    pub fn clear_events(&self) {
        self.lock().clear();
        self.metrics.set_buffer_len("events", 0);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    fn take_batch(&self) -> Vec<TelemetryEvent> {
        let mut events = self.lock();
        let batch = events.take_all();
        self.metrics.set_buffer_len("events", 0);
        batch
    }

    /// Runs one flush cycle now and returns the number of events sent.
    ///
    /// A failed send is routed to the error handler; the batch is dropped.
    pub async fn flush(&self) -> usize {
        let batch = self.take_batch();
        let count = batch.len();
        if count > 0 {
            self.deliver(batch).await;
        }
        count
    }

    async fn deliver(&self, batch: Vec<TelemetryEvent>) {
        let count = batch.len() as u64;
        match self.sink.send_events(&batch).await {
            Ok(()) => {
                self.metrics.record_flush("success");
                self.metrics.record_events("flushed", count);
                info!(count, "Flushed telemetry batch");
            }
            Err(e) => {
                self.metrics.record_flush("failure");
                self.metrics.record_events("lost", count);
                let err = DiagnosticsError::Flush {
                    events: batch.len(),
                    message: format!("{e:#}"),
                };
                self.error_handler.handle_error(
                    ErrorCause::from_std(&err),
                    ErrorSeverity::Medium,
                    Some(json!({ "context": "telemetry_flush" })),
                );
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts the periodic flush timer.
    ///
    /// The first flush happens one interval after start. Calling `start` on
    /// a running manager does nothing.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut timer = self.lock_timer();
        if timer.is_some() {
            return Ok(());
        }

        anyhow::ensure!(
            !self.flush_interval.is_zero(),
            "Telemetry flush interval must be greater than zero"
        );
        let runtime = tokio::runtime::Handle::try_current()
            .context("Telemetry flush timer requires a tokio runtime")?;
        // First tick is one period after this call, not after the task's first poll
        let period = self.flush_interval;
        let mut interval = {
            let _guard = runtime.enter();
            tokio::time::interval_at(Instant::now() + period, period)
        };
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = CancellationToken::new();
        let handle = runtime.spawn(run_flush_timer(
            Arc::downgrade(self),
            interval,
            shutdown.clone(),
        ));

        info!(
            interval_secs = self.flush_interval.as_secs(),
            "Telemetry flush timer started"
        );
        *timer = Some(FlushTimer { shutdown, handle });
        Ok(())
    }

    /// Stops the flush timer and waits for it to exit.
    ///
    /// Pending events stay buffered; call [`flush`](Self::flush) to send them.
    pub async fn stop(&self) {
        let timer = self.lock_timer().take();
        if let Some(FlushTimer { shutdown, handle }) = timer {
            shutdown.cancel();
            if let Err(e) = handle.await {
                debug!(error = %e, "Telemetry flush timer ended abnormally");
            }
            info!("Telemetry flush timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_timer().is_some()
    }
}

async fn run_flush_timer(
    manager: Weak<TelemetryManager>,
    mut interval: Interval,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let batch = manager.take_batch();
                if batch.is_empty() {
                    continue;
                }
                debug!(count = batch.len(), "Telemetry flush tick");
                tokio::spawn(async move {
                    manager.deliver(batch).await;
                });
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, Harness};

    fn manager(h: &Harness) -> Arc<TelemetryManager> {
        Arc::new(TelemetryManager::new(
            h.flags.clone(),
            h.errors.clone(),
            h.reporter.clone(),
            h.metrics.clone(),
        ))
    }

    fn allow_all(h: &Harness) {
        for flag in [
            GateFlag::AllowTelemetry,
            GateFlag::AllowCrashReports,
            GateFlag::AllowUsageData,
        ] {
            h.flags.set(flag, true);
        }
    }

    fn names(events: &[TelemetryEvent]) -> Vec<String> {
        events.iter().map(|e| e.name.clone()).collect()
    }

    #[test]
    fn test_track_event_requires_consent() {
        let h = Harness::new();
        let telemetry = manager(&h);

        assert!(!telemetry.track_event("startup", Properties::new(), Measurements::new()));
        assert!(telemetry.is_empty());

        h.flags.set(GateFlag::AllowTelemetry, true);
        assert!(telemetry.track_event("startup", Properties::new(), Measurements::new()));
        assert_eq!(names(&telemetry.events()), vec!["startup"]);
    }

    #[test]
    fn test_revoked_consent_leaves_buffer_untouched() {
        let h = Harness::new();
        let telemetry = manager(&h);
        h.flags.set(GateFlag::AllowTelemetry, true);
        telemetry.track_event("kept", Properties::new(), Measurements::new());

        h.flags.set(GateFlag::AllowTelemetry, false);
        let before = telemetry.events();
        for _ in 0..5 {
            telemetry.track_event("dropped", Properties::new(), Measurements::new());
        }
        assert_eq!(telemetry.events(), before);
    }

    #[test]
    fn test_unreadable_flag_denies() {
        let h = Harness::new();
        let telemetry = manager(&h);
        h.flags.fail(GateFlag::AllowTelemetry);
        assert!(!telemetry.track_event("x", Properties::new(), Measurements::new()));
    }

    #[test]
    fn test_track_error_properties() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);

        let cause = ErrorCause::new("connection reset").with_stack("at stream()");
        telemetry.track_error(cause, Some(json!({"model": "llama-3"})));

        let events = telemetry.events_by_type("error");
        assert_eq!(events.len(), 1);
        let props = &events[0].properties;
        assert_eq!(props["error"], "connection reset");
        assert_eq!(props["stack"], "at stream()");
        assert_eq!(props["context"], json!({"model": "llama-3"}));
    }

    #[test]
    fn test_track_error_needs_both_flags() {
        let h = Harness::new();
        let telemetry = manager(&h);

        h.flags.set(GateFlag::AllowTelemetry, true);
        assert!(!telemetry.track_error("x", None));

        h.flags.set(GateFlag::AllowTelemetry, false);
        h.flags.set(GateFlag::AllowCrashReports, true);
        assert!(!telemetry.track_error("x", None));
        assert!(telemetry.is_empty());
    }

    #[test]
    fn test_track_performance() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);

        telemetry.track_performance("completion", 412.5, true);

        let event = &telemetry.events()[0];
        assert_eq!(event.name, "performance");
        assert_eq!(event.properties["operation"], "completion");
        assert_eq!(event.properties["success"], true);
        assert_eq!(event.measurements["duration"], 412.5);
    }

    #[test]
    fn test_track_feature_usage() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);
        h.flags.set(GateFlag::AllowUsageData, false);

        assert!(!telemetry.track_feature_usage("chat", "open"));
        assert!(!telemetry.track_performance("completion", 1.0, false));

        h.flags.set(GateFlag::AllowUsageData, true);
        assert!(telemetry.track_feature_usage("chat", "open"));
        let event = &telemetry.events()[0];
        assert_eq!(event.name, "feature_usage");
        assert_eq!(event.properties["feature"], "chat");
        assert_eq!(event.properties["action"], "open");
    }

    #[test]
    fn test_buffer_overflow_keeps_newest() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);

        for i in 0..1005 {
            telemetry.track_event(format!("e{i}"), Properties::new(), Measurements::new());
        }
        let events = telemetry.events();
        assert_eq!(events.len(), 1000);
        assert_eq!(events[0].name, "e5");
        assert_eq!(events[999].name, "e1004");
        assert_eq!(
            h.metrics
                .telemetry_events_total
                .with_label_values(&["evicted"])
                .get(),
            5
        );
    }

    #[test]
    fn test_queries() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);
        for i in 0..12 {
            telemetry.track_feature_usage("chat", &format!("a{i}"));
        }
        telemetry.track_performance("load", 1.0, true);

        assert_eq!(telemetry.events_by_type("feature_usage").len(), 12);
        let recent = telemetry.recent_events(DEFAULT_RECENT_COUNT);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[9].name, "performance");

        telemetry.clear_events();
        assert!(telemetry.is_empty());
    }

    #[tokio::test]
    async fn test_flush_sends_batch_in_order() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);
        for i in 0..3 {
            telemetry.track_event(format!("e{i}"), Properties::new(), Measurements::new());
        }

        assert_eq!(telemetry.flush().await, 3);

        let batches = h.reporter.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(names(&batches[0]), vec!["e0", "e1", "e2"]);
        assert!(telemetry.is_empty());
    }

    #[tokio::test]
    async fn test_empty_flush_skips_send() {
        let h = Harness::new();
        let telemetry = manager(&h);
        assert_eq!(telemetry.flush().await, 0);
        assert!(h.reporter.batches().is_empty());
    }

    #[tokio::test]
    async fn test_events_tracked_during_send_go_to_next_batch() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);
        h.reporter.hold_sends(true);

        telemetry.track_event("first", Properties::new(), Measurements::new());
        let in_flight = {
            let telemetry = Arc::clone(&telemetry);
            tokio::spawn(async move { telemetry.flush().await })
        };
        h.reporter.wait_for_batches(1).await;

        telemetry.track_event("second", Properties::new(), Measurements::new());
        assert_eq!(names(&telemetry.events()), vec!["second"]);

        h.reporter.release();
        assert_eq!(in_flight.await.unwrap(), 1);

        h.reporter.hold_sends(false);
        telemetry.flush().await;
        let batches = h.reporter.batches();
        assert_eq!(names(&batches[0]), vec!["first"]);
        assert_eq!(names(&batches[1]), vec!["second"]);
    }

    #[tokio::test]
    async fn test_flush_failure_routed_to_error_handler() {
        let h = Harness::new();
        let telemetry = manager(&h);
        allow_all(&h);
        h.reporter.fail_sends(true);
        telemetry.track_event("e", Properties::new(), Measurements::new());

        telemetry.flush().await;

        let errors = h.errors.error_log();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].severity, ErrorSeverity::Medium);
        assert_eq!(errors[0].context, Some(json!({"context": "telemetry_flush"})));
        assert!(errors[0].message.contains("collector returned 503"));
        assert!(telemetry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_each_interval() {
        let h = Harness::new();
        let telemetry = Arc::new(
            TelemetryManager::new(
                h.flags.clone(),
                h.errors.clone(),
                h.reporter.clone(),
                h.metrics.clone(),
            )
            .with_flush_interval(Duration::from_secs(60)),
        );
        allow_all(&h);
        telemetry.start().unwrap();
        assert!(telemetry.is_running());

        telemetry.track_event("a", Properties::new(), Measurements::new());
        settle().await;
        assert!(h.reporter.batches().is_empty(), "no flush at start");

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(h.reporter.batches().len(), 1);

        telemetry.track_event("b", Properties::new(), Measurements::new());
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        let batches = h.reporter.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(names(&batches[1]), vec!["b"]);

        telemetry.stop().await;
        assert!(!telemetry.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_flush_one_period_after_start() {
        let h = Harness::new();
        let telemetry = Arc::new(
            TelemetryManager::new(
                h.flags.clone(),
                h.errors.clone(),
                h.reporter.clone(),
                h.metrics.clone(),
            )
            .with_flush_interval(Duration::from_secs(30)),
        );
        allow_all(&h);
        telemetry.start().unwrap();
        telemetry.track_event("e1", Properties::new(), Measurements::new());

        // No yield between start and advance: the timer task has not run yet
        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;

        let batches = h.reporter.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(names(&batches[0]), vec!["e1"]);
        telemetry.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_survives_send_failures() {
        let h = Harness::new();
        let telemetry = Arc::new(
            TelemetryManager::new(
                h.flags.clone(),
                h.errors.clone(),
                h.reporter.clone(),
                h.metrics.clone(),
            )
            .with_flush_interval(Duration::from_secs(10)),
        );
        allow_all(&h);
        h.reporter.fail_sends(true);
        telemetry.start().unwrap();

        for _ in 0..3 {
            telemetry.track_event("e", Properties::new(), Measurements::new());
            tokio::time::advance(Duration::from_secs(10)).await;
            settle().await;
        }

        assert_eq!(h.reporter.batches().len(), 3);
        assert_eq!(h.errors.len(), 3);
        assert!(telemetry.is_running());
        telemetry.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_idempotent() {
        let h = Harness::new();
        let telemetry = manager(&h);
        telemetry.start().unwrap();
        telemetry.start().unwrap();
        telemetry.stop().await;
        telemetry.stop().await;
        assert!(!telemetry.is_running());
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let h = Harness::new();
        let telemetry = Arc::new(
            TelemetryManager::new(
                h.flags.clone(),
                h.errors.clone(),
                h.reporter.clone(),
                h.metrics.clone(),
            )
            .with_flush_interval(Duration::ZERO),
        );
        assert!(telemetry.start().is_err());
        assert!(!telemetry.is_running());
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let h = Harness::new();
        let telemetry = manager(&h);
        assert!(telemetry.start().is_err());
        assert!(!telemetry.is_running());
    }
}
