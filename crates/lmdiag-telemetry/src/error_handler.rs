//! Severity-tiered error handling
//!
//! [`ErrorHandler::handle_error`] runs a fixed sequence for every error:
//!
//! 1. build an [`ErrorRecord`] with a fresh correlation code
//! 2. push it into the bounded error log (oldest evicted on overflow)
//! 3. write a log entry through the [`Logger`], regardless of its minimum level
//! 4. if `showNotifications`, notify with a modality chosen by severity
//! 5. if `allowCrashReports`, forward the record to the reporting sink in a
//!    background task whose failures are only traced
//!
//! Notification suppression only affects visibility: steps 2, 3 and 5 run
//! regardless of the notification flag.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lmdiag_core::{
    domain::{ErrorCause, ErrorRecord, ErrorSeverity, RingBuffer},
    ports::{
        read_flag, GateFlag, IConfigProvider, INotificationSink, IReportingSink, Notification,
        NotificationModality,
    },
};
use lmdiag_log::Logger;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::metrics::MetricsRegistry;

/// Default capacity of the error log.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// Default count for [`ErrorHandler::recent_errors`].
pub const DEFAULT_RECENT_COUNT: usize = 10;

/// Notification modality for an error of `severity`.
pub fn modality_for(severity: ErrorSeverity) -> NotificationModality {
    match severity {
        ErrorSeverity::Critical => NotificationModality::BlockingError,
        ErrorSeverity::High => NotificationModality::Error,
        ErrorSeverity::Medium => NotificationModality::Warning,
        ErrorSeverity::Low => NotificationModality::Info,
    }
}

/// Classifies, records, and surfaces handled errors.
pub struct ErrorHandler {
    config: Arc<dyn IConfigProvider>,
    logger: Arc<Logger>,
    notifier: Arc<dyn INotificationSink>,
    reporter: Arc<dyn IReportingSink>,
    metrics: Arc<MetricsRegistry>,
    log: Mutex<RingBuffer<ErrorRecord>>,
}

impl ErrorHandler {
    pub fn new(
        config: Arc<dyn IConfigProvider>,
        logger: Arc<Logger>,
        notifier: Arc<dyn INotificationSink>,
        reporter: Arc<dyn IReportingSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            logger,
            notifier,
            reporter,
            metrics,
            log: Mutex::new(RingBuffer::new(DEFAULT_MAX_RECORDS)),
        }
    }

    /// Replaces the error log with an empty one holding `capacity` records.
    pub fn with_capacity(self, capacity: usize) -> Self {
        *self.lock() = RingBuffer::new(capacity);
        self
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<ErrorRecord>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles an error and returns the record that was stored.
    ///
    /// Pass [`ErrorSeverity::default()`] (MEDIUM) when the caller has no
    /// better classification.
    pub fn handle_error(
        &self,
        error: impl Into<ErrorCause>,
        severity: ErrorSeverity,
        context: Option<Value>,
    ) -> ErrorRecord {
        let record = ErrorRecord::new(error.into(), severity, context);

        {
            let mut log = self.lock();
            if let Some(evicted) = log.push(record.clone()) {
                trace!(code = %evicted.code, "Evicted oldest error record");
            }
            self.metrics.set_buffer_len("errors", log.len());
        }
        self.metrics.record_error(severity.as_str());

        self.write_log_entry(&record);
        self.show_notification(&record);
        self.report(&record);

        record
    }

    fn write_log_entry(&self, record: &ErrorRecord) {
        let mut message = record.display_message();
        if let Some(context) = &record.context {
            message.push_str(&format!(" (Context: {context})"));
        }
        let cause = record.stack.as_ref().map(|_| record.cause());
        self.logger
            .append_unfiltered(record.severity.log_level(), message, cause);
    }

    fn show_notification(&self, record: &ErrorRecord) {
        if !read_flag(self.config.as_ref(), GateFlag::ShowNotifications) {
            return;
        }

        let modality = modality_for(record.severity);
        let notification = Notification::new(record.display_message(), modality);
        match self.notifier.notify(&notification) {
            Ok(()) => self.metrics.record_notification(&modality.to_string()),
            Err(e) => warn!(code = %record.code, error = %e, "Failed to show error notification"),
        }
    }

    fn report(&self, record: &ErrorRecord) {
        if !read_flag(self.config.as_ref(), GateFlag::AllowCrashReports) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(code = %record.code, "No async runtime, skipping error report");
            return;
        };

        let reporter = Arc::clone(&self.reporter);
        let record = record.clone();
        runtime.spawn(async move {
            if let Err(e) = reporter.report_error(&record).await {
                warn!(code = %record.code, error = %e, "Failed to send error report");
            }
        });
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of the whole error log, oldest first.
    pub fn error_log(&self) -> Vec<ErrorRecord> {
        self.lock().snapshot()
    }

    /// Records whose severity is exactly `severity`, oldest first.
    pub fn errors_by_severity(&self, severity: ErrorSeverity) -> Vec<ErrorRecord> {
        self.lock().filtered(|record| record.severity == severity)
    }

    /// The last `count` records in insertion order.
    pub fn recent_errors(&self, count: usize) -> Vec<ErrorRecord> {
        self.lock().tail(count)
    }

    pub fn clear_error_log(&self) {
        let mut log = self.lock();
        log.clear();
        self.metrics.set_buffer_len("errors", 0);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
