//! Logger - level-filtered structured log writer
//!
//! Every passing entry goes to three sinks, in this order:
//! 1. the persistent [`LogStore`] (one header line plus optional error lines)
//! 2. the host's live [`IOutputChannel`], same lines
//! 3. for ERROR/CRITICAL only, the [`INotificationSink`]
//!
//! All three happen under one lock, so concurrent callers never interleave
//! their lines. Each sink is attempted independently: a failing log file
//! never suppresses the live output, and notification failures are logged
//! via `tracing::warn!` and swallowed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lmdiag_core::{
    domain::{ErrorCause, LogEntry, LogLevel},
    ports::{INotificationSink, IOutputChannel, Notification},
};

use crate::store::LogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Threshold applies; ERROR/CRITICAL are forwarded to the notifier
    Notify,
    /// Threshold applies; never notifies
    Filtered,
}

struct LoggerState {
    min_level: LogLevel,
    store: LogStore,
}

/// Append-only structured logger with a configurable minimum level.
pub struct Logger {
    state: Mutex<LoggerState>,
    output: Arc<dyn IOutputChannel>,
    notifier: Arc<dyn INotificationSink>,
}

impl Logger {
    /// Creates a logger writing to `log_file`, with the default INFO threshold.
    ///
    /// The log file and its directory are created on the first passing entry.
    pub fn new(
        log_file: impl Into<PathBuf>,
        output: Arc<dyn IOutputChannel>,
        notifier: Arc<dyn INotificationSink>,
    ) -> Self {
        Self {
            state: Mutex::new(LoggerState {
                min_level: LogLevel::default(),
                store: LogStore::new(log_file),
            }),
            output,
            notifier,
        }
    }

    /// Sets the initial minimum level.
    pub fn with_level(self, level: LogLevel) -> Self {
        self.set_log_level(level);
        self
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.lock().min_level = level;
    }

    pub fn log_level(&self) -> LogLevel {
        self.lock().min_level
    }

    pub fn log_file(&self) -> PathBuf {
        self.lock().store.path().to_path_buf()
    }

    /// Whether the persistent store was disabled by a write failure.
    pub fn is_persistent(&self) -> bool {
        !self.lock().store.is_disabled()
    }

    /// Writes an entry to all sinks.
    ///
    /// Returns the written entry, or `None` when `level` is below the
    /// threshold (in which case nothing at all happens).
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<ErrorCause>,
    ) -> Option<LogEntry> {
        self.write(level, message.into(), error, WriteMode::Notify)
    }

    /// Writes an entry to the log store and live output without forwarding
    /// it to the notification sink.
    ///
    /// Used by callers that run their own notification step.
    pub fn append(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<ErrorCause>,
    ) -> Option<LogEntry> {
        self.write(level, message.into(), error, WriteMode::Filtered)
    }

    /// Like [`append`](Self::append), but ignores the minimum level.
    ///
    /// Used for entries that must always be recorded, such as handled errors.
    pub fn append_unfiltered(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        error: Option<ErrorCause>,
    ) -> LogEntry {
        let mut state = self.lock();
        let entry = LogEntry::new(level, message, error);
        self.emit(&mut state, &entry);
        entry
    }

    fn write(
        &self,
        level: LogLevel,
        message: String,
        error: Option<ErrorCause>,
        mode: WriteMode,
    ) -> Option<LogEntry> {
        let mut state = self.lock();
        if level < state.min_level {
            return None;
        }

        let entry = LogEntry::new(level, message, error);
        self.emit(&mut state, &entry);

        if mode == WriteMode::Notify && level.is_alerting() {
            if let Err(e) = self.notifier.notify(&Notification::error(entry.message.clone())) {
                tracing::warn!(error = %e, "Failed to forward log entry to notification sink");
            }
        }

        Some(entry)
    }

    /// Writes `entry` to the store and the live output.
    fn emit(&self, state: &mut LoggerState, entry: &LogEntry) {
        let lines = entry.lines();

        if let Err(e) = state.store.append(&lines) {
            let notice = LogEntry::new(
                LogLevel::Error,
                format!("Persistent logging disabled, continuing with live output only: {e}"),
                None,
            );
            self.output.append_line(&notice.header_line());
        }

        for line in &lines {
            self.output.append_line(line);
        }
    }

    // ========================================================================
    // Convenience methods
    // ========================================================================

    pub fn debug(&self, message: impl Into<String>) -> Option<LogEntry> {
        self.log(LogLevel::Debug, message, None)
    }

    pub fn info(&self, message: impl Into<String>) -> Option<LogEntry> {
        self.log(LogLevel::Info, message, None)
    }

    pub fn warning(&self, message: impl Into<String>) -> Option<LogEntry> {
        self.log(LogLevel::Warning, message, None)
    }

    pub fn error(&self, message: impl Into<String>, error: Option<ErrorCause>) -> Option<LogEntry> {
        self.log(LogLevel::Error, message, error)
    }

    pub fn critical(
        &self,
        message: impl Into<String>,
        error: Option<ErrorCause>,
    ) -> Option<LogEntry> {
        self.log(LogLevel::Critical, message, error)
    }

    /// Brings the live output channel into view.
    pub fn show_output(&self) {
        self.output.show();
    }
}
