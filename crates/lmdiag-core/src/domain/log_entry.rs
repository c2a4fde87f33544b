//! Log entries and their line format
//!
//! An entry renders as one header line
//! `[<ISO-8601 timestamp>] [<LEVEL>] <message>`, followed by
//! `Error: <message>` and `Stack: <stack>` when an error is attached.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::error_record::ErrorCause;
use super::severity::LogLevel;

/// Rendered in place of a missing stack trace.
pub const MISSING_STACK: &str = "<unavailable>";

/// A single written log entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub error: Option<ErrorCause>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, error: Option<ErrorCause>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            error,
        }
    }

    /// Header line, e.g. `[2026-10-14T08:30:00.123Z] [INFO] Server connected`.
    pub fn header_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.message
        )
    }

    /// All lines of the entry in write order.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.header_line()];
        if let Some(error) = &self.error {
            lines.push(format!("Error: {}", error.message));
            lines.push(format!(
                "Stack: {}",
                error.stack.as_deref().unwrap_or(MISSING_STACK)
            ));
        }
        lines
    }
}
