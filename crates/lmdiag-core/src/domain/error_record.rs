//! Error records and correlation codes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::severity::ErrorSeverity;

/// Message and optional stack of an error attached to a log entry or record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCause {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorCause {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Builds a cause from any standard error, rendering its `source()` chain
    /// as the stack.
    pub fn from_std(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(inner) = source {
            chain.push(format!("caused by: {inner}"));
            source = inner.source();
        }
        Self {
            message: error.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl From<&str> for ErrorCause {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ErrorCause {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&anyhow::Error> for ErrorCause {
    fn from(error: &anyhow::Error) -> Self {
        let chain: Vec<String> = error
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {cause}"))
            .collect();
        Self {
            message: error.to_string(),
            stack: (!chain.is_empty()).then(|| chain.join("\n")),
        }
    }
}

impl From<anyhow::Error> for ErrorCause {
    fn from(error: anyhow::Error) -> Self {
        Self::from(&error)
    }
}

/// Correlation code of the form `ERR-<base36 millis>-<5 random chars>`.
///
/// Codes are meant for matching log lines with notifications and reports.
/// They are not guaranteed unique: two codes generated in the same
/// millisecond collide only if their random suffixes also match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(String);

impl ErrorCode {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis().max(0) as u64;
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(5).collect();
        Self(format!("ERR-{}-{}", to_base36(millis), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// A handled error as kept in the error handler's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub severity: ErrorSeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ErrorRecord {
    /// Creates a record stamped with the current time and a fresh code.
    pub fn new(cause: ErrorCause, severity: ErrorSeverity, context: Option<Value>) -> Self {
        let timestamp = Utc::now();
        Self {
            code: ErrorCode::generate(timestamp),
            message: cause.message,
            severity,
            timestamp,
            stack: cause.stack,
            context,
        }
    }

    /// Text shown to the user: `[<code>] <message>`.
    pub fn display_message(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }

    pub fn cause(&self) -> ErrorCause {
        ErrorCause {
            message: self.message.clone(),
            stack: self.stack.clone(),
        }
    }
}
