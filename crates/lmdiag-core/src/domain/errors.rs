//! Pipeline error types
//!
//! None of these ever reach a caller of the public logging or tracking
//! operations: log store failures degrade the logger, flush failures are
//! routed into the error handler, and config read failures read as `false`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised inside the diagnostics pipeline
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// Log directory creation or log file append failed
    #[error("Failed to write log store at {path}: {source}")]
    LogWrite {
        /// The directory or file being written
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The reporting sink rejected a telemetry batch
    #[error("Telemetry flush of {events} events failed: {message}")]
    Flush {
        /// Size of the batch that was lost
        events: usize,
        /// Rendered sink error
        message: String,
    },

    /// A gating flag could not be read from the configuration source
    #[error("Failed to read configuration flag {flag}: {message}")]
    ConfigRead {
        /// Host-facing flag key, e.g. `allowTelemetry`
        flag: String,
        message: String,
    },

    /// Unknown log level name
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),
}
