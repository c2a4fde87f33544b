//! Domain types for the diagnostics pipeline
//!
//! - Log levels and error severities with their fixed orderings
//! - Log entries and their on-disk line format
//! - Error records and correlation codes
//! - Telemetry events
//! - The fixed-capacity FIFO ring buffer used by every component
//! - Pipeline error taxonomy

pub mod error_record;
pub mod errors;
pub mod log_entry;
pub mod ring_buffer;
pub mod severity;
pub mod telemetry_event;

pub use error_record::{ErrorCause, ErrorCode, ErrorRecord};
pub use errors::DiagnosticsError;
pub use log_entry::LogEntry;
pub use ring_buffer::RingBuffer;
pub use severity::{ErrorSeverity, LogLevel};
pub use telemetry_event::{Measurements, Properties, TelemetryEvent};
