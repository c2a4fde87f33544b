//! External reporting sink port
//!
//! The destination for flushed telemetry batches and forwarded error
//! reports. The transport is entirely the adapter's concern; the pipeline
//! never retries and never applies a timeout.

use async_trait::async_trait;

use crate::domain::{ErrorRecord, TelemetryEvent};

/// Port trait for the external reporting backend
///
/// ## Implementation Notes
///
/// - `send_events` receives a whole batch in buffer order. Once it is
///   called the batch is no longer held anywhere else in the pipeline.
/// - `report_error` is fire-and-forget from the error handler's side;
///   its result is only logged.
#[async_trait]
pub trait IReportingSink: Send + Sync {
    /// Delivers a batch of telemetry events.
    async fn send_events(&self, batch: &[TelemetryEvent]) -> anyhow::Result<()>;

    /// Delivers a single error report.
    async fn report_error(&self, record: &ErrorRecord) -> anyhow::Result<()>;
}
