//! LMDiag Telemetry - error handling, performance monitoring and telemetry
//!
//! Provides:
//! - `ErrorHandler`: severity-tiered error capture, notification and reporting
//! - `PerformanceMonitor`: operation timing with per-operation aggregates
//! - `TelemetryManager`: consent-gated event buffer with periodic flush
//! - `MetricsRegistry`: Prometheus counters, gauges and histograms
//! - `DiagnosticsContext`: one wired instance of all of the above

pub mod context;
pub mod error_handler;
pub mod metrics;
pub mod performance;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use context::{DiagnosticsContext, DiagnosticsSinks};
pub use error_handler::ErrorHandler;
pub use metrics::MetricsRegistry;
pub use performance::{AggregateStats, OperationMetrics, OperationTimer, PerformanceMonitor};
pub use telemetry::TelemetryManager;
