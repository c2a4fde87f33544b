//! DiagnosticsContext - one wired set of diagnostics components
//!
//! Built once by the host and passed by reference. Every context owns its
//! own logger, buffers and metrics registry, so several can coexist in one
//! process (tests create one each).

use std::path::Path;
use std::sync::Arc;

use lmdiag_core::{
    config::Config,
    ports::{IConfigProvider, INotificationSink, IOutputChannel, IReportingSink},
};
use lmdiag_log::Logger;
use tracing::info;

use crate::error_handler::ErrorHandler;
use crate::metrics::MetricsRegistry;
use crate::performance::PerformanceMonitor;
use crate::telemetry::TelemetryManager;

/// Host-provided adapters for every outbound port.
#[derive(Clone)]
pub struct DiagnosticsSinks {
    /// Source of the gating flags, read on every gated operation
    pub flags: Arc<dyn IConfigProvider>,
    pub output: Arc<dyn IOutputChannel>,
    pub notifier: Arc<dyn INotificationSink>,
    pub reporter: Arc<dyn IReportingSink>,
}

pub struct DiagnosticsContext {
    logger: Arc<Logger>,
    error_handler: Arc<ErrorHandler>,
    performance: Arc<PerformanceMonitor>,
    telemetry: Arc<TelemetryManager>,
    metrics: Arc<MetricsRegistry>,
}

impl DiagnosticsContext {
    /// Builds every component from `config`, resolving the log file
    /// against `workspace_root`.
    pub fn new(
        config: &Config,
        workspace_root: &Path,
        sinks: DiagnosticsSinks,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsRegistry::new()?);

        let logger = Arc::new(
            Logger::new(
                config.log_file(workspace_root),
                Arc::clone(&sinks.output),
                Arc::clone(&sinks.notifier),
            )
            .with_level(config.log_level()),
        );

        let error_handler = Arc::new(
            ErrorHandler::new(
                Arc::clone(&sinks.flags),
                Arc::clone(&logger),
                Arc::clone(&sinks.notifier),
                Arc::clone(&sinks.reporter),
                Arc::clone(&metrics),
            )
            .with_capacity(config.errors.max_records),
        );

        let performance = Arc::new(
            PerformanceMonitor::new(Arc::clone(&logger), Arc::clone(&metrics))
                .with_slow_threshold(config.slow_threshold())
                .with_max_samples(config.performance.max_samples_per_operation),
        );

        let telemetry = Arc::new(
            TelemetryManager::new(
                Arc::clone(&sinks.flags),
                Arc::clone(&error_handler),
                Arc::clone(&sinks.reporter),
                Arc::clone(&metrics),
            )
            .with_capacity(config.telemetry.max_events)
            .with_flush_interval(config.flush_interval()),
        );

        info!(
            log_file = %logger.log_file().display(),
            level = %logger.log_level(),
            "Diagnostics context created"
        );

        Ok(Self {
            logger,
            error_handler,
            performance,
            telemetry,
            metrics,
        })
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.performance
    }

    pub fn telemetry(&self) -> &Arc<TelemetryManager> {
        &self.telemetry
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Starts background work (the telemetry flush timer).
    pub fn start(&self) -> anyhow::Result<()> {
        self.telemetry.start()
    }

    /// Stops the flush timer and sends whatever is still buffered.
    ///
    /// Returns the number of events handed to the reporting sink.
    pub async fn shutdown(&self) -> usize {
        self.telemetry.stop().await;
        let flushed = self.telemetry.flush().await;
        info!(flushed, "Diagnostics context shut down");
        flushed
    }
}
