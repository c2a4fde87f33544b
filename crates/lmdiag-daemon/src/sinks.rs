//! Console and file adapters for the diagnostics ports
//!
//! - [`ConsoleOutput`]: live log lines on stdout
//! - [`TracingNotifier`]: notifications rendered as tracing events
//! - [`JsonlReporter`]: telemetry batches and error reports appended to a
//!   JSON Lines spool file

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use lmdiag_core::{
    domain::{ErrorRecord, TelemetryEvent},
    ports::{INotificationSink, IOutputChannel, IReportingSink, Notification, NotificationModality},
};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Writes live log lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl IOutputChannel for ConsoleOutput {
    fn append_line(&self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not take the logger down with it
        let _ = writeln!(stdout, "{line}");
    }

    fn show(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Shows notifications as tracing events at a matching level.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl INotificationSink for TracingNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let message = notification.message.as_str();
        match notification.modality {
            NotificationModality::Info => info!(target: "lmdiag::notify", "{message}"),
            NotificationModality::Warning => warn!(target: "lmdiag::notify", "{message}"),
            NotificationModality::Error => error!(target: "lmdiag::notify", "{message}"),
            NotificationModality::BlockingError => {
                error!(target: "lmdiag::notify", blocking = true, "{message}")
            }
        }
        Ok(())
    }
}

/// Appends every outbound payload to a JSON Lines file.
///
/// Each line is an object with a `type` of `telemetry` or `error_report`.
#[derive(Debug, Clone)]
pub struct JsonlReporter {
    path: PathBuf,
}

impl JsonlReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Spool file under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lmdiag")
            .join("reports.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, lines: Vec<String>) -> anyhow::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let mut buf = lines.join("\n");
        buf.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(buf.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl IReportingSink for JsonlReporter {
    async fn send_events(&self, batch: &[TelemetryEvent]) -> anyhow::Result<()> {
        let lines = batch
            .iter()
            .map(|event| serde_json::to_string(&json!({ "type": "telemetry", "event": event })))
            .collect::<Result<Vec<_>, _>>()?;
        self.append(lines).await?;
        debug!(count = batch.len(), path = %self.path.display(), "Spooled telemetry batch");
        Ok(())
    }

    async fn report_error(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(&json!({ "type": "error_report", "record": record }))?;
        self.append(vec![line]).await?;
        debug!(code = %record.code, "Spooled error report");
        Ok(())
    }
}
