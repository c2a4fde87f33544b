//! In-memory port implementations shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lmdiag_core::{
    domain::{ErrorRecord, TelemetryEvent},
    ports::{GateFlag, IConfigProvider, INotificationSink, IOutputChannel, IReportingSink, Notification},
};
use lmdiag_log::Logger;
use tokio::sync::Notify;

use crate::error_handler::ErrorHandler;
use crate::metrics::MetricsRegistry;

/// Lets spawned tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Flag values that can be flipped mid-test. Unset flags read as `false`.
#[derive(Default)]
pub struct Flags {
    values: Mutex<HashMap<GateFlag, anyhow::Result<bool>>>,
}

impl Flags {
    pub fn set(&self, flag: GateFlag, value: bool) {
        self.values.lock().unwrap().insert(flag, Ok(value));
    }

    pub fn fail(&self, flag: GateFlag) {
        self.values
            .lock()
            .unwrap()
            .insert(flag, Err(anyhow::anyhow!("settings store unavailable")));
    }
}

impl IConfigProvider for Flags {
    fn read_flag(&self, flag: GateFlag) -> anyhow::Result<bool> {
        match self.values.lock().unwrap().get(&flag) {
            Some(Ok(value)) => Ok(*value),
            Some(Err(e)) => Err(anyhow::anyhow!("{e}")),
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct RecordingOutput {
    lines: Mutex<Vec<String>>,
}

impl RecordingOutput {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Number of entry header lines written so far.
    pub fn entry_count(&self) -> usize {
        self.lines().iter().filter(|line| line.starts_with('[')).count()
    }
}

impl IOutputChannel for RecordingOutput {
    fn append_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn show(&self) {}
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    fail_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl INotificationSink for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("host window closed");
        }
        self.notifications.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Reporting sink that records batches and reports.
///
/// With [`hold_sends`](Self::hold_sends) set, `send_events` records the batch
/// and then waits for [`release`](Self::release) before returning.
#[derive(Default)]
pub struct RecordingReporter {
    batches: Mutex<Vec<Vec<TelemetryEvent>>>,
    reports: Mutex<Vec<ErrorRecord>>,
    fail_sends: AtomicBool,
    fail_reports: AtomicBool,
    hold_sends: AtomicBool,
    released: Notify,
    received: Notify,
}

impl RecordingReporter {
    pub fn batches(&self) -> Vec<Vec<TelemetryEvent>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<ErrorRecord> {
        self.reports.lock().unwrap().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reports(&self, fail: bool) {
        self.fail_reports.store(fail, Ordering::SeqCst);
    }

    pub fn hold_sends(&self, hold: bool) {
        self.hold_sends.store(hold, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub async fn wait_for_batches(&self, count: usize) {
        self.wait_until(|| self.batches.lock().unwrap().len() >= count).await;
    }

    pub async fn wait_for_reports(&self, count: usize) {
        self.wait_until(|| self.reports.lock().unwrap().len() >= count).await;
    }

    async fn wait_until(&self, done: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done() {
                // Re-check periodically in case the notification raced the check
                let _ = tokio::time::timeout(Duration::from_millis(10), self.received.notified()).await;
            }
        })
        .await
        .expect("reporting sink was not called in time");
    }
}

#[async_trait]
impl IReportingSink for RecordingReporter {
    async fn send_events(&self, batch: &[TelemetryEvent]) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(batch.to_vec());
        self.received.notify_waiters();
        if self.hold_sends.load(Ordering::SeqCst) {
            self.released.notified().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("collector returned 503");
        }
        Ok(())
    }

    async fn report_error(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        if self.fail_reports.load(Ordering::SeqCst) {
            anyhow::bail!("collector unreachable");
        }
        self.reports.lock().unwrap().push(record.clone());
        self.received.notify_waiters();
        Ok(())
    }
}

/// Logger and error handler wired to recording ports.
///
/// `showNotifications` starts enabled and every other flag disabled.
pub struct Harness {
    pub _dir: tempfile::TempDir,
    pub flags: Arc<Flags>,
    pub output: Arc<RecordingOutput>,
    pub notifier: Arc<RecordingNotifier>,
    pub reporter: Arc<RecordingReporter>,
    pub metrics: Arc<MetricsRegistry>,
    pub logger: Arc<Logger>,
    pub errors: Arc<ErrorHandler>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let flags = Arc::new(Flags::default());
        flags.set(GateFlag::ShowNotifications, true);
        let output = Arc::new(RecordingOutput::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = Arc::new(RecordingReporter::default());
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let logger = Arc::new(Logger::new(
            dir.path().join("logs").join("extension.log"),
            output.clone(),
            notifier.clone(),
        ));
        let errors = Arc::new(ErrorHandler::new(
            flags.clone(),
            logger.clone(),
            notifier.clone(),
            reporter.clone(),
            metrics.clone(),
        ));
        Self {
            _dir: dir,
            flags,
            output,
            notifier,
            reporter,
            metrics,
            logger,
            errors,
        }
    }
}
