//! Notification sink port (driven/secondary port)
//!
//! This module defines the interface for surfacing messages to the user
//! through the host editor: transient toasts, persistent alerts, or modal
//! dialogs.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because notification delivery is adapter-specific.
//! - Notifications are fire-and-forget. `notify` must return without waiting
//!   for the user, even for [`NotificationModality::BlockingError`]; the
//!   host decides how the dialog is shown.
//! - Callers log and swallow delivery failures.

use serde::{Deserialize, Serialize};

/// How prominently a notification is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationModality {
    /// Transient informational message
    Info,
    /// Transient warning
    Warning,
    /// Persistent error alert
    Error,
    /// Modal error that demands acknowledgement
    BlockingError,
}

impl std::fmt::Display for NotificationModality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationModality::Info => "info",
            NotificationModality::Warning => "warning",
            NotificationModality::Error => "error",
            NotificationModality::BlockingError => "blocking-error",
        };
        write!(f, "{}", s)
    }
}

/// A notification to display to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text shown to the user
    pub message: String,
    /// Display modality
    pub modality: NotificationModality,
}

impl Notification {
    pub fn new(message: impl Into<String>, modality: NotificationModality) -> Self {
        Self {
            message: message.into(),
            modality,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, NotificationModality::Info)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, NotificationModality::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, NotificationModality::Error)
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self::new(message, NotificationModality::BlockingError)
    }
}

/// Port trait for host notifications
///
/// ## Implementation Notes
///
/// - `notify` is called while the caller may hold internal locks, so it must
///   not block on user interaction or call back into the pipeline.
/// - Implementations should handle a missing UI (headless host) by returning
///   an error or silently succeeding, never by panicking.
pub trait INotificationSink: Send + Sync {
    /// Shows a notification to the user
    ///
    /// # Arguments
    /// * `notification` - The message and its modality
    fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
