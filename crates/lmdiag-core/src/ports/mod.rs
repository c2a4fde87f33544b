//! Port definitions (host-facing interfaces)
//!
//! The pipeline never depends on host UI or transport internals. Everything
//! it reads or writes outside the process goes through one of these traits,
//! implemented by the host (or by the adapters in `lmdiag-daemon`).
//!
//! ## Ports Overview
//!
//! - [`IConfigProvider`] - Boolean gating flags, read on every use
//! - [`IOutputChannel`] - Live text sink mirroring the log file
//! - [`INotificationSink`] - User-facing notifications by modality
//! - [`IReportingSink`] - External destination for telemetry batches and error reports

pub mod config_provider;
pub mod notification;
pub mod output;
pub mod reporting;

pub use config_provider::{read_flag, GateFlag, IConfigProvider};
pub use notification::{INotificationSink, Notification, NotificationModality};
pub use output::IOutputChannel;
pub use reporting::IReportingSink;
