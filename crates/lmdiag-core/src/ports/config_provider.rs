//! Configuration source port
//!
//! Flags are read through on every gated operation; nothing caches them.
//! A failed read is never an error for the caller: [`read_flag`] treats it
//! as `false`, so an unreadable configuration denies every consent scope.

use tracing::debug;

use crate::domain::DiagnosticsError;

/// Boolean flags that gate observable side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateFlag {
    /// Error handler shows UI notifications
    ShowNotifications,
    /// Error reports and `track_error` events may leave the process
    AllowCrashReports,
    /// Any telemetry event may be buffered
    AllowTelemetry,
    /// Performance and feature-usage events may be buffered
    AllowUsageData,
}

impl GateFlag {
    /// Key used by the host configuration.
    pub fn key(&self) -> &'static str {
        match self {
            GateFlag::ShowNotifications => "showNotifications",
            GateFlag::AllowCrashReports => "allowCrashReports",
            GateFlag::AllowTelemetry => "allowTelemetry",
            GateFlag::AllowUsageData => "allowUsageData",
        }
    }
}

impl std::fmt::Display for GateFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Port trait for the host's configuration source
pub trait IConfigProvider: Send + Sync {
    /// Reads the current value of `flag`.
    fn read_flag(&self, flag: GateFlag) -> anyhow::Result<bool>;
}

/// Reads `flag`, mapping any failure to `false`.
pub fn read_flag(provider: &dyn IConfigProvider, flag: GateFlag) -> bool {
    match provider.read_flag(flag) {
        Ok(value) => value,
        Err(e) => {
            let err = DiagnosticsError::ConfigRead {
                flag: flag.key().to_string(),
                message: format!("{e:#}"),
            };
            debug!(error = %err, "Treating unreadable flag as disabled");
            false
        }
    }
}
