//! Configuration module for LMDiag.
//!
//! Typed settings for every pipeline component, read from a YAML file.
//! Missing sections take their defaults; `validate()` reports bad values and
//! `ConfigBuilder` overrides fields in code.
//! [`Config`] and [`FileConfigProvider`] also serve as [`IConfigProvider`]
//! adapters for the gating flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::LogLevel;
use crate::ports::{GateFlag, IConfigProvider};

/// Log file location relative to the workspace root.
pub const DEFAULT_LOG_FILE: &str = ".lmstudio/logs/extension.log";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for LMDiag.
///
/// Every section falls back to its defaults when missing from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ui: UiConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub errors: ErrorsConfig,
    pub telemetry: TelemetryConfig,
    pub performance: PerformanceConfig,
}

/// User interface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Whether handled errors surface as notifications.
    pub show_notifications: bool,
}

/// Consent settings. All scopes are opt-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Forward error reports and `error` events.
    pub allow_crash_reports: bool,
    /// Buffer telemetry events at all.
    pub allow_telemetry: bool,
    /// Buffer `performance` and `feature_usage` events.
    pub allow_usage_data: bool,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: `debug`, `info`, `warning`, `error`, or `critical`.
    pub level: String,
    /// Log file path; relative paths resolve against the workspace root.
    pub file: PathBuf,
}

/// Error handler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Capacity of the error log ring buffer.
    pub max_records: usize,
}

/// Telemetry manager settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Capacity of the event ring buffer.
    pub max_events: usize,
    /// Seconds between batch flushes.
    pub flush_interval_secs: u64,
}

/// Performance monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Operations slower than this many milliseconds log a warning.
    pub slow_threshold_ms: u64,
    /// Samples retained per operation; older samples are evicted.
    pub max_samples_per_operation: usize,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/lmdiag/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lmdiag")
            .join("config.yaml")
    }

    /// Parsed `logging.level`, falling back to INFO when invalid.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or_default()
    }

    /// Log file path resolved against `root` when relative.
    pub fn log_file(&self, root: &Path) -> PathBuf {
        if self.logging.file.is_absolute() {
            self.logging.file.clone()
        } else {
            root.join(&self.logging.file)
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.flush_interval_secs)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.performance.slow_threshold_ms)
    }

    /// Current value of a gating flag.
    pub fn flag(&self, flag: GateFlag) -> bool {
        match flag {
            GateFlag::ShowNotifications => self.ui.show_notifications,
            GateFlag::AllowCrashReports => self.security.allow_crash_reports,
            GateFlag::AllowTelemetry => self.security.allow_telemetry,
            GateFlag::AllowUsageData => self.security.allow_usage_data,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config and SecurityConfig derive Default; consent scopes default to off.
// (clippy::derivable_impls)

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_notifications: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self { max_records: 1000 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_events: 1000,
            flush_interval_secs: 5 * 60,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 1000,
            max_samples_per_operation: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"telemetry.max_events"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Canonical values for `logging.level`, listed in validation messages.
const VALID_LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "critical"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- logging ---
        if self.logging.level.parse::<LogLevel>().is_err() {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.logging.file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "logging.file".into(),
                message: "must not be empty".into(),
            });
        }

        // --- errors ---
        if self.errors.max_records == 0 {
            errors.push(ValidationError {
                field: "errors.max_records".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- telemetry ---
        if self.telemetry.max_events == 0 {
            errors.push(ValidationError {
                field: "telemetry.max_events".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.telemetry.flush_interval_secs == 0 {
            errors.push(ValidationError {
                field: "telemetry.flush_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- performance ---
        if self.performance.max_samples_per_operation == 0 {
            errors.push(ValidationError {
                field: "performance.max_samples_per_operation".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Flag providers
// ---------------------------------------------------------------------------

impl IConfigProvider for Config {
    fn read_flag(&self, flag: GateFlag) -> anyhow::Result<bool> {
        Ok(self.flag(flag))
    }
}

/// Reads flags from a YAML file, re-reading it on every call so edits take
/// effect without a restart.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IConfigProvider for FileConfigProvider {
    fn read_flag(&self, flag: GateFlag) -> anyhow::Result<bool> {
        Ok(Config::load(&self.path)?.flag(flag))
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use lmdiag_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .allow_telemetry(true)
///     .telemetry_flush_interval_secs(60)
///     .logging_level("debug")
///     .build();
/// assert!(config.security.allow_telemetry);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- ui ---

    pub fn show_notifications(mut self, enabled: bool) -> Self {
        self.config.ui.show_notifications = enabled;
        self
    }

    // --- security ---

    pub fn allow_crash_reports(mut self, allowed: bool) -> Self {
        self.config.security.allow_crash_reports = allowed;
        self
    }

    pub fn allow_telemetry(mut self, allowed: bool) -> Self {
        self.config.security.allow_telemetry = allowed;
        self
    }

    pub fn allow_usage_data(mut self, allowed: bool) -> Self {
        self.config.security.allow_usage_data = allowed;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
        self
    }

    // --- errors ---

    pub fn errors_max_records(mut self, n: usize) -> Self {
        self.config.errors.max_records = n;
        self
    }

    // --- telemetry ---

    pub fn telemetry_max_events(mut self, n: usize) -> Self {
        self.config.telemetry.max_events = n;
        self
    }

    pub fn telemetry_flush_interval_secs(mut self, seconds: u64) -> Self {
        self.config.telemetry.flush_interval_secs = seconds;
        self
    }

    // --- performance ---

    pub fn performance_slow_threshold_ms(mut self, ms: u64) -> Self {
        self.config.performance.slow_threshold_ms = ms;
        self
    }

    pub fn performance_max_samples_per_operation(mut self, n: usize) -> Self {
        self.config.performance.max_samples_per_operation = n;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
