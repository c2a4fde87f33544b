//! LMDiag Daemon - diagnostics host process
//!
//! Wires a [`DiagnosticsContext`] to console and file adapters, starts the
//! telemetry flush timer, and runs until SIGTERM/SIGINT. On shutdown it
//! writes the performance report to the log and flushes pending telemetry.
//!
//! Gating flags are re-read from the config file on every gated operation,
//! so consent changes take effect without a restart.

mod sinks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lmdiag_core::{
    config::{Config, FileConfigProvider},
    ports::IConfigProvider,
};
use lmdiag_telemetry::{DiagnosticsContext, DiagnosticsSinks};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::sinks::{ConsoleOutput, JsonlReporter, TracingNotifier};

#[derive(Debug, Parser)]
#[command(name = "lmdiagd", version, about = "LMDiag diagnostics daemon")]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace root the log file path is resolved against
    #[arg(long)]
    root: Option<PathBuf>,

    /// Telemetry spool file (JSON Lines)
    #[arg(long)]
    spool: Option<PathBuf>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    metrics: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the config file and picks the flag source.
///
/// An existing file is re-read for every flag; otherwise the defaults are
/// used as a fixed source. Settings that fail validation fall back to the
/// defaults.
fn load_config(path: PathBuf) -> (Config, Arc<dyn IConfigProvider>) {
    if !path.exists() {
        info!(config_path = %path.display(), "No config file, using defaults");
        let config = Config::default();
        return (config.clone(), Arc::new(config));
    }

    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(config_path = %path.display(), error = %format!("{e:#}"), "Invalid config, using defaults");
            Config::default()
        }
    };
    let issues = config.validate();
    let config = if issues.is_empty() {
        info!(config_path = %path.display(), "Loaded configuration");
        config
    } else {
        for issue in &issues {
            warn!(%issue, "Config validation issue");
        }
        warn!("Using default settings, flags are still read from the config file");
        Config::default()
    };
    (config, Arc::new(FileConfigProvider::new(path)))
}

/// Listens for SIGTERM and SIGINT and cancels `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (config, flags) = load_config(cli.config.unwrap_or_else(Config::default_path));
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to resolve workspace root")?,
    };
    let reporter = JsonlReporter::new(cli.spool.unwrap_or_else(JsonlReporter::default_path));
    info!(spool = %reporter.path().display(), "Telemetry spool");

    let sinks = DiagnosticsSinks {
        flags,
        output: Arc::new(ConsoleOutput),
        notifier: Arc::new(TracingNotifier),
        reporter: Arc::new(reporter),
    };

    let ctx = DiagnosticsContext::new(&config, &root, sinks)
        .context("Failed to build diagnostics context")?;

    let startup = ctx.performance().start_operation("startup");
    ctx.start()?;
    ctx.telemetry().track_feature_usage("daemon", "start");
    ctx.logger().info("LMDiag diagnostics daemon started");
    startup.stop();

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    shutdown.cancelled().await;

    ctx.telemetry().track_feature_usage("daemon", "stop");
    for line in ctx.performance().generate_report().lines() {
        ctx.logger().info(line);
    }
    let flushed = ctx.shutdown().await;
    ctx.logger()
        .info(format!("LMDiag diagnostics daemon stopped ({flushed} events flushed)"));

    if cli.metrics {
        print!("{}", ctx.metrics().encode()?);
    }

    Ok(())
}
