//! LMDiag Core - Shared types for the diagnostics pipeline
//!
//! This crate contains the pieces every pipeline component depends on:
//! - **Domain types** - `LogLevel`, `ErrorSeverity`, `LogEntry`, `ErrorRecord`,
//!   `TelemetryEvent`, and the bounded `RingBuffer` that stores them
//! - **Port definitions** - Traits for host-provided collaborators:
//!   `IConfigProvider`, `IOutputChannel`, `INotificationSink`, `IReportingSink`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The pipeline components (logger, error handler, performance monitor,
//! telemetry manager) live in their own crates and talk to the host only
//! through the ports defined here.

pub mod config;
pub mod domain;
pub mod ports;
