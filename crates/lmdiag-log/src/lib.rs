//! LMDiag Log - Structured, level-filtered log writer
//!
//! Provides:
//! - `Logger`: Writes entries to a persistent append-only file, mirrors them
//!   to the host's live output channel, and forwards ERROR/CRITICAL entries
//!   to the notification sink
//! - `LogStore`: The lazily-opened log file, degrading to a disabled state
//!   when the log directory cannot be created

pub mod logger;
pub mod store;

pub use logger::Logger;
pub use store::LogStore;
