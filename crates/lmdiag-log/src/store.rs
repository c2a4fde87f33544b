//! Persistent append-only log store
//!
//! The log file is opened on the first append, creating its directory at
//! that point. If the directory or file cannot be created, or a later write
//! fails, the store switches to `Disabled` and every further append is a
//! no-op. The failure is returned exactly once so the caller can report it.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lmdiag_core::domain::DiagnosticsError;
use tracing::{debug, warn};

#[derive(Debug)]
enum StoreState {
    Unopened,
    Open(File),
    Disabled,
}

/// Append-only log file with lazy creation and graceful degradation.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    state: StoreState,
}

impl LogStore {
    /// Creates a store for `path`. Nothing touches the filesystem until the
    /// first [`append`](Self::append).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: StoreState::Unopened,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether persistent logging has been turned off after a failure.
    pub fn is_disabled(&self) -> bool {
        matches!(self.state, StoreState::Disabled)
    }

    /// Appends `lines`, each terminated by a newline, in a single write.
    ///
    /// Returns `Err` only for the failure that disables the store.
    pub fn append(&mut self, lines: &[String]) -> Result<(), DiagnosticsError> {
        if matches!(self.state, StoreState::Unopened) {
            match self.open() {
                Ok(file) => self.state = StoreState::Open(file),
                Err(e) => {
                    self.state = StoreState::Disabled;
                    warn!(error = %e, "Persistent logging disabled");
                    return Err(e);
                }
            }
        }

        let StoreState::Open(file) = &mut self.state else {
            return Ok(());
        };

        let mut buf = String::new();
        for line in lines {
            buf.push_str(line);
            buf.push('\n');
        }

        if let Err(source) = file.write_all(buf.as_bytes()) {
            self.state = StoreState::Disabled;
            let e = DiagnosticsError::LogWrite {
                path: self.path.clone(),
                source,
            };
            warn!(error = %e, "Persistent logging disabled");
            return Err(e);
        }
        Ok(())
    }

    fn open(&self) -> Result<File, DiagnosticsError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| DiagnosticsError::LogWrite {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| DiagnosticsError::LogWrite {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "Opened log store");
        Ok(file)
    }
}
