//! Live output channel port
//!
//! Receives exactly the lines written to the persistent log, in the same
//! order. Appending is infallible from the pipeline's point of view.

/// Port trait for the host's live text output (e.g. an editor output panel)
pub trait IOutputChannel: Send + Sync {
    /// Appends one line of text.
    fn append_line(&self, line: &str);

    /// Brings the channel into view.
    fn show(&self);
}
