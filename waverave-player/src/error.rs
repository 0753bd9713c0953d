use std::path::PathBuf;

/// An error from setting up or running a playback pipeline.
///
/// Only a few of these ever end a pipeline:
///
/// - `OpenFailed` is raised before any thread starts, and the pipeline never
///   begins streaming.
/// - `Io` from a sink means the sink can no longer accept samples. The
///   pipeline still drains and flushes its end-of-burst marker before
///   returning it.
/// - `InvalidParameter` means a configuration value was out of range, and is
///   only returned from constructors.
/// - `ReaderPanicked` means the producer thread died unexpectedly.
///
/// Short reads and short sends are not errors; they are absorbed by the
/// reader and counted by the dispatcher respectively.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Underlying OS I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The sample file couldn't be opened.
    #[error("Couldn't open sample file {}", .path.display())]
    #[allow(missing_docs)]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Some argument to a function is invalid.
    #[error("Invalid Parameter: {0}")]
    InvalidParameter(&'static str),

    /// The file reading thread panicked before it could finish.
    #[error("File reader thread panicked")]
    ReaderPanicked,
}
