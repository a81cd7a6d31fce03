//! Server error types.

use airlock_core::LinkError;

/// Errors that can occur in the server.
///
/// Per-request failures (bad paths, missing files, exhausted slots)
/// never surface here; they become `z` frames on the wire. These
/// variants are for conditions that end the serve loop or prevent
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (bad bind address, unusable sandbox path).
    #[error("configuration error: {0}")]
    Config(String),

    /// The link died underneath us.
    #[error("transport error: {0}")]
    Transport(#[from] LinkError),

    /// I/O error outside a request (binding, opening endpoints).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
