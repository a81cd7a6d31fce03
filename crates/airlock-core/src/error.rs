//! Link error types.

/// Errors surfaced by a [`crate::Link`].
///
/// A receive timeout is not an error: `recv` returns `Ok(None)` and
/// the protocol layer decides what absence of a reply means.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A datagram could not be written (short write or I/O error).
    ///
    /// The link may still be usable; the caller decides whether to
    /// retry or reset.
    #[error("transport write failed: {0}")]
    Write(#[source] std::io::Error),

    /// The peer is gone (connection refused, device lost).
    ///
    /// This is end-of-life for the link; callers stop using it.
    #[error("peer unreachable: {0}")]
    Fatal(#[source] std::io::Error),

    /// The link was torn down locally.
    #[error("link closed")]
    Closed,
}
