//! Client error types.

use std::time::Duration;

use airlock_core::LinkError;
use airlock_proto::ProtocolError;

/// Errors surfaced by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No response arrived in the receive window. No reset is sent in
    /// this case; an absent peer would never read it.
    #[error("no response from the server within {0:?}")]
    Timeout(Duration),

    /// The server answered `z`. Covers every application failure:
    /// sandbox rejection, missing file, exhausted transaction pool.
    #[error("request rejected by the server")]
    Rejected,

    /// The peer is alive but talking nonsense (runt frame, unknown
    /// opcode, a push ack where data was due). A reset was sent before
    /// this error was returned.
    #[error("protocol violation: {0}")]
    Violation(ProtocolError),

    /// The exchange succeeded but the payload didn't parse.
    #[error("malformed {what} payload")]
    Malformed {
        /// Which payload failed to parse.
        what: &'static str,
    },

    /// The transport failed underneath us.
    #[error("transport error: {0}")]
    Link(#[from] LinkError),
}
