//! Protocol error types.

use crate::Opcode;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame too short to carry an opcode and transaction id.
    #[error("runt frame ({len} bytes)")]
    Runt {
        /// Observed frame length.
        len: usize,
    },

    /// Byte 0 is not a protocol opcode.
    #[error("unknown opcode byte 0x{opcode:02x}")]
    UnknownOpcode {
        /// The offending byte.
        opcode: u8,
    },

    /// A known opcode arrived in the wrong direction or position
    /// (e.g. a server `d` frame used as a request terminal).
    #[error("opcode '{opcode}' is not valid here")]
    UnexpectedOpcode {
        /// The misplaced opcode.
        opcode: Opcode,
    },

    /// `C` or `Q` arrived without their one-byte argument.
    #[error("missing argument byte for '{opcode}'")]
    MissingArgument {
        /// The opcode lacking its argument.
        opcode: Opcode,
    },

    /// Assembled request argument exceeds [`crate::MAX_FILE_PATHLEN`].
    #[error("path of {len} bytes exceeds the {max}-byte limit")]
    PathTooLong {
        /// Assembled length.
        len: usize,
        /// The limit that was exceeded.
        max: usize,
    },

    /// A stat record payload had the wrong length.
    #[error("stat record must be 15 bytes, got {len}")]
    BadStatRecord {
        /// Observed payload length.
        len: usize,
    },
}
