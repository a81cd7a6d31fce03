//! Single-byte frame opcodes.

use std::fmt;

/// Operation code carried in byte 0 of every frame.
///
/// Values are the ASCII bytes that appear on the wire. Lowercase
/// opcodes flow server-to-client, uppercase client-to-server (with
/// `z`'s uppercase sibling `Z` being the client's reset request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a multi-frame request argument (client).
    Push = b'P',
    /// "Push accepted, send more" acknowledgment (server).
    PushAck = b'c',
    /// No-op / health probe, optional one-byte argument (client).
    Noop = b'N',
    /// Set relay priority; servers ignore it (client).
    SetPriority = b'Q',
    /// List a directory (client).
    List = b'L',
    /// Get file contents (client).
    Get = b'G',
    /// Hash a file with SHA-512 (client).
    HashFile = b'H',
    /// Read a symlink target as a sandbox-relative path (client).
    ReadLink = b'K',
    /// Stat a path (client).
    Stat = b'S',
    /// Query the server's max packet size (client).
    MaxPacket = b'M',
    /// Reset all server transaction slots (client).
    Reset = b'Z',
    /// Pull the next fragment of a transaction (client).
    Continue = b'C',
    /// Data fragment, more to come (server).
    Data = b'd',
    /// Last fragment of a response (server).
    Last = b'l',
    /// Error response (server).
    Error = b'z',
}

impl Opcode {
    /// Decode a wire byte. Returns `None` for bytes outside the
    /// protocol.
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            b'P' => Some(Self::Push),
            b'c' => Some(Self::PushAck),
            b'N' => Some(Self::Noop),
            b'Q' => Some(Self::SetPriority),
            b'L' => Some(Self::List),
            b'G' => Some(Self::Get),
            b'H' => Some(Self::HashFile),
            b'K' => Some(Self::ReadLink),
            b'S' => Some(Self::Stat),
            b'M' => Some(Self::MaxPacket),
            b'Z' => Some(Self::Reset),
            b'C' => Some(Self::Continue),
            b'd' => Some(Self::Data),
            b'l' => Some(Self::Last),
            b'z' => Some(Self::Error),
            _ => None,
        }
    }

    /// The wire byte for this opcode.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for opcodes that may terminate a client request (anything
    /// a client sends other than `P`).
    #[must_use]
    pub fn is_terminal_request(self) -> bool {
        matches!(
            self,
            Self::Noop
                | Self::SetPriority
                | Self::List
                | Self::Get
                | Self::HashFile
                | Self::ReadLink
                | Self::Stat
                | Self::MaxPacket
                | Self::Reset
                | Self::Continue
        )
    }

    /// True for opcodes the server emits.
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(self, Self::PushAck | Self::Data | Self::Last | Self::Error)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8() as char)
    }
}
