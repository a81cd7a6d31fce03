//! Tagged views of request and response frames.
//!
//! A request reaches the server as zero or more `P` push frames
//! followed by one terminal frame. [`Command::from_terminal`] folds
//! the pushed prefix and the terminal frame into a single typed value,
//! applying the argument conventions: `C` and `Q` read their argument
//! from byte 1 of the terminal frame and never treat it as path data.
//!
//! Responses are symmetric and single-purpose: [`Response::decode`]
//! classifies a server frame, rejecting runts and unknown opcodes
//! before any payload is touched.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{MAX_FILE_PATHLEN, Opcode, errors::ProtocolError};

/// A fully assembled client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Health probe with an optional argument byte the server echoes
    /// into its logs and otherwise ignores.
    Noop {
        /// Optional probe byte.
        probe: Option<u8>,
    },
    /// Relay priority hint. Servers answer with an empty response and
    /// take no other action; a relay in the path may consume it.
    SetPriority {
        /// Requested priority.
        priority: u8,
    },
    /// List a directory (or confirm a regular file exists).
    List {
        /// Sandbox path, raw bytes.
        path: Bytes,
    },
    /// Stream a file's contents.
    Get {
        /// Sandbox path, raw bytes.
        path: Bytes,
    },
    /// SHA-512 hex digest of a file.
    HashFile {
        /// Sandbox path, raw bytes.
        path: Bytes,
    },
    /// Resolve a symlink relative to its sandbox root.
    ReadLink {
        /// Sandbox path, raw bytes.
        path: Bytes,
    },
    /// Packed stat record for a path.
    Stat {
        /// Sandbox path, raw bytes.
        path: Bytes,
    },
    /// Query the server's current max packet size.
    MaxPacket,
    /// Free every transaction slot.
    Reset,
    /// Pull the next fragment of a buffered transaction.
    Continue {
        /// Transaction id to advance.
        slot: u8,
    },
}

impl Command {
    /// The terminal opcode for this command.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Noop { .. } => Opcode::Noop,
            Self::SetPriority { .. } => Opcode::SetPriority,
            Self::List { .. } => Opcode::List,
            Self::Get { .. } => Opcode::Get,
            Self::HashFile { .. } => Opcode::HashFile,
            Self::ReadLink { .. } => Opcode::ReadLink,
            Self::Stat { .. } => Opcode::Stat,
            Self::MaxPacket => Opcode::MaxPacket,
            Self::Reset => Opcode::Reset,
            Self::Continue { .. } => Opcode::Continue,
        }
    }

    /// Argument bytes that follow the opcode on the wire.
    ///
    /// This is what gets fragmented into `P` frames when it does not
    /// fit a single packet. `Continue` and `SetPriority` arguments are
    /// a single byte and are never fragmented.
    #[must_use]
    pub fn payload(&self) -> Bytes {
        match self {
            Self::Noop { probe: None } | Self::MaxPacket | Self::Reset => Bytes::new(),
            Self::Noop { probe: Some(b) } => Bytes::copy_from_slice(&[*b]),
            Self::SetPriority { priority } => Bytes::copy_from_slice(&[*priority]),
            Self::Continue { slot } => Bytes::copy_from_slice(&[*slot]),
            Self::List { path }
            | Self::Get { path }
            | Self::HashFile { path }
            | Self::ReadLink { path }
            | Self::Stat { path } => path.clone(),
        }
    }

    /// Encode as a single terminal frame, assuming no fragmentation is
    /// needed.
    #[must_use]
    pub fn encode_unfragmented(&self) -> Bytes {
        let payload = self.payload();
        let mut frame = BytesMut::with_capacity(1 + payload.len());
        frame.put_u8(self.opcode().as_u8());
        frame.put_slice(&payload);
        frame.freeze()
    }

    /// Assemble a command from its terminal frame and any `P`-pushed
    /// prefix.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Runt`] for an empty terminal frame
    /// - [`ProtocolError::UnknownOpcode`] for a byte outside the protocol
    /// - [`ProtocolError::UnexpectedOpcode`] for server-direction opcodes
    ///   (and `P`, which must be consumed before the terminal frame)
    /// - [`ProtocolError::MissingArgument`] when `C`/`Q` lack byte 1
    /// - [`ProtocolError::PathTooLong`] when the assembled path exceeds
    ///   [`MAX_FILE_PATHLEN`]
    pub fn from_terminal(frame: &[u8], pushed: &[u8]) -> Result<Self, ProtocolError> {
        let Some((&op_byte, body)) = frame.split_first() else {
            return Err(ProtocolError::Runt { len: 0 });
        };

        let opcode =
            Opcode::from_u8(op_byte).ok_or(ProtocolError::UnknownOpcode { opcode: op_byte })?;

        match opcode {
            Opcode::Continue => {
                let slot = *body
                    .first()
                    .ok_or(ProtocolError::MissingArgument { opcode })?;
                Ok(Self::Continue { slot })
            },
            Opcode::SetPriority => {
                let priority = *body
                    .first()
                    .ok_or(ProtocolError::MissingArgument { opcode })?;
                Ok(Self::SetPriority { priority })
            },
            Opcode::Noop => {
                let probe = pushed.first().or_else(|| body.first()).copied();
                Ok(Self::Noop { probe })
            },
            Opcode::MaxPacket => Ok(Self::MaxPacket),
            Opcode::Reset => Ok(Self::Reset),
            Opcode::List
            | Opcode::Get
            | Opcode::HashFile
            | Opcode::ReadLink
            | Opcode::Stat => {
                let len = pushed.len() + body.len();
                if len > MAX_FILE_PATHLEN {
                    return Err(ProtocolError::PathTooLong {
                        len,
                        max: MAX_FILE_PATHLEN,
                    });
                }

                let mut path = BytesMut::with_capacity(len);
                path.put_slice(pushed);
                path.put_slice(body);
                let path = path.freeze();

                Ok(match opcode {
                    Opcode::List => Self::List { path },
                    Opcode::Get => Self::Get { path },
                    Opcode::HashFile => Self::HashFile { path },
                    Opcode::ReadLink => Self::ReadLink { path },
                    _ => Self::Stat { path },
                })
            },
            Opcode::Push
            | Opcode::PushAck
            | Opcode::Data
            | Opcode::Last
            | Opcode::Error => Err(ProtocolError::UnexpectedOpcode { opcode }),
        }
    }
}

/// A server frame as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Bare `c`: the previous `P` frame was accepted.
    PushAck,
    /// A fragment with more to come; pull the next with `C slot`.
    Data {
        /// Transaction id backing this response.
        slot: u8,
        /// Fragment payload.
        chunk: Bytes,
    },
    /// The final fragment of a response (`slot` is 0 when the whole
    /// response fit one frame).
    Last {
        /// Transaction id, or 0 for unslotted responses.
        slot: u8,
        /// Fragment payload, possibly empty.
        chunk: Bytes,
    },
    /// The request was rejected.
    Error,
}

impl Response {
    /// The wire opcode for this response.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::PushAck => Opcode::PushAck,
            Self::Data { .. } => Opcode::Data,
            Self::Last { .. } => Opcode::Last,
            Self::Error => Opcode::Error,
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::PushAck => Bytes::from_static(b"c"),
            Self::Error => Bytes::from_static(b"z\0"),
            Self::Data { slot, chunk } | Self::Last { slot, chunk } => {
                let mut frame = BytesMut::with_capacity(2 + chunk.len());
                frame.put_u8(self.opcode().as_u8());
                frame.put_u8(*slot);
                frame.put_slice(chunk);
                frame.freeze()
            },
        }
    }

    /// Classify a server frame.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Runt`] for frames shorter than two bytes
    ///   (the one-byte `c` ack being the only exception)
    /// - [`ProtocolError::UnknownOpcode`] for bytes outside the protocol
    /// - [`ProtocolError::UnexpectedOpcode`] for request-direction opcodes
    pub fn decode(frame: &Bytes) -> Result<Self, ProtocolError> {
        let Some(&op_byte) = frame.first() else {
            return Err(ProtocolError::Runt { len: 0 });
        };

        let opcode =
            Opcode::from_u8(op_byte).ok_or(ProtocolError::UnknownOpcode { opcode: op_byte })?;

        if opcode == Opcode::PushAck {
            return Ok(Self::PushAck);
        }

        if frame.len() < 2 {
            return Err(ProtocolError::Runt { len: frame.len() });
        }

        match opcode {
            Opcode::Data => Ok(Self::Data {
                slot: frame[1],
                chunk: frame.slice(2..),
            }),
            Opcode::Last => Ok(Self::Last {
                slot: frame[1],
                chunk: frame.slice(2..),
            }),
            Opcode::Error => Ok(Self::Error),
            other => Err(ProtocolError::UnexpectedOpcode { opcode: other }),
        }
    }
}
