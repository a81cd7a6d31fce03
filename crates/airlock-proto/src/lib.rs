//! Wire protocol for the Airlock one-way file relay.
//!
//! Airlock bridges an isolated network and an Internet-facing host over
//! a constrained datagram transport (a USB bulk link, or a UDP tunnel
//! standing in for one). The isolated side issues read-only filesystem
//! queries; this crate defines the bytes that cross the link.
//!
//! # Frame shape
//!
//! Every frame starts with a single ASCII opcode byte ([`Opcode`]).
//! Client frames carry the command argument directly after the opcode;
//! server frames carry a one-byte transaction id before the payload
//! (`0` meaning "single-frame response, no transaction"). Oversize
//! request arguments are split across `P` push frames, each
//! acknowledged with a bare `c`; oversize responses are pulled fragment
//! by fragment with `C` continue frames against a server-side
//! transaction slot.
//!
//! The codec here is deliberately dumb: [`Command`] and [`Response`]
//! are the tagged views of a frame, and all byte-position conventions
//! (notably "byte 1 is an argument, not path data" for `C` and `Q`)
//! live in this crate so the engines can match on variants.

mod errors;
mod frame;
mod opcode;
mod stat;

pub use errors::ProtocolError;
pub use frame::{Command, Response};
pub use opcode::Opcode;
pub use stat::StatRecord;

/// Longest request argument (path) the server will assemble, in bytes.
pub const MAX_FILE_PATHLEN: usize = 4096;

/// Size of the transaction slot pool, including the reserved slot 0.
///
/// Usable transaction ids are `1..=MAX_TRANSACTIONS - 1`.
pub const MAX_TRANSACTIONS: usize = 100;

/// Default application payload size per datagram.
pub const DEFAULT_MAX_PACKET: usize = 512;

/// Smallest max-packet value a peer may request.
pub const MIN_MAX_PACKET: usize = 64;

/// Max-packet value adopted when a request is out of range.
pub const FALLBACK_MAX_PACKET: usize = 8192;

/// Bytes of a response frame that are not payload (opcode + trans id).
pub const RESPONSE_OVERHEAD: usize = 2;

/// Clamp a requested max-packet size to the protocol's legal range.
///
/// Requests below [`MIN_MAX_PACKET`] or above [`FALLBACK_MAX_PACKET`]
/// fall back to [`FALLBACK_MAX_PACKET`]; everything else is taken
/// as-is.
#[must_use]
pub fn clamp_max_packet(requested: usize) -> usize {
    if (MIN_MAX_PACKET..=FALLBACK_MAX_PACKET).contains(&requested) {
        requested
    } else {
        FALLBACK_MAX_PACKET
    }
}
