//! Transport seam and shared machinery for the Airlock file relay.
//!
//! The protocol engines (client and server) are written against the
//! [`Link`] trait: one datagram out, one datagram in, with a receive
//! timeout and a negotiable max packet size. This crate provides the
//! trait plus the two general-purpose implementations:
//!
//! - [`UdpLink`]: a connected datagram socket with per-send sequence
//!   numbering and duplicate suppression, standing in for the USB bulk
//!   link during development and when tunneling over a network.
//! - [`LoopbackLink`]: an in-memory channel pair for tests.
//!
//! The USB FunctionFS link lives with the server, which is the only
//! side that runs on gadget hardware.
//!
//! SHA-512 file hashing also lives here since both sides need it: the
//! server for the hash opcode, the client for local/remote comparison.

mod error;
mod hash;
mod link;
mod loopback;
mod udp;

pub use error::LinkError;
pub use hash::sha512_hex_file;
pub use link::Link;
pub use loopback::LoopbackLink;
pub use udp::{DEFAULT_PEER, UdpLink};
