//! The datagram link trait.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::LinkError;

/// One hop of the relay: send a datagram, receive a datagram.
///
/// The protocol above this trait is strictly half-duplex
/// request/response, so implementations never need to buffer more than
/// one in-flight frame per direction. `max_packet` is the largest
/// *application* payload a frame may carry; any framing overhead (such
/// as the UDP sequence byte) is the implementation's own business.
#[async_trait]
pub trait Link: Send {
    /// Transmit one datagram.
    ///
    /// # Errors
    ///
    /// [`LinkError::Write`] on a short or failed write,
    /// [`LinkError::Fatal`] when the peer is gone.
    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Receive the next datagram, or `None` once `timeout` elapses.
    ///
    /// Implementations consume transport noise internally (duplicates,
    /// zero-length packets, oversize datagrams) rather than surfacing
    /// it, so `None` always means "nothing arrived in time".
    ///
    /// # Errors
    ///
    /// [`LinkError::Fatal`] when the peer is gone.
    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Bytes>, LinkError>;

    /// Current max application payload per datagram.
    fn max_packet(&self) -> usize;

    /// Request a new max packet size; returns the clamped value
    /// actually adopted (see [`airlock_proto::clamp_max_packet`]).
    fn set_max_packet(&mut self, requested: usize) -> usize;
}
