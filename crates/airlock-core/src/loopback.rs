//! In-memory link pair for tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Link, error::LinkError};

/// One end of an in-memory datagram pair.
///
/// Frames pass through verbatim: no sequence byte, no duplicate
/// suppression, no loss. Dropping either end makes the other end's
/// `send` fail with [`LinkError::Closed`] and its `recv` report the
/// same once the queue drains.
pub struct LoopbackLink {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    max_packet: usize,
}

impl LoopbackLink {
    /// Create a connected pair of links.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_max_packet(airlock_proto::DEFAULT_MAX_PACKET)
    }

    /// Create a connected pair with a specific max packet size on both
    /// ends.
    #[must_use]
    pub fn pair_with_max_packet(max_packet: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Self { tx: a_tx, rx: a_rx, max_packet };
        let b = Self { tx: b_tx, rx: b_rx, max_packet };
        (a, b)
    }
}

#[async_trait]
impl Link for LoopbackLink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.tx
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| LinkError::Closed)
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Bytes>, LinkError> {
        match timeout {
            None => self.rx.recv().await.map_or(Err(LinkError::Closed), |f| Ok(Some(f))),
            Some(t) => match tokio::time::timeout(t, self.rx.recv()).await {
                Err(_elapsed) => Ok(None),
                Ok(None) => Err(LinkError::Closed),
                Ok(Some(frame)) => Ok(Some(frame)),
            },
        }
    }

    fn max_packet(&self) -> usize {
        self.max_packet
    }

    fn set_max_packet(&mut self, requested: usize) -> usize {
        self.max_packet = airlock_proto::clamp_max_packet(requested);
        self.max_packet
    }
}
