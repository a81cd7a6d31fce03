//! UDP datagram link.
//!
//! Stands in for the USB bulk link across a network tunnel. Each sent
//! datagram is prefixed with a mod-256 sequence byte; the receive path
//! strips it and drops exact duplicates of the previous datagram,
//! which the tunnel is allowed to replay. Duplicate detection keeps
//! the last accepted datagram in a second buffer and compares without
//! copying.

use std::{
    io,
    net::SocketAddr,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{net::UdpSocket, time::Instant};

use crate::{Link, error::LinkError};

/// Default relay endpoint.
pub const DEFAULT_PEER: &str = "127.0.0.1:12345";

/// Largest datagram we will accept from the socket.
const RECV_BUFFER_LEN: usize = 65535;

/// Where outbound datagrams go.
enum Peer {
    /// Socket is connected; the kernel routes (and reports refusal).
    Connected,
    /// Server side: learn the peer from the first inbound datagram.
    Discovered(Option<SocketAddr>),
}

/// Connected datagram socket with sequence framing and duplicate
/// suppression.
pub struct UdpLink {
    socket: UdpSocket,
    peer: Peer,
    max_packet: usize,
    seq: u8,
    send_buf: Vec<u8>,
    curr_buf: Box<[u8]>,
    prev_buf: Box<[u8]>,
    /// Raw length (sequence byte included) of the last accepted
    /// datagram; 0 until one arrives.
    prev_len: usize,
}

impl UdpLink {
    /// Client side: bind an ephemeral port and connect to `peer`.
    ///
    /// # Errors
    ///
    /// Propagates bind/connect failures.
    pub async fn connect(peer: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(peer).await?;
        tracing::debug!(%peer, "udp link connected");

        Ok(Self::from_socket(socket, Peer::Connected))
    }

    /// Server side: bind `local` and learn the peer from the first
    /// inbound datagram.
    ///
    /// # Errors
    ///
    /// Propagates bind failures.
    pub async fn bind(local: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        tracing::info!(addr = %socket.local_addr()?, "udp link listening");

        Ok(Self::from_socket(socket, Peer::Discovered(None)))
    }

    fn from_socket(socket: UdpSocket, peer: Peer) -> Self {
        Self {
            socket,
            peer,
            max_packet: airlock_proto::DEFAULT_MAX_PACKET,
            seq: 1,
            send_buf: Vec::with_capacity(airlock_proto::DEFAULT_MAX_PACKET + 1),
            curr_buf: vec![0u8; RECV_BUFFER_LEN].into_boxed_slice(),
            prev_buf: vec![0u8; RECV_BUFFER_LEN].into_boxed_slice(),
            prev_len: 0,
        }
    }

    /// Local socket address (useful with port 0 binds in tests).
    ///
    /// # Errors
    ///
    /// Propagates the underlying socket error.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive one raw datagram into the current buffer.
    async fn recv_raw(
        socket: &UdpSocket,
        peer: &mut Peer,
        buf: &mut [u8],
    ) -> Result<usize, LinkError> {
        match peer {
            Peer::Connected => socket.recv(buf).await.map_err(LinkError::Fatal),
            Peer::Discovered(known) => {
                let (len, from) = socket.recv_from(buf).await.map_err(LinkError::Fatal)?;
                if known.is_none() {
                    tracing::info!(%from, "peer discovered");
                }
                *known = Some(from);
                Ok(len)
            },
        }
    }
}

#[async_trait]
impl Link for UdpLink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.send_buf.clear();
        self.send_buf.push(self.seq);
        self.send_buf.extend_from_slice(frame);

        let sent = match &self.peer {
            Peer::Connected => self.socket.send(&self.send_buf).await,
            Peer::Discovered(Some(addr)) => self.socket.send_to(&self.send_buf, addr).await,
            Peer::Discovered(None) => {
                return Err(LinkError::Write(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "no peer discovered yet",
                )));
            },
        };

        let sent = sent.map_err(|e| {
            if e.kind() == io::ErrorKind::ConnectionRefused {
                LinkError::Fatal(e)
            } else {
                LinkError::Write(e)
            }
        })?;

        if sent != self.send_buf.len() {
            return Err(LinkError::Write(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {sent} of {} bytes", self.send_buf.len()),
            )));
        }

        self.seq = self.seq.wrapping_add(1);
        Ok(())
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Bytes>, LinkError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let len = match deadline {
                None => {
                    Self::recv_raw(&self.socket, &mut self.peer, &mut self.curr_buf).await?
                },
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }

                    let attempt = tokio::time::timeout(
                        deadline - now,
                        Self::recv_raw(&self.socket, &mut self.peer, &mut self.curr_buf),
                    );
                    match attempt.await {
                        Err(_elapsed) => return Ok(None),
                        Ok(result) => result?,
                    }
                },
            };

            if len == 0 {
                tracing::trace!("dropping zero-length datagram");
                continue;
            }

            if len > self.max_packet + 1 {
                tracing::warn!(len, max_packet = self.max_packet, "dropping oversize datagram");
                continue;
            }

            if len == self.prev_len && self.curr_buf[..len] == self.prev_buf[..len] {
                tracing::debug!(len, "dropping duplicate datagram");
                continue;
            }

            let frame = Bytes::copy_from_slice(&self.curr_buf[1..len]);
            self.prev_len = len;
            std::mem::swap(&mut self.curr_buf, &mut self.prev_buf);

            return Ok(Some(frame));
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
