//! Client engine.
//!
//! A [`Client`] wraps a [`Link`] and speaks the request/response
//! protocol: commands go out (fragmented into `P` pushes when the
//! argument won't fit one packet), responses come back as one `l`
//! frame or a `d…d…l` train pulled with `C` continues.
//!
//! Three delivery styles share the same loop:
//!
//! - [`Client::get_file`] accumulates the whole response,
//! - [`Client::get_file_with`] hands each chunk to a callback,
//! - [`Client::file_chunks`] returns a pull-based [`ChunkStream`]
//!   whose `next()` drives one `C` exchange per call.
//!
//! Error discipline follows the relay's trust model: a timeout fails
//! the call quietly (the peer may simply be gone), while evidence of a
//! live-but-confused peer (runt, unknown opcode, stray ack) sends a
//! `Z` reset before failing.

use std::{ffi::OsString, os::unix::ffi::OsStringExt, path::Path, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};

use airlock_core::{Link, sha512_hex_file};
use airlock_proto::{Command, Opcode, ProtocolError, Response, StatRecord};

use crate::error::ClientError;

/// Result of listing a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    /// The path names a regular file (the wire's two-NUL marker).
    File,
    /// Directory entries, unordered.
    Entries(Vec<OsString>),
}

/// Outcome of comparing a local file's digest with a remote one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashComparison {
    /// Both files hash identically.
    Match(String),
    /// Both exist, contents differ.
    Mismatch {
        /// Local digest.
        local: String,
        /// Remote digest.
        remote: String,
    },
    /// The local file could not be read.
    LocalMissing,
    /// The server rejected the remote hash request.
    RemoteMissing {
        /// Local digest, for the caller's records.
        local: String,
    },
}

/// Protocol client over any [`Link`].
pub struct Client<L: Link> {
    link: L,
    timeout: Duration,
    max_packet: usize,
}

impl<L: Link> Client<L> {
    /// Wrap a link as-is, without negotiating packet sizes.
    pub fn new(link: L, timeout: Duration) -> Self {
        let max_packet = link.max_packet();
        Self { link, timeout, max_packet }
    }

    /// Wrap a link and adopt the server's max packet size.
    ///
    /// # Errors
    ///
    /// Fails when the size query fails; the caller may retry.
    pub async fn connect(link: L, timeout: Duration) -> Result<Self, ClientError> {
        let mut client = Self::new(link, timeout);
        client.negotiate().await?;
        Ok(client)
    }

    /// Query the server's max packet size and adopt it (clamped to
    /// the protocol's legal range). Returns the adopted size.
    ///
    /// # Errors
    ///
    /// Propagates the `M` exchange failure; sizes are left untouched.
    pub async fn negotiate(&mut self) -> Result<usize, ClientError> {
        let server_size = self.server_max_packet().await?;
        self.max_packet = self.link.set_max_packet(server_size);
        tracing::debug!(max_packet = self.max_packet, "adopted server packet size");
        Ok(self.max_packet)
    }

    /// Max packet size requests are fragmented against.
    #[must_use]
    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    /// Health probe: true when the server answers a no-op.
    pub async fn probe(&mut self) -> bool {
        self.noop(None).await.is_ok()
    }

    /// No-op round trip, optionally carrying a probe byte.
    ///
    /// # Errors
    ///
    /// Any exchange failure.
    pub async fn noop(&mut self, probe: Option<u8>) -> Result<(), ClientError> {
        self.transact(&Command::Noop { probe }).await.map(|_| ())
    }

    /// Ask a relay on the path (if any) to change this link's
    /// priority. Servers acknowledge and ignore it.
    ///
    /// # Errors
    ///
    /// Any exchange failure.
    pub async fn set_priority(&mut self, priority: u8) -> Result<(), ClientError> {
        self.transact(&Command::SetPriority { priority }).await.map(|_| ())
    }

    /// List a directory, or detect that a path is a regular file.
    ///
    /// # Errors
    ///
    /// Any exchange failure; [`ClientError::Rejected`] for paths the
    /// server won't admit to.
    pub async fn list(&mut self, path: impl AsRef<[u8]>) -> Result<Listing, ClientError> {
        let payload = self
            .transact(&Command::List { path: Bytes::copy_from_slice(path.as_ref()) })
            .await?;

        if payload.as_ref() == b"\0\0" {
            return Ok(Listing::File);
        }
        if payload.is_empty() {
            return Ok(Listing::Entries(Vec::new()));
        }

        let entries = payload
            .split(|&b| b == 0)
            .map(|name| OsString::from_vec(name.to_vec()))
            .collect();
        Ok(Listing::Entries(entries))
    }

    /// Fetch a whole file into memory.
    ///
    /// # Errors
    ///
    /// Any exchange failure.
    pub async fn get_file(&mut self, path: impl AsRef<[u8]>) -> Result<Bytes, ClientError> {
        self.transact(&Command::Get { path: Bytes::copy_from_slice(path.as_ref()) })
            .await
    }

    /// Fetch a file, handing each chunk to `on_chunk` as it arrives.
    ///
    /// # Errors
    ///
    /// Any exchange failure; chunks already delivered stay delivered.
    pub async fn get_file_with<F>(
        &mut self,
        path: impl AsRef<[u8]>,
        mut on_chunk: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&[u8]) + Send,
    {
        let mut chunks = self
            .file_chunks(path)
            .await?;

        while let Some(chunk) = chunks.next().await? {
            on_chunk(&chunk);
        }
        Ok(())
    }

    /// Fetch a file lazily: each [`ChunkStream::next`] pulls one
    /// fragment.
    ///
    /// The stream is finite, single-consumer, and not restartable.
    /// Dropping it mid-file leaves the server's transaction slot to
    /// the purge timer, exactly as a vanished client would.
    ///
    /// # Errors
    ///
    /// Failures sending the request; per-fragment failures surface
    /// from `next()`.
    pub async fn file_chunks(
        &mut self,
        path: impl AsRef<[u8]>,
    ) -> Result<ChunkStream<'_, L>, ClientError> {
        let command = Command::Get { path: Bytes::copy_from_slice(path.as_ref()) };
        self.send_command(&command).await?;
        Ok(ChunkStream { client: self, pending: None, done: false })
    }

    /// SHA-512 hex digest of a remote file.
    ///
    /// # Errors
    ///
    /// Any exchange failure; [`ClientError::Malformed`] if the digest
    /// isn't text.
    pub async fn hash_file(&mut self, path: impl AsRef<[u8]>) -> Result<String, ClientError> {
        let payload = self
            .transact(&Command::HashFile { path: Bytes::copy_from_slice(path.as_ref()) })
            .await?;

        String::from_utf8(payload.to_vec()).map_err(|_| ClientError::Malformed { what: "digest" })
    }

    /// Compare a local file's SHA-512 against a remote file's.
    ///
    /// # Errors
    ///
    /// Transport and protocol failures; missing files on either side
    /// are outcomes, not errors.
    pub async fn compare_hash(
        &mut self,
        local: &Path,
        remote: impl AsRef<[u8]>,
    ) -> Result<HashComparison, ClientError> {
        let Ok(local_digest) = sha512_hex_file(local) else {
            return Ok(HashComparison::LocalMissing);
        };

        match self.hash_file(remote).await {
            Ok(remote_digest) if remote_digest == local_digest => {
                Ok(HashComparison::Match(local_digest))
            },
            Ok(remote_digest) => {
                Ok(HashComparison::Mismatch { local: local_digest, remote: remote_digest })
            },
            Err(ClientError::Rejected) => {
                Ok(HashComparison::RemoteMissing { local: local_digest })
            },
            Err(other) => Err(other),
        }
    }

    /// Read a symlink's target, relative to its sandbox root.
    ///
    /// `Ok(None)` means the path exists but is not a symlink.
    ///
    /// # Errors
    ///
    /// Any exchange failure.
    pub async fn read_link(
        &mut self,
        path: impl AsRef<[u8]>,
    ) -> Result<Option<OsString>, ClientError> {
        let payload = self
            .transact(&Command::ReadLink { path: Bytes::copy_from_slice(path.as_ref()) })
            .await?;

        if payload.is_empty() {
            Ok(None)
        } else {
            Ok(Some(OsString::from_vec(payload.to_vec())))
        }
    }

    /// Stat a remote path.
    ///
    /// # Errors
    ///
    /// Any exchange failure; [`ClientError::Malformed`] for a record
    /// of the wrong size.
    pub async fn stat(&mut self, path: impl AsRef<[u8]>) -> Result<StatRecord, ClientError> {
        let payload = self
            .transact(&Command::Stat { path: Bytes::copy_from_slice(path.as_ref()) })
            .await?;

        StatRecord::from_bytes(&payload).map_err(|_| ClientError::Malformed { what: "stat record" })
    }

    /// Query the server's current max packet size without adopting it.
    ///
    /// # Errors
    ///
    /// Any exchange failure; [`ClientError::Malformed`] for a reply
    /// that isn't 32 bits.
    pub async fn server_max_packet(&mut self) -> Result<usize, ClientError> {
        let payload = self.transact(&Command::MaxPacket).await?;

        let bytes: [u8; 4] = payload
            .as_ref()
            .try_into()
            .map_err(|_| ClientError::Malformed { what: "max packet" })?;
        Ok(u32::from_le_bytes(bytes) as usize)
    }

    /// Reset the server: free every transaction slot, then drain
    /// whatever is still in flight until the line goes quiet.
    ///
    /// # Errors
    ///
    /// Transport failures only.
    pub async fn reset(&mut self) -> Result<(), ClientError> {
        tracing::debug!("resetting server state");
        self.link.send(&[Opcode::Reset.as_u8()]).await?;

        while self.link.recv(Some(self.timeout)).await?.is_some() {}
        Ok(())
    }

    /// Send a command, fragmenting its argument into `P` frames when
    /// it cannot share a packet with the opcode.
    async fn send_command(&mut self, command: &Command) -> Result<(), ClientError> {
        let mut rest = command.payload();

        while rest.len() + 1 > self.max_packet {
            let take = self.max_packet - 1;

            let mut frame = BytesMut::with_capacity(self.max_packet);
            frame.put_u8(Opcode::Push.as_u8());
            frame.put_slice(&rest[..take]);
            self.link.send(&frame).await?;
            rest = rest.slice(take..);

            match self.link.recv(Some(self.timeout)).await? {
                None => return Err(ClientError::Timeout(self.timeout)),
                Some(reply)
                    if reply.len() == 1 && reply[0] == Opcode::PushAck.as_u8() => {},
                Some(reply) => {
                    tracing::warn!("push was not acknowledged");
                    let error = match Response::decode(&reply) {
                        Ok(resp) => ProtocolError::UnexpectedOpcode { opcode: resp.opcode() },
                        Err(error) => error,
                    };
                    self.reset().await?;
                    return Err(ClientError::Violation(error));
                },
            }
        }

        let mut frame = BytesMut::with_capacity(1 + rest.len());
        frame.put_u8(command.opcode().as_u8());
        frame.put_slice(&rest);
        self.link.send(&frame).await?;
        Ok(())
    }

    /// Receive and classify one response frame, applying the reset
    /// policy for protocol violations.
    async fn receive_response(&mut self) -> Result<Response, ClientError> {
        let Some(frame) = self.link.recv(Some(self.timeout)).await? else {
            // No reset on a timeout; the peer is presumed absent.
            return Err(ClientError::Timeout(self.timeout));
        };

        match Response::decode(&frame) {
            Ok(Response::PushAck) => {
                tracing::warn!("stray push ack in response stream");
                self.reset().await?;
                Err(ClientError::Violation(ProtocolError::UnexpectedOpcode {
                    opcode: Opcode::PushAck,
                }))
            },
            Ok(response) => Ok(response),
            Err(error) => {
                tracing::warn!(%error, "unparseable response frame");
                self.reset().await?;
                Err(ClientError::Violation(error))
            },
        }
    }

    /// Issue a command and accumulate the whole response.
    async fn transact(&mut self, command: &Command) -> Result<Bytes, ClientError> {
        self.send_command(command).await?;

        let mut stream = ChunkStream { client: self, pending: None, done: false };
        let mut whole = BytesMut::new();

        while let Some(chunk) = stream.next().await? {
            whole.put_slice(&chunk);
        }

        Ok(whole.freeze())
    }
}

/// Pull-based response consumer: each `next()` requests and returns
/// one fragment.
pub struct ChunkStream<'c, L: Link> {
    client: &'c mut Client<L>,
    /// Slot to continue before the next receive.
    pending: Option<u8>,
    done: bool,
}

impl<L: Link> ChunkStream<'_, L> {
    /// The next fragment, or `None` once the terminal frame has been
    /// delivered.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rejected`] for a `z`, [`ClientError::Timeout`]
    /// when the server goes quiet, [`ClientError::Violation`] (after
    /// a reset) for garbage. All errors end the stream.
    pub async fn next(&mut self) -> Result<Option<Bytes>, ClientError> {
        if self.done {
            return Ok(None);
        }

        if let Some(slot) = self.pending.take() {
            self.client
                .link
                .send(&[Opcode::Continue.as_u8(), slot])
                .await?;
        }

        match self.client.receive_response().await {
            Ok(Response::Data { slot, chunk }) => {
                self.pending = Some(slot);
                Ok(Some(chunk))
            },
            Ok(Response::Last { chunk, .. }) => {
                self.done = true;
                Ok(Some(chunk))
            },
            Ok(Response::Error) => {
                self.done = true;
                Err(ClientError::Rejected)
            },
            // receive_response converts stray acks into violations,
            // so this arm is unreachable in practice.
            Ok(Response::PushAck) => {
                self.done = true;
                Err(ClientError::Violation(ProtocolError::UnexpectedOpcode {
                    opcode: Opcode::PushAck,
                }))
            },
            Err(error) => {
                self.done = true;
                Err(error)
            },
        }
    }
}
