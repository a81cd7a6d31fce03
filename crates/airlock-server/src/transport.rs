//! USB FunctionFS bulk-endpoint link.
//!
//! On gadget hardware the server talks over a pair of FunctionFS
//! endpoint files set up by an external configuration step (descriptor
//! writing is out of scope here): requests arrive on the OUT endpoint,
//! responses leave on the IN endpoint. Endpoint I/O is plain blocking
//! read/write, so each operation runs on the blocking thread pool,
//! with receive timeouts implemented by `poll(2)` on the endpoint fd.
//!
//! USB bulk transfers need one quirk the datagram links don't: when an
//! outgoing transfer is a non-empty multiple of the bulk packet size
//! but shorter than `max_packet`, the host can't tell it has ended, so
//! a zero-length packet is written after it. Inbound ZLPs are skipped.

use std::{
    fs::File,
    io::{self, Read, Write},
    os::fd::AsFd,
    path::Path,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tokio::time::Instant;

use airlock_core::{Link, LinkError};

/// Size of an individual USB bulk packet.
pub const DEFAULT_BULK_SIZE: usize = 512;

/// Bulk-endpoint link over FunctionFS files.
pub struct FunctionFsLink {
    /// OUT endpoint: host-to-device, we read requests here.
    reader: Arc<File>,
    /// IN endpoint: device-to-host, we write responses here.
    writer: Arc<File>,
    max_packet: usize,
    bulk_size: usize,
}

impl FunctionFsLink {
    /// Wrap already-open endpoint files.
    #[must_use]
    pub fn new(reader: File, writer: File, bulk_size: usize) -> Self {
        Self {
            reader: Arc::new(reader),
            writer: Arc::new(writer),
            max_packet: airlock_proto::DEFAULT_MAX_PACKET,
            bulk_size,
        }
    }

    /// Open the endpoint file pair.
    ///
    /// # Errors
    ///
    /// Propagates open failures.
    pub fn open(out_endpoint: &Path, in_endpoint: &Path, bulk_size: usize) -> io::Result<Self> {
        let reader = File::open(out_endpoint)?;
        let writer = File::options().write(true).open(in_endpoint)?;
        tracing::info!(
            out_ep = %out_endpoint.display(),
            in_ep = %in_endpoint.display(),
            "functionfs endpoints opened"
        );
        Ok(Self::new(reader, writer, bulk_size))
    }

    /// One blocking receive attempt: poll up to `wait`, then read.
    /// `Ok(None)` means the poll timed out.
    fn blocking_recv(
        reader: &File,
        max_packet: usize,
        wait: Option<Duration>,
    ) -> io::Result<Option<Vec<u8>>> {
        if let Some(wait) = wait {
            let millis = wait.as_millis().min(i32::MAX as u128) as i32;
            let timeout = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);

            let mut fds = [PollFd::new(reader.as_fd(), PollFlags::POLLIN)];
            let ready = poll(&mut fds, timeout).map_err(io::Error::from)?;
            if ready == 0 {
                return Ok(None);
            }
        }

        let mut buf = vec![0u8; max_packet];
        let n = (&*reader).read(&mut buf)?;
        buf.truncate(n);
        Ok(Some(buf))
    }
}

#[async_trait]
impl Link for FunctionFsLink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let writer = Arc::clone(&self.writer);
        let frame = frame.to_vec();
        let max_packet = self.max_packet;
        let bulk_size = self.bulk_size;

        let written = tokio::task::spawn_blocking(move || -> io::Result<()> {
            (&*writer).write_all(&frame)?;

            // Full bulk packets that don't reach max_packet need an
            // explicit end-of-transfer marker.
            if !frame.is_empty() && frame.len() != max_packet && frame.len() % bulk_size == 0 {
                let _ = (&*writer).write(&[])?;
            }
            Ok(())
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LinkError::Write(e)),
            Err(join) => Err(LinkError::Write(io::Error::other(join))),
        }
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Bytes>, LinkError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let wait = match deadline {
                None => None,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    Some(deadline - now)
                },
            };

            let reader = Arc::clone(&self.reader);
            let max_packet = self.max_packet;

            let read = tokio::task::spawn_blocking(move || {
                Self::blocking_recv(&reader, max_packet, wait)
            })
            .await;

            let packet = match read {
                Ok(Ok(packet)) => packet,
                Ok(Err(e)) => return Err(LinkError::Fatal(e)),
                Err(join) => return Err(LinkError::Fatal(io::Error::other(join))),
            };

            match packet {
                None => return Ok(None),
                Some(data) if data.is_empty() => {
                    // ZLP: end-of-transfer marker, not a frame.
                    tracing::trace!("skipping zero-length packet");
                },
                Some(data) => return Ok(Some(Bytes::from(data))),
            }
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
