//! Sans-IO server engine.
//!
//! The driver is a pure request/response state machine: every inbound
//! frame produces exactly one outbound frame. The runtime around it
//! owns the link and feeds frames in; filesystem work happens here
//! (it is the server's whole job), transport work does not.
//!
//! State carried between frames:
//!
//! - the `P`-push accumulator for oversize request arguments,
//! - the transaction slot pool holding tails of oversize responses,
//! - the stat cache.
//!
//! Per-request failures (sandbox rejections, missing files, exhausted
//! slots, malformed frames) all collapse to the single `z` error
//! frame; the client learns nothing about why.

use std::{
    fs::File,
    io::{self, Read},
    mem,
    os::unix::ffi::OsStrExt,
    sync::Arc,
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};

use airlock_core::sha512_hex_file;
use airlock_proto::{Command, MAX_FILE_PATHLEN, Opcode, RESPONSE_OVERHEAD, Response, StatRecord};

use crate::{
    fsops,
    sandbox::Sandbox,
    slots::{DEFAULT_PURGE_AFTER, SlotPool, SlotState},
    stat_cache::StatCache,
};

/// Driver tuning knobs.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Largest frame the link can carry.
    pub max_packet: usize,
    /// Age after which an abandoned transaction may be reclaimed.
    pub purge_after: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_packet: airlock_proto::DEFAULT_MAX_PACKET,
            purge_after: DEFAULT_PURGE_AFTER,
        }
    }
}

/// One outbound frame, plus the slot (if any) still open behind it.
///
/// When the runtime fails to transmit the frame it must hand the slot
/// back via [`ServerDriver::release_slot`]; the client will never send
/// the `C` that would drain it.
#[derive(Debug)]
pub struct Reply {
    /// Encoded frame to transmit.
    pub frame: Bytes,
    /// Transaction backing a `d` fragment, still live after this frame.
    pub open_slot: Option<u8>,
}

impl Reply {
    fn plain(response: &Response) -> Self {
        Self { frame: response.encode(), open_slot: None }
    }

    fn streaming(response: &Response, slot: u8) -> Self {
        Self { frame: response.encode(), open_slot: Some(slot) }
    }

    fn error() -> Self {
        Self::plain(&Response::Error)
    }
}

enum SlotKind {
    Empty,
    Buffered,
    Streaming,
}

/// The server protocol engine.
pub struct ServerDriver {
    sandbox: Sandbox,
    slots: SlotPool,
    cache: Arc<StatCache>,
    max_packet: usize,
    pushed: Vec<u8>,
}

impl ServerDriver {
    /// New driver over a sandbox.
    #[must_use]
    pub fn new(sandbox: Sandbox, config: &DriverConfig) -> Self {
        Self {
            sandbox,
            slots: SlotPool::new(config.purge_after),
            cache: Arc::new(StatCache::new()),
            max_packet: config.max_packet,
            pushed: Vec::new(),
        }
    }

    /// The stat cache, for the runtime's ticker task.
    #[must_use]
    pub fn cache(&self) -> Arc<StatCache> {
        Arc::clone(&self.cache)
    }

    /// Current max packet size the driver fragments against.
    #[must_use]
    pub fn max_packet(&self) -> usize {
        self.max_packet
    }

    /// Number of live transactions (test observability).
    #[must_use]
    pub fn live_transactions(&self) -> usize {
        self.slots.live()
    }

    /// Hand back the slot behind a frame the runtime failed to send.
    pub fn release_slot(&mut self, id: u8) {
        self.slots.clear(id);
    }

    /// Process one inbound frame and produce the frame to send back.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Reply {
        let Some(&first) = frame.first() else {
            tracing::warn!("empty frame");
            self.pushed.clear();
            return Reply::error();
        };

        if first == Opcode::Push.as_u8() {
            let body = &frame[1..];
            if self.pushed.len() + body.len() > MAX_FILE_PATHLEN {
                tracing::warn!(
                    len = self.pushed.len() + body.len(),
                    "pushed request argument over the path limit"
                );
                self.pushed.clear();
                return Reply::error();
            }

            self.pushed.extend_from_slice(body);
            return Reply::plain(&Response::PushAck);
        }

        let pushed = mem::take(&mut self.pushed);
        match Command::from_terminal(frame, &pushed) {
            Ok(command) => self.dispatch(&command),
            Err(error) => {
                tracing::warn!(%error, "rejecting request");
                Reply::error()
            },
        }
    }

    fn dispatch(&mut self, command: &Command) -> Reply {
        match command {
            Command::Noop { probe } => {
                tracing::debug!(?probe, "health probe");
                self.data_response(Bytes::new())
            },
            Command::SetPriority { priority } => {
                // Consumed by a relay if one sits on the path; the
                // server only acknowledges.
                tracing::debug!(priority, "priority hint acknowledged");
                self.data_response(Bytes::new())
            },
            Command::MaxPacket => {
                tracing::debug!(max_packet = self.max_packet, "max packet queried");
                self.data_response(Bytes::copy_from_slice(
                    &(self.max_packet as u32).to_le_bytes(),
                ))
            },
            Command::Reset => {
                tracing::debug!("freeing every transaction slot");
                self.slots.clear_all();
                self.data_response(Bytes::new())
            },
            Command::Continue { slot } => self.continue_transaction(*slot),
            Command::List { path } => self.handle_list(path),
            Command::Get { path } => self.handle_get(path),
            Command::HashFile { path } => self.handle_hash(path),
            Command::ReadLink { path } => self.handle_read_link(path),
            Command::Stat { path } => self.handle_stat(path),
        }
    }

    /// Send `payload` as one `l` frame, or anchor the tail in a slot
    /// and send the first `d` fragment.
    fn data_response(&mut self, payload: Bytes) -> Reply {
        if payload.len() + RESPONSE_OVERHEAD <= self.max_packet {
            return Reply::plain(&Response::Last { slot: 0, chunk: payload });
        }

        let Some(id) = self.slots.allocate() else {
            tracing::warn!("transaction pool exhausted");
            return Reply::error();
        };

        let head = self.max_packet - RESPONSE_OVERHEAD;
        self.slots.store_buffer(id, payload.slice(head..));

        Reply::streaming(&Response::Data { slot: id, chunk: payload.slice(..head) }, id)
    }

    fn continue_transaction(&mut self, id: u8) -> Reply {
        if !SlotPool::valid_id(id) {
            tracing::warn!(id, "continue for an out-of-range transaction");
            return Reply::error();
        }

        let kind = match self.slots.get_mut(id) {
            None => SlotKind::Empty,
            Some(SlotState::Buffered { .. }) => SlotKind::Buffered,
            Some(SlotState::Streaming(_)) => SlotKind::Streaming,
        };

        match kind {
            // Already drained (or never lived): an empty terminal
            // frame, so the client always converges.
            SlotKind::Empty => Reply::plain(&Response::Last { slot: id, chunk: Bytes::new() }),
            SlotKind::Buffered => self.next_buffered(id),
            SlotKind::Streaming => self.next_from_file(id, false),
        }
    }

    fn next_buffered(&mut self, id: u8) -> Reply {
        let max_packet = self.max_packet;

        let Some(SlotState::Buffered { data, offset }) = self.slots.get_mut(id) else {
            return Reply::error();
        };

        let remain = data.len() - *offset;
        if remain + RESPONSE_OVERHEAD <= max_packet {
            let chunk = data.slice(*offset..);
            self.slots.clear(id);
            return Reply::plain(&Response::Last { slot: id, chunk });
        }

        let end = *offset + (max_packet - RESPONSE_OVERHEAD);
        let chunk = data.slice(*offset..end);
        *offset = end;

        Reply::streaming(&Response::Data { slot: id, chunk }, id)
    }

    /// Read the next fragment straight out of a slot's file. A short
    /// read is EOF, which marks the terminal frame; when the very
    /// first read already hits EOF the response never needed its slot
    /// and goes out unslotted.
    fn next_from_file(&mut self, id: u8, first: bool) -> Reply {
        let want = self.max_packet - RESPONSE_OVERHEAD;
        let mut buf = vec![0u8; want];

        let read = match self.slots.get_mut(id) {
            Some(SlotState::Streaming(file)) => read_fill(file, &mut buf),
            _ => return Reply::error(),
        };

        let n = match read {
            Ok(n) => n,
            Err(error) => {
                tracing::warn!(%error, id, "file read failed mid-transaction");
                self.slots.clear(id);
                return Reply::error();
            },
        };

        buf.truncate(n);
        let chunk = Bytes::from(buf);

        if n < want {
            self.slots.clear(id);
            let slot = if first { 0 } else { id };
            Reply::plain(&Response::Last { slot, chunk })
        } else {
            Reply::streaming(&Response::Data { slot: id, chunk }, id)
        }
    }

    fn handle_get(&mut self, path: &[u8]) -> Reply {
        let Some(real) = self.sandbox.resolve_file(path) else {
            return Reply::error();
        };

        let Some(id) = self.slots.allocate() else {
            tracing::warn!("transaction pool exhausted");
            return Reply::error();
        };

        match File::open(&real) {
            Ok(file) => {
                tracing::debug!(path = %real.display(), "streaming file");
                self.slots.store_file(id, file);
                self.next_from_file(id, true)
            },
            Err(error) => {
                tracing::warn!(%error, path = %real.display(), "open failed");
                Reply::error()
            },
        }
    }

    fn handle_hash(&mut self, path: &[u8]) -> Reply {
        let Some(real) = self.sandbox.resolve_file(path) else {
            return Reply::error();
        };

        match sha512_hex_file(&real) {
            Ok(digest) => {
                tracing::debug!(path = %real.display(), "hashed file");
                self.data_response(Bytes::from(digest))
            },
            Err(error) => {
                tracing::warn!(%error, path = %real.display(), "hash failed");
                Reply::error()
            },
        }
    }

    fn handle_list(&mut self, path: &[u8]) -> Reply {
        let Some(real) = self.sandbox.resolve(path) else {
            return Reply::error();
        };

        // A regular file answers with the two-NUL marker.
        if real.is_file() {
            return self.data_response(Bytes::from_static(b"\0\0"));
        }
        if !real.is_dir() {
            return Reply::error();
        }

        let entries = match std::fs::read_dir(&real) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, path = %real.display(), "read_dir failed");
                return Reply::error();
            },
        };

        let mut listing = BytesMut::new();
        for entry in entries {
            let Ok(entry) = entry else { continue };
            let entry_path = entry.path();

            let Ok(file_type) = entry.file_type() else { continue };

            // Symlinks pointing out of the sandbox are invisible.
            if file_type.is_symlink() {
                let target_ok = fsops::resolve_link_target(&entry_path, &real)
                    .ok()
                    .and_then(|dest| self.sandbox.resolve(dest.as_os_str().as_bytes()))
                    .is_some();
                if !target_ok {
                    tracing::debug!(path = %entry_path.display(), "hiding escaping symlink");
                    continue;
                }
            }

            // As is anything that is not a file or directory.
            let Ok(meta) = std::fs::metadata(&entry_path) else { continue };
            if !(meta.is_dir() || meta.is_file()) {
                continue;
            }

            if !listing.is_empty() {
                listing.put_u8(0);
            }
            listing.put_slice(entry.file_name().as_bytes());

            // Listings feed the stat cache for the stats that follow.
            self.cache.insert(entry_path, meta);
        }

        self.data_response(listing.freeze())
    }

    fn handle_stat(&mut self, path: &[u8]) -> Reply {
        let Some(real) = self.sandbox.resolve(path) else {
            return Reply::error();
        };

        let meta = match self.cache.stat(&real) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(%error, path = %real.display(), "stat failed");
                return Reply::error();
            },
        };

        // Symlink-ness describes the client-visible path, before
        // canonicalization resolved it away.
        let unaliased = self.sandbox.unaliased_path(path);
        let symlink = std::fs::symlink_metadata(&unaliased)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let record = StatRecord::from_metadata(&meta, symlink);
        if !(record.is_dir() || record.is_regular_file()) {
            return Reply::error();
        }

        self.data_response(Bytes::copy_from_slice(&record.to_bytes()))
    }

    fn handle_read_link(&mut self, path: &[u8]) -> Reply {
        let Some(real) = self.sandbox.resolve(path) else {
            return Reply::error();
        };

        let unaliased = self.sandbox.unaliased_path(path);
        let is_link = std::fs::symlink_metadata(&unaliased)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        // A path that is not a symlink answers with an empty payload.
        if !is_link {
            return self.data_response(Bytes::new());
        }

        let currdir = unaliased.parent().unwrap_or(&unaliased);
        let dest = match fsops::resolve_link_target(&unaliased, currdir) {
            Ok(dest) => dest,
            Err(error) => {
                tracing::debug!(%error, "unreadable symlink");
                return Reply::error();
            },
        };

        // The destination must itself be sandboxed.
        let Some(real_dest) = self.sandbox.resolve(dest.as_os_str().as_bytes()) else {
            tracing::debug!(path = %real.display(), "symlink destination escapes sandbox");
            return Reply::error();
        };

        let base = if real.is_dir() {
            real.as_path()
        } else {
            real.parent().unwrap_or(real.as_path())
        };

        let relative = fsops::relative_path(&real_dest, base);
        self.data_response(Bytes::copy_from_slice(relative.as_os_str().as_bytes()))
    }
}

/// Read until `buf` is full or EOF.
fn read_fill(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
