//! Transaction slot pool.
//!
//! Responses too large for one frame are anchored in a slot the client
//! pulls from with `C` frames. A slot holds either the buffered tail of
//! a response with a read offset, or an open file streamed on demand.
//! Slot 0 is reserved to mean "unslotted single-frame response", so
//! usable ids are `1..=99`.
//!
//! Allocation probes from a random start to avoid pathological reuse
//! patterns when the pool is lightly loaded. A full pool purges slots
//! older than the configured threshold (abandoned by clients that
//! timed out or went away) before giving up.

use std::{fs::File, time::Duration};

use bytes::Bytes;
use rand::Rng;
use tokio::time::Instant;

use airlock_proto::MAX_TRANSACTIONS;

/// Default age after which an unfinished transaction may be reclaimed.
pub const DEFAULT_PURGE_AFTER: Duration = Duration::from_secs(240);

/// What a live slot is holding.
#[derive(Debug)]
pub enum SlotState {
    /// Buffered response tail; `offset` bytes already delivered.
    Buffered {
        /// Undelivered response bytes (the tail after the first frame).
        data: Bytes,
        /// Read position within `data`.
        offset: usize,
    },
    /// Open file streamed fragment by fragment.
    Streaming(File),
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    created: Instant,
}

/// Fixed pool of transaction slots.
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<Option<Slot>>,
    purge_after: Duration,
}

impl SlotPool {
    /// Pool with every slot free.
    #[must_use]
    pub fn new(purge_after: Duration) -> Self {
        let mut slots = Vec::with_capacity(MAX_TRANSACTIONS);
        slots.resize_with(MAX_TRANSACTIONS, || None);
        Self { slots, purge_after }
    }

    /// True for ids a transaction may legally use.
    #[must_use]
    pub fn valid_id(id: u8) -> bool {
        (1..MAX_TRANSACTIONS).contains(&(id as usize))
    }

    fn find_free(&self) -> Option<u8> {
        let usable = MAX_TRANSACTIONS - 1;
        let start = rand::thread_rng().gen_range(1..MAX_TRANSACTIONS);

        for step in 0..usable {
            let id = 1 + (start - 1 + step) % usable;
            if self.slots[id].is_none() {
                return Some(id as u8);
            }
        }
        None
    }

    /// Reserve a free slot id, purging stale slots if the pool looks
    /// full. Returns `None` only when 99 transactions are genuinely
    /// live.
    pub fn allocate(&mut self) -> Option<u8> {
        if let Some(id) = self.find_free() {
            return Some(id);
        }

        self.purge();
        self.find_free()
    }

    /// Drop every slot older than the purge threshold, closing any
    /// held file.
    pub fn purge(&mut self) {
        let now = Instant::now();
        let mut purged = 0usize;

        for slot in &mut self.slots {
            if slot
                .as_ref()
                .is_some_and(|s| now.duration_since(s.created) > self.purge_after)
            {
                *slot = None;
                purged += 1;
            }
        }

        if purged > 0 {
            tracing::info!(purged, "reclaimed stale transaction slots");
        }
    }

    /// Park a buffered response tail in `id`.
    pub fn store_buffer(&mut self, id: u8, data: Bytes) {
        self.slots[id as usize] = Some(Slot {
            state: SlotState::Buffered { data, offset: 0 },
            created: Instant::now(),
        });
    }

    /// Park an open file in `id`.
    pub fn store_file(&mut self, id: u8, file: File) {
        self.slots[id as usize] = Some(Slot {
            state: SlotState::Streaming(file),
            created: Instant::now(),
        });
    }

    /// Mutable access to a live slot's state.
    pub fn get_mut(&mut self, id: u8) -> Option<&mut SlotState> {
        self.slots
            .get_mut(id as usize)
            .and_then(|s| s.as_mut())
            .map(|s| &mut s.state)
    }

    /// Free one slot (closing a held file). Idempotent.
    pub fn clear(&mut self, id: u8) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = None;
        }
    }

    /// Free every slot. Idempotent.
    pub fn clear_all(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Number of live transactions.
    #[must_use]
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
