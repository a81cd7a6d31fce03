//! Tick-stamped stat cache.
//!
//! Directory listings stat every entry anyway, and retrieval clients
//! immediately stat what they listed; the cache turns that second
//! round into a map lookup. Entries are stamped with a coarse tick
//! that a background task advances once per second, wrapping at
//! [`StatCache::MAX_TICK`] to keep the counter small. Age arithmetic
//! accounts for the wrap.
//!
//! The cache tolerates loss (a miss just re-stats), so one coarse
//! mutex around the map is enough. The tick itself is atomic so the
//! ticker task never touches the lock on quiet seconds.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    },
};

/// Shared stat cache.
#[derive(Debug, Default)]
pub struct StatCache {
    tick: AtomicU32,
    cleanup_countdown: AtomicU32,
    entries: Mutex<HashMap<PathBuf, (u32, fs::Metadata)>>,
}

impl StatCache {
    /// Tick counter wraps at this value.
    pub const MAX_TICK: u32 = 5000;

    /// Entries older than this many ticks are dead.
    pub const TTL_TICKS: u32 = 300;

    /// A cleanup pass runs every this many ticks.
    const CLEANUP_EVERY: u32 = 60;

    /// Empty cache at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tick: AtomicU32::new(0),
            cleanup_countdown: AtomicU32::new(Self::CLEANUP_EVERY),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Current tick value.
    #[must_use]
    pub fn now(&self) -> u32 {
        self.tick.load(Ordering::Relaxed)
    }

    /// Age of a stamp in ticks, accounting for counter wrap.
    fn age(&self, stamp: u32) -> u32 {
        (self.now() + Self::MAX_TICK - stamp) % Self::MAX_TICK
    }

    /// Advance the clock by one second; runs a cleanup pass every
    /// [`Self::CLEANUP_EVERY`] ticks. Called by the server's ticker
    /// task.
    pub fn tick(&self) {
        let current = self.tick.load(Ordering::Relaxed);
        let next = if current >= Self::MAX_TICK - 1 { 0 } else { current + 1 };
        self.tick.store(next, Ordering::Relaxed);

        let remaining = self.cleanup_countdown.fetch_sub(1, Ordering::Relaxed);
        if remaining <= 1 {
            self.cleanup_countdown.store(Self::CLEANUP_EVERY, Ordering::Relaxed);
            self.cleanup();
        }
    }

    /// Stat with caching: fresh entries are returned without a
    /// syscall, stale entries are dropped and re-statted.
    ///
    /// # Errors
    ///
    /// Propagates the underlying `stat` failure on a miss.
    pub fn stat(&self, path: &Path) -> io::Result<fs::Metadata> {
        {
            let mut entries = lock(&self.entries);
            if let Some((stamp, meta)) = entries.get(path) {
                if self.age(*stamp) <= Self::TTL_TICKS {
                    return Ok(meta.clone());
                }
                entries.remove(path);
            }
        }

        let meta = fs::metadata(path)?;
        lock(&self.entries).insert(path.to_path_buf(), (self.now(), meta.clone()));
        Ok(meta)
    }

    /// Record metadata obtained elsewhere (directory listings).
    pub fn insert(&self, path: PathBuf, meta: fs::Metadata) {
        lock(&self.entries).insert(path, (self.now(), meta));
    }

    /// Drop every expired entry; when nothing has expired, evict the
    /// single oldest entry instead so the map never plateaus.
    pub fn cleanup(&self) {
        let mut entries = lock(&self.entries);

        let mut oldest: Option<(PathBuf, u32)> = None;
        let mut removed = 0usize;

        entries.retain(|path, (stamp, _)| {
            let age = (self.now() + Self::MAX_TICK - *stamp) % Self::MAX_TICK;
            if age > Self::TTL_TICKS {
                removed += 1;
                return false;
            }
            if oldest.as_ref().is_none_or(|(_, best)| age > *best) {
                oldest = Some((path.clone(), age));
            }
            true
        });

        if removed == 0 {
            if let Some((path, _)) = oldest {
                entries.remove(&path);
            }
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn advance_without_cleanup(&self, ticks: u32) {
        for _ in 0..ticks {
            let current = self.tick.load(Ordering::Relaxed);
            let next = if current >= Self::MAX_TICK - 1 { 0 } else { current + 1 };
            self.tick.store(next, Ordering::Relaxed);
        }
    }
}

/// Lock the map, shrugging off poisoning: the cache holds no
/// invariants worth dying for.
fn lock<'a>(
    entries: &'a Mutex<HashMap<PathBuf, (u32, fs::Metadata)>>,
) -> std::sync::MutexGuard<'a, HashMap<PathBuf, (u32, fs::Metadata)>> {
    match entries.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_answers_without_a_syscall() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"data").unwrap();

        let cache = StatCache::new();
        let first = cache.stat(&path).unwrap();
        assert_eq!(first.len(), 4);

        // Remove the file; a cache hit still answers.
        fs::remove_file(&path).unwrap();
        let second = cache.stat(&path).unwrap();
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn stale_entry_is_restatted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"data").unwrap();

        let cache = StatCache::new();
        cache.stat(&path).unwrap();

        fs::remove_file(&path).unwrap();
        cache.advance_without_cleanup(StatCache::TTL_TICKS + 1);

        // Entry aged out; the re-stat hits the missing file.
        assert!(cache.stat(&path).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn age_survives_tick_wraparound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let cache = StatCache::new();
        cache.advance_without_cleanup(StatCache::MAX_TICK - 10);
        cache.stat(&path).unwrap();

        // Wrap past zero; the entry is 20 ticks old, still fresh.
        fs::remove_file(&path).unwrap();
        cache.advance_without_cleanup(20);
        assert!(cache.stat(&path).is_ok());
    }

    #[test]
    fn cleanup_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatCache::new();

        for name in ["a", "b", "c"] {
            let path = dir.path().join(name);
            fs::write(&path, b"x").unwrap();
            cache.stat(&path).unwrap();
        }
        assert_eq!(cache.len(), 3);

        cache.advance_without_cleanup(StatCache::TTL_TICKS + 1);
        cache.cleanup();
        assert!(cache.is_empty());
    }

    #[test]
    fn cleanup_evicts_oldest_when_nothing_expired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatCache::new();

        let old = dir.path().join("old");
        fs::write(&old, b"x").unwrap();
        cache.stat(&old).unwrap();

        cache.advance_without_cleanup(10);

        let newer = dir.path().join("newer");
        fs::write(&newer, b"x").unwrap();
        cache.stat(&newer).unwrap();

        cache.cleanup();
        assert_eq!(cache.len(), 1);

        // The older entry went; the newer one answers from cache.
        fs::remove_file(&newer).unwrap();
        assert!(cache.stat(&newer).is_ok());
    }

    #[test]
    fn ticker_triggers_periodic_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatCache::new();

        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();
        cache.stat(&path).unwrap();

        // One full cleanup interval with a single fresh entry: the
        // oldest-eviction rule claims it.
        for _ in 0..StatCache::CLEANUP_EVERY {
            cache.tick();
        }
        assert!(cache.is_empty());
    }
}
