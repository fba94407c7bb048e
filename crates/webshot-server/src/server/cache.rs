//! Bounded per-requester settings cache.
//!
//! Remembers the [`PrinterSnapshot`] of the most recent request of each
//! requester so a transport can prefill the next one. Capacity-driven only:
//! there is no time-based expiry, and both [`SettingsCache::get`] and
//! [`SettingsCache::put`] refresh an entry's recency.
//!
//! The cache has no internal synchronization; the supervisor keeps it behind
//! the same mutex as the lock registry.

use crate::server::config::DEFAULT_SETTINGS_CAPACITY;
use core::num::NonZeroUsize;
use lru::LruCache;
use webshot_core::{PrinterSnapshot, RequesterId};

pub struct SettingsCache {
    entries: LruCache<RequesterId, PrinterSnapshot>,
}

impl SettingsCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Returns the cached snapshot for `id`, marking it most recently used.
    pub fn get(&mut self, id: RequesterId) -> Option<PrinterSnapshot> {
        self.entries.get(&id).copied()
    }

    /// Returns the cached snapshot for `id` without touching recency.
    pub fn peek(&self, id: RequesterId) -> Option<PrinterSnapshot> {
        self.entries.peek(&id).copied()
    }

    /// Stores `snapshot` for `id`, marking it most recently used.
    ///
    /// Returns the evicted entry when a new requester pushed out the least
    /// recently used one. Updating an existing requester evicts nothing.
    pub fn put(
        &mut self,
        id: RequesterId,
        snapshot: PrinterSnapshot,
    ) -> Option<(RequesterId, PrinterSnapshot)> {
        self.entries
            .push(id, snapshot)
            .filter(|(evicted, _)| *evicted != id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }
}

impl Default for SettingsCache {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_CAPACITY)
    }
}

impl core::fmt::Debug for SettingsCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SettingsCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
