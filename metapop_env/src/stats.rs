//! Synchronization counters.
//!
//! An explicit collector handed to the substrate at construction time.
//! Nothing here is process-wide: two graphs built with two collectors never
//! share counts.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for substrate operations.
#[derive(Debug, Default)]
pub struct SyncStats {
    local_locks: AtomicU64,
    remote_locks: AtomicU64,
    local_acquires: AtomicU64,
    remote_acquires: AtomicU64,
    reads: AtomicU64,
    relocations: AtomicU64,
    relocated_bytes: AtomicU64,
    sync_rounds: AtomicU64,
    gathers: AtomicU64,
}

/// Plain snapshot of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncStatsSnapshot {
    pub local_locks: u64,
    pub remote_locks: u64,
    pub local_acquires: u64,
    pub remote_acquires: u64,
    pub reads: u64,
    pub relocations: u64,
    pub relocated_bytes: u64,
    pub sync_rounds: u64,
    pub gathers: u64,
}

impl SyncStats {
    /// Creates a zeroed collector.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lock(&self, local: bool) {
        let counter = if local { &self.local_locks } else { &self.remote_locks };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire(&self, local: bool) {
        let counter = if local { &self.local_acquires } else { &self.remote_acquires };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_relocation(&self, bytes: usize) {
        self.relocations.fetch_add(1, Ordering::Relaxed);
        self.relocated_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.sync_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gather(&self) {
        self.gathers.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            local_locks: self.local_locks.load(Ordering::Relaxed),
            remote_locks: self.remote_locks.load(Ordering::Relaxed),
            local_acquires: self.local_acquires.load(Ordering::Relaxed),
            remote_acquires: self.remote_acquires.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            relocations: self.relocations.load(Ordering::Relaxed),
            relocated_bytes: self.relocated_bytes.load(Ordering::Relaxed),
            sync_rounds: self.sync_rounds.load(Ordering::Relaxed),
            gathers: self.gathers.load(Ordering::Relaxed),
        }
    }
}
