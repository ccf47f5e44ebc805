//! Block store statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by a block store.
///
/// All fields are atomic so stores can count through `&self`.
///
/// # Memory Ordering
/// We use `Ordering::Relaxed` for all operations: counters are independent
/// and only need atomicity.
///
/// # Example
/// ```
/// use blockbtree::StoreStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = StoreStats::new();
/// stats.blocks_read.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.blocks_read.load(Ordering::Relaxed), 1);
/// ```
#[derive(Debug)]
pub struct StoreStats {
    /// Number of blocks read.
    pub blocks_read: AtomicU64,

    /// Number of blocks written.
    pub blocks_written: AtomicU64,

    /// Number of allocation notifications received.
    pub allocations: AtomicU64,

    /// Number of deallocation notifications received.
    pub deallocations: AtomicU64,
}

impl StoreStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self {
            blocks_read: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_read(&self) {
        self.blocks_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_allocate(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deallocate(&self) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.blocks_read.store(0, Ordering::Relaxed);
        self.blocks_written.store(0, Ordering::Relaxed);
        self.allocations.store(0, Ordering::Relaxed);
        self.deallocations.store(0, Ordering::Relaxed);
    }
}

impl Default for StoreStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of block store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStatsSnapshot {
    pub blocks_read: u64,
    pub blocks_written: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

impl StoreStatsSnapshot {
    /// Blocks currently handed out by the freelist, as seen by the store.
    ///
    /// Counts only blocks allocated through notifications, so the superblock
    /// and root show up here too after a create.
    pub fn blocks_in_use(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }
}

impl fmt::Display for StoreStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ reads: {}, writes: {}, allocated: {}, freed: {}, in_use: {} }}",
            self.blocks_read,
            self.blocks_written,
            self.allocations,
            self.deallocations,
            self.blocks_in_use()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_initial() {
        let stats = StoreStats::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot, StoreStatsSnapshot::default());
        assert_eq!(snapshot.blocks_in_use(), 0);
    }

    #[test]
    fn test_stats_counting() {
        let stats = StoreStats::new();
        stats.record_read();
        stats.record_read();
        stats.record_write();
        stats.record_allocate();
        stats.record_allocate();
        stats.record_allocate();
        stats.record_deallocate();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.blocks_read, 2);
        assert_eq!(snapshot.blocks_written, 1);
        assert_eq!(snapshot.blocks_in_use(), 2);

        stats.reset();
        assert_eq!(stats.snapshot(), StoreStatsSnapshot::default());
    }

    #[test]
    fn test_stats_display() {
        let stats = StoreStats::new();
        stats.blocks_read.fetch_add(80, Ordering::Relaxed);
        stats.blocks_written.fetch_add(20, Ordering::Relaxed);
        stats.allocations.fetch_add(5, Ordering::Relaxed);
        stats.deallocations.fetch_add(2, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot());
        assert!(display.contains("reads: 80"));
        assert!(display.contains("writes: 20"));
        assert!(display.contains("in_use: 3"));
    }
}
