//! Pool counters for the events the pool's behavior is judged by: cache
//! hits and misses, evictions, and traffic through the disk scheduler.
//!
//! The write counter is the only externally visible difference between a
//! flush that hit the disk and one that did not, so flush idempotence and
//! eviction write-back are both asserted through these counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event counters bumped on the pool's hot paths.
///
/// The fields are private atomics behind increment methods, so only the
/// pool itself can move them; readers take a [`PoolStatsSnapshot`].
/// `Ordering::Relaxed` throughout: the counters are independent of each
/// other and only ever read as a point-in-time copy.
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch found its page already resident.
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A fetch had to go to disk.
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// The replacer gave up a victim frame.
    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// One page read through the disk scheduler.
    pub(crate) fn record_disk_read(&self) {
        self.disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// One page written through the disk scheduler. Every eviction
    /// write-back and explicit flush lands here.
    pub(crate) fn record_disk_write(&self) {
        self.disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Non-atomic copy of the counters for display and assertions.
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

impl PoolStatsSnapshot {
    /// Fraction of fetches served from memory, in [0.0, 1.0].
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

impl fmt::Display for PoolStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} misses ({:.0}% hit rate), {} evictions, {} reads, {} writes",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.disk_reads,
            self.disk_writes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = PoolStats::new();
        assert_eq!(stats.snapshot(), PoolStatsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let stats = PoolStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_eviction();
        stats.record_disk_read();
        stats.record_disk_write();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.disk_reads, 1);
        assert_eq!(snapshot.disk_writes, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = PoolStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        for _ in 0..3 {
            stats.record_hit();
        }
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_display() {
        let stats = PoolStats::new();
        stats.record_hit();
        stats.record_miss();

        let text = format!("{}", stats.snapshot());
        assert!(text.contains("1 hits"));
        assert!(text.contains("50% hit rate"));
    }
}
