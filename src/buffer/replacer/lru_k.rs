//! LRU-K replacement policy.
//!
//! Evicts the frame with the largest backward K-distance: the age of its
//! k-th most recent access under a global logical clock. Frames with fewer
//! than `k` recorded accesses have infinite K-distance and are preferred
//! victims; ties among them fall back to plain LRU on the oldest recorded
//! timestamp.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use crate::common::FrameId;

/// K-distance of a frame with fewer than `k` recorded accesses.
const INF: u64 = u64::MAX;

/// Per-frame access bookkeeping.
///
/// `history` holds the `k` most recent access timestamps, newest first.
struct LruKNode {
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    /// A node is created by its first access and starts non-evictable.
    fn new(timestamp: u64) -> Self {
        let mut history = VecDeque::new();
        history.push_front(timestamp);
        Self {
            history,
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: u64, k: usize) {
        self.history.push_front(timestamp);
        self.history.truncate(k);
    }

    /// Backward K-distance at logical time `now`.
    fn k_distance(&self, now: u64, k: usize) -> u64 {
        if self.history.len() < k {
            INF
        } else {
            now - self.history[k - 1]
        }
    }

    /// Oldest recorded access timestamp.
    fn earliest_timestamp(&self) -> u64 {
        *self
            .history
            .back()
            .expect("LRU-K node has an empty history")
    }
}

/// LRU-K eviction policy over the pool's frames.
///
/// The replacer holds no lock of its own: the buffer pool serializes every
/// call under its pool latch. Misuse (out-of-range frames, toggling an
/// untracked frame, removing a pinned frame) is a caller bug and panics.
pub struct LruKReplacer {
    /// Tracked frames. A node exists only while its frame backs a live page.
    node_store: HashMap<FrameId, LruKNode>,

    /// Global logical clock, bumped on every recorded access.
    current_timestamp: u64,

    /// Number of nodes currently flagged evictable.
    evictable_count: usize,

    /// Pool size; frame ids must be in `[0, num_frames)`.
    num_frames: usize,

    /// The K in LRU-K.
    k: usize,
}

impl LruKReplacer {
    /// Create a replacer for a pool of `num_frames` frames.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            node_store: HashMap::new(),
            current_timestamp: 0,
            evictable_count: 0,
            num_frames,
            k,
        }
    }

    /// Record an access to `frame_id` at the next logical timestamp.
    ///
    /// Creates the node (non-evictable, single-entry history) on first
    /// access.
    ///
    /// # Panics
    /// Panics if `frame_id` is outside the pool.
    pub fn record_access(&mut self, frame_id: FrameId) {
        assert!(
            frame_id.0 < self.num_frames,
            "{frame_id} is out of range for a pool of {} frames",
            self.num_frames
        );

        self.current_timestamp += 1;
        let now = self.current_timestamp;
        let k = self.k;

        match self.node_store.entry(frame_id) {
            Entry::Occupied(mut node) => node.get_mut().record_access(now, k),
            Entry::Vacant(slot) => {
                slot.insert(LruKNode::new(now));
            }
        }
    }

    /// Flag or unflag `frame_id` as an eviction candidate.
    ///
    /// The evictable counter moves exactly when the flag changes.
    ///
    /// # Panics
    /// Panics if the frame is not tracked.
    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let node = self
            .node_store
            .get_mut(&frame_id)
            .unwrap_or_else(|| panic!("set_evictable on untracked {frame_id}"));

        if node.is_evictable != evictable {
            node.is_evictable = evictable;
            if evictable {
                self.evictable_count += 1;
            } else {
                self.evictable_count -= 1;
            }
        }
    }

    /// Evict the frame with the largest backward K-distance, breaking ties
    /// by the oldest recorded timestamp. Returns `None` if nothing is
    /// evictable. The victim is removed from the replacer.
    pub fn evict(&mut self) -> Option<FrameId> {
        let now = self.current_timestamp;
        let mut victim: Option<(FrameId, u64, u64)> = None;

        for (&frame_id, node) in &self.node_store {
            if !node.is_evictable {
                continue;
            }

            let distance = node.k_distance(now, self.k);
            let earliest = node.earliest_timestamp();

            let better = match victim {
                None => true,
                Some((_, best_distance, best_earliest)) => {
                    distance > best_distance
                        || (distance == best_distance && earliest < best_earliest)
                }
            };
            if better {
                victim = Some((frame_id, distance, earliest));
            }
        }

        let (frame_id, _, _) = victim?;
        self.node_store.remove(&frame_id);
        self.evictable_count -= 1;
        Some(frame_id)
    }

    /// Drop a tracked frame without consulting the policy.
    ///
    /// A no-op for untracked frames.
    ///
    /// # Panics
    /// Panics if the frame is tracked but not evictable.
    pub fn remove(&mut self, frame_id: FrameId) {
        let Some(node) = self.node_store.get(&frame_id) else {
            return;
        };
        assert!(node.is_evictable, "remove on non-evictable {frame_id}");

        self.node_store.remove(&frame_id);
        self.evictable_count -= 1;
    }

    /// Number of currently evictable frames.
    pub fn size(&self) -> usize {
        self.evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(id: usize) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_evict_order_with_k2() {
        let mut replacer = LruKReplacer::new(7, 2);

        // ts 1..=5: one access each to frames 1-5
        for id in 1..=5 {
            replacer.record_access(fid(id));
        }
        // ts 6: frame 1 reaches two accesses
        replacer.record_access(fid(1));

        for id in 1..=5 {
            replacer.set_evictable(fid(id), true);
        }
        assert_eq!(replacer.size(), 5);

        // Frames 2-5 have infinite K-distance; ties break by the oldest
        // timestamp, so eviction runs 2, 3, 4 before frame 1's finite
        // distance is ever preferred.
        assert_eq!(replacer.evict(), Some(fid(2)));
        assert_eq!(replacer.evict(), Some(fid(3)));
        assert_eq!(replacer.evict(), Some(fid(4)));
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(fid(5)));
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_finite_distances_prefer_older_kth_access() {
        let mut replacer = LruKReplacer::new(4, 2);

        // Frame 0: accesses at ts 1, 3. Frame 1: accesses at ts 2, 4.
        replacer.record_access(fid(0)); // ts 1
        replacer.record_access(fid(1)); // ts 2
        replacer.record_access(fid(0)); // ts 3
        replacer.record_access(fid(1)); // ts 4

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);

        // K-distance of frame 0 is 4-1=3, frame 1 is 4-2=2.
        assert_eq!(replacer.evict(), Some(fid(0)));
        assert_eq!(replacer.evict(), Some(fid(1)));
    }

    #[test]
    fn test_reaccess_refreshes_distance() {
        let mut replacer = LruKReplacer::new(3, 2);

        replacer.record_access(fid(0)); // ts 1
        replacer.record_access(fid(0)); // ts 2
        replacer.record_access(fid(1)); // ts 3
        replacer.record_access(fid(1)); // ts 4
        replacer.record_access(fid(0)); // ts 5: frame 0 now has {5, 2}

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);

        // Frame 0's 2nd most recent access (ts 2) is older than frame 1's
        // (ts 3), so frame 0 goes first.
        assert_eq!(replacer.evict(), Some(fid(0)));
    }

    #[test]
    fn test_non_evictable_frames_are_skipped() {
        let mut replacer = LruKReplacer::new(3, 2);

        replacer.record_access(fid(0));
        replacer.record_access(fid(1));
        replacer.set_evictable(fid(1), true);

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(fid(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_set_evictable_toggles_size_once() {
        let mut replacer = LruKReplacer::new(3, 2);

        replacer.record_access(fid(0));
        assert_eq!(replacer.size(), 0);

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(0), true); // no double count
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(fid(0), false);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_remove_untracked_is_noop() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.remove(fid(2));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_remove_evictable_frame() {
        let mut replacer = LruKReplacer::new(3, 2);

        replacer.record_access(fid(0));
        replacer.record_access(fid(1));
        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);

        replacer.remove(fid(0));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(fid(1)));
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_remove_non_evictable_panics() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.record_access(fid(0));
        replacer.remove(fid(0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_access_out_of_range_panics() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.record_access(fid(3));
    }

    #[test]
    #[should_panic(expected = "untracked")]
    fn test_set_evictable_untracked_panics() {
        let mut replacer = LruKReplacer::new(3, 2);
        replacer.set_evictable(fid(0), true);
    }

    #[test]
    fn test_history_is_bounded_to_k() {
        let mut replacer = LruKReplacer::new(2, 2);

        // Many accesses to frame 0; history keeps only the newest two.
        for _ in 0..10 {
            replacer.record_access(fid(0)); // ts 1..=10
        }
        replacer.record_access(fid(1)); // ts 11
        replacer.record_access(fid(1)); // ts 12

        replacer.set_evictable(fid(0), true);
        replacer.set_evictable(fid(1), true);

        // Frame 0: kth recent = ts 9, distance 3. Frame 1: ts 11, distance 1.
        assert_eq!(replacer.evict(), Some(fid(0)));
    }
}
