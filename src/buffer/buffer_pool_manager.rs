//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - Automatic dirty page write-back through the disk scheduler
//! - LRU-K eviction

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{BasicPageGuard, Frame, PageReadGuard, PageWriteGuard, PoolStats};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::{DiskManager, DiskReply, DiskRequest, DiskScheduler};

/// Mutable pool state guarded by the single pool latch.
///
/// Keeping the page table, free list, and replacer under one mutex makes
/// the page-table invariant trivial: at most one frame per page id at any
/// instant, because lookups and installs cannot interleave.
struct PoolState {
    /// Maps page IDs to frame IDs.
    page_table: HashMap<PageId, FrameId>,

    /// Stack of free frame IDs (LIFO for cache locality).
    free_list: Vec<FrameId>,

    /// Eviction policy for selecting victim frames.
    replacer: LruKReplacer,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────────────────────┐  ┌─────────────────────┐  │
/// │  │ state (Mutex)                │  │  frames: Vec<Frame> │  │
/// │  │  page_table: PageId → Fid  ──┼─▶│  [F0] [F1] [F2] ... │  │
/// │  │  free_list:  Vec<FrameId>    │  └─────────────────────┘  │
/// │  │  replacer:   LruKReplacer    │  ┌─────────────────────┐  │
/// │  └──────────────────────────────┘  │   disk_scheduler    │  │
/// │  ┌──────────────┐ ┌────────────┐   │  (worker thread)    │  │
/// │  │ next_page_id │ │   stats    │   └─────────────────────┘  │
/// │  └──────────────┘ └────────────┘                            │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Locking
/// - `state`: one `Mutex` over page table + free list + replacer. Every
///   public operation takes it for the duration of its metadata updates,
///   so pool→replacer is the only lock order and cannot deadlock.
/// - `frames`: no outer lock; fixed size, each `Frame` has internal locks.
///   The per-frame page latch is only ever taken by page guards *after*
///   the pool latch is released, or by the pool on frames that are
///   unreachable (mid-acquisition or eviction victims with pin count 0).
/// - `stats` / `next_page_id`: atomics.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm, 2);
///
/// // Allocate a new page and write through a guard
/// let guard = bpm.new_page()?;
/// let pid = guard.page_id();
/// let mut guard = guard.upgrade_write();
/// guard.as_mut_slice()[0] = 0xAB;
/// // guard drops: page marked dirty, unpinned
///
/// let guard = bpm.fetch_page_read(pid)?;
/// let data = guard.as_slice();
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Page table, free list, and replacer under the pool latch.
    state: Mutex<PoolState>,

    /// All disk I/O goes through the scheduler's worker thread.
    disk_scheduler: DiskScheduler,

    /// Monotonic page id allocator.
    next_page_id: AtomicU32,

    /// Event counters.
    stats: PoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager.
    ///
    /// # Arguments
    /// * `pool_size` - Number of frames in the pool
    /// * `disk_manager` - Handles disk I/O (moved onto the scheduler's worker)
    /// * `replacer_k` - The K for LRU-K eviction
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager, replacer_k: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        // Allocate all frames upfront
        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        // All frames start on the free list (LIFO order)
        let free_list: Vec<FrameId> = (0..pool_size).map(FrameId::new).collect();

        // Page ids are durable: resume allocation past whatever the file
        // already holds.
        let next_page_id = disk_manager
            .file_size()
            .map(|size| (size / crate::common::config::PAGE_SIZE as u64) as u32)
            .unwrap_or(0);

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer: LruKReplacer::new(pool_size, replacer_k),
            }),
            disk_scheduler: DiskScheduler::new(disk_manager),
            next_page_id: AtomicU32::new(next_page_id),
            stats: PoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Create pages
    // ========================================================================

    /// Allocate a new zeroed page and pin it in a frame.
    ///
    /// The returned guard carries the fresh page id; upgrade it to a write
    /// guard to fill the page in.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn new_page(&self) -> Result<BasicPageGuard<'_>> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::Relaxed));

        // The frame is unreachable until the page-table insert below, so
        // mutating its bytes here cannot contend with a guard.
        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);
        drop(state);

        Ok(BasicPageGuard::new(self, frame_id, page_id))
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page and pin it, without taking the frame latch.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard<'_>> {
        let frame_id = self.fetch_page_pinned(page_id)?;
        Ok(BasicPageGuard::new(self, frame_id, page_id))
    }

    /// Fetch a page for reading (shared access).
    ///
    /// If the page is already in the buffer pool, returns immediately.
    /// Otherwise, loads the page from disk (possibly evicting another page).
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_pinned(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// Same as `fetch_page_read`, but returns an exclusive guard. The page
    /// is marked dirty on the first mutable access through the guard.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_pinned(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    // ========================================================================
    // Public API: Unpin, flush, delete
    // ========================================================================

    /// Unpin a page, recording whether the caller modified it.
    ///
    /// The dirty argument ORs into the frame's flag; a clean unpin never
    /// erases dirty state left by an earlier pin cycle.
    ///
    /// Returns false if the page is not in the pool or its pin count is
    /// already zero.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.0];
        if frame.pin_count() == 0 {
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write a page's current bytes to disk and clear its dirty bit.
    ///
    /// A no-op (and a success) if the page is not in the pool. The write
    /// is issued even if the frame is clean, so back-to-back flushes are
    /// observable only through the write counter.
    ///
    /// The pool latch is released across the disk wait; an extra pin keeps
    /// the frame identifiable until the write lands, so a thread that holds
    /// a page latch while calling back into the pool cannot deadlock a
    /// flusher.
    ///
    /// # Panics
    /// Panics if `page_id` is the invalid sentinel.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        assert!(page_id.is_valid(), "cannot flush the invalid page id");

        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(());
            };
            self.frames[frame_id.0].pin();
            state.replacer.set_evictable(frame_id, false);
            frame_id
        };

        self.write_back(frame_id, page_id);
        self.unpin_frame(frame_id, false);
        Ok(())
    }

    /// Flush every page in the pool to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and recycle its frame.
    ///
    /// A dirty page is written back first. A no-op (and a success) if the
    /// page is not in the pool.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is still pinned
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };

        let frame = &self.frames[frame_id.0];
        if frame.is_pinned() {
            return Err(Error::PagePinned(page_id.0));
        }

        if frame.is_dirty() {
            self.write_back(frame_id, page_id);
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push(frame_id);

        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Get the pool's event counters.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Get the number of pages in the buffer pool.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    // ========================================================================
    // Internal: Called by page guards
    // ========================================================================

    /// Access a frame by id. Used by guards to take the frame latch.
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.0]
    }

    /// Release one pin on a frame. Called by page guards on drop.
    pub(crate) fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();
        let frame = &self.frames[frame_id.0];

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            state.replacer.set_evictable(frame_id, true);
        }
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    /// Fetch a page into the buffer pool and pin it, returning its frame.
    fn fetch_page_pinned(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            // Cache hit. The dirty bit is left alone: only unpins and
            // write guards may set it.
            self.frames[frame_id.0].pin();
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            self.stats.record_hit();
            return Ok(frame_id);
        }

        // Cache miss: bring the page in from disk.
        self.stats.record_miss();
        let frame_id = self.acquire_frame(&mut state)?;

        let (ack, done) = DiskScheduler::create_completion();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: false,
            data: Box::new(Page::new()),
            page_id,
            ack,
        });
        let reply = self.wait_for_disk(done, page_id);
        self.stats.record_disk_read();

        let frame = &self.frames[frame_id.0];
        frame
            .page_mut()
            .as_mut_slice()
            .copy_from_slice(reply.data.as_slice());
        frame.set_page_id(Some(page_id));
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    /// Get a free frame, evicting if necessary.
    ///
    /// On return the frame is clean, unmapped, unpinned, and untracked by
    /// the replacer.
    fn acquire_frame(&self, state: &mut MutexGuard<'_, PoolState>) -> Result<FrameId> {
        // Try the free list first
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        // No free frames, need to evict
        let frame_id = state.replacer.evict().ok_or(Error::NoFreeFrames)?;
        self.stats.record_eviction();

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id().expect("evicted frame backs no page");

        // A dirty victim's bytes reach disk before its mapping disappears.
        if frame.is_dirty() {
            self.write_back(frame_id, old_page_id);
        }

        state.page_table.remove(&old_page_id);
        frame.set_page_id(None);
        frame.clear_dirty();

        Ok(frame_id)
    }

    /// Write a frame's bytes to disk synchronously and clear its dirty bit.
    ///
    /// The caller must hold the pool latch or a pin on the frame, so the
    /// mapping cannot change underneath the write.
    fn write_back(&self, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];

        // Clear before snapshotting the bytes: a writer that dirties the
        // frame after this point keeps its mark for the next flush.
        frame.clear_dirty();

        let mut data = Box::new(Page::new());
        {
            let page = frame.page();
            data.as_mut_slice().copy_from_slice(page.as_slice());
        }

        let (ack, done) = DiskScheduler::create_completion();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: true,
            data,
            page_id,
            ack,
        });
        self.wait_for_disk(done, page_id);

        self.stats.record_disk_write();
    }

    /// Block on a disk completion. Failures are logged, not propagated;
    /// the reply always arrives.
    fn wait_for_disk(
        &self,
        done: crate::storage::CompletionWaiter,
        page_id: PageId,
    ) -> DiskReply {
        let reply = done.recv().expect("disk scheduler dropped a completion");
        if !reply.ok {
            warn!("disk request for page {page_id} reported failure");
        }
        reply
    }
}
