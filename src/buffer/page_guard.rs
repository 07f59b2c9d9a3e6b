//! RAII guards for page access.
//!
//! These guards provide safe access to pages in the buffer pool:
//! - [`BasicPageGuard`] - Holds a pin only; upgrade it to read or write
//! - [`PageReadGuard`] - Shared read access
//! - [`PageWriteGuard`] - Exclusive write access (dirties on first mutation)
//!
//! Every guard owns exactly one pin and releases it exactly once on drop.
//! Latched guards release the frame latch before the pin.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// A pinned page without a latch.
///
/// The basic guard keeps its frame resident but grants no access to the
/// page bytes; call [`BasicPageGuard::upgrade_read`] or
/// [`BasicPageGuard::upgrade_write`] to latch the frame and read or write.
/// Dropping it releases the pin (never dirtying the frame, since nothing
/// could have been written through it).
pub struct BasicPageGuard<'a> {
    /// Reference back to BPM for unpin on drop.
    bpm: &'a BufferPoolManager,
    /// Frame holding this page.
    frame_id: FrameId,
    /// Page ID for convenience.
    page_id: PageId,
}

impl<'a> BasicPageGuard<'a> {
    /// Create a new basic guard over an already-pinned frame.
    pub(crate) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Take the frame's shared latch, transferring the pin to the new
    /// guard. The basic guard is consumed without releasing the pin.
    pub fn upgrade_read(self) -> PageReadGuard<'a> {
        let this = ManuallyDrop::new(self);
        let lock = this.bpm.frame(this.frame_id).page();
        PageReadGuard {
            bpm: this.bpm,
            frame_id: this.frame_id,
            page_id: this.page_id,
            lock: Some(lock),
        }
    }

    /// Take the frame's exclusive latch, transferring the pin to the new
    /// guard.
    pub fn upgrade_write(self) -> PageWriteGuard<'a> {
        let this = ManuallyDrop::new(self);
        let lock = this.bpm.frame(this.frame_id).page_mut();
        PageWriteGuard {
            bpm: this.bpm,
            frame_id: this.frame_id,
            page_id: this.page_id,
            modified: false,
            lock: Some(lock),
        }
    }
}

impl Drop for BasicPageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_frame(self.frame_id, false);
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
/// The page is automatically unpinned when the guard is dropped.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(page_id)?;
/// let data = guard.as_slice();  // Deref to &Page
/// // guard drops here: latch released, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    /// Reference back to BPM for unpin on drop.
    bpm: &'a BufferPoolManager,
    /// Frame holding this page.
    frame_id: FrameId,
    /// Page ID for convenience.
    page_id: PageId,
    /// Latch guard; `Some` until drop, released before the pin.
    lock: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    /// Create a new read guard.
    ///
    /// Called by `BufferPoolManager::fetch_page_read()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page guard used after drop")
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Latch first, then the pin.
        self.lock.take();
        self.bpm.unpin_frame(self.frame_id, false);
    }
}

/// Guard for exclusive write access to a page.
///
/// Only one `PageWriteGuard` can exist for a page at a time. The frame is
/// marked dirty on drop iff the page bytes were mutably borrowed through
/// the guard.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(page_id)?;
/// guard.as_mut_slice()[0] = 0xFF;  // DerefMut to &mut Page
/// // guard drops here: latch released, page marked dirty and unpinned
/// ```
pub struct PageWriteGuard<'a> {
    /// Reference back to BPM for unpin on drop.
    bpm: &'a BufferPoolManager,
    /// Frame holding this page.
    frame_id: FrameId,
    /// Page ID for convenience.
    page_id: PageId,
    /// Whether the page bytes were mutably accessed.
    modified: bool,
    /// Latch guard; `Some` until drop, released before the pin.
    lock: Option<RwLockWriteGuard<'a, Page>>,
}

impl<'a> PageWriteGuard<'a> {
    /// Create a new write guard.
    ///
    /// Called by `BufferPoolManager::fetch_page_write()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            modified: false,
            lock: Some(lock),
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.lock.as_ref().expect("page guard used after drop")
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.modified = true;
        self.lock.as_mut().expect("page guard used after drop")
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        // Latch first, then the pin (with the observed dirty state).
        self.lock.take();
        self.bpm.unpin_frame(self.frame_id, self.modified);
    }
}
