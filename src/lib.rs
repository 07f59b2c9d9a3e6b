//! stratumdb - the storage-and-indexing core of a relational engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         stratumdb                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Index Layer (index/)                         │    │
//! │  │   DiskExtendibleHashTable: header → directory →     │    │
//! │  │   bucket pages, splits and directory doubling       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                            ↓ page guards                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Buffer Pool (buffer/)                        │    │
//! │  │   BufferPoolManager + Frame + LRU-K replacer        │    │
//! │  │   Basic/Read/Write page guards + statistics         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                            ↓ scheduled I/O                  │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Storage Layer (storage/)                     │    │
//! │  │   DiskScheduler (worker thread) + DiskManager       │    │
//! │  │   Page + hash-index page layouts                    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and LRU-K eviction
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - The disk-backed extendible hash table
//!
//! # Quick Start
//! ```no_run
//! use stratumdb::buffer::BufferPoolManager;
//! use stratumdb::storage::DiskManager;
//!
//! let dm = DiskManager::create("my_database.db").unwrap();
//! let bpm = BufferPoolManager::new(16, dm, 2);
//!
//! // Allocate a page and write through a guard
//! let guard = bpm.new_page().unwrap();
//! let mut guard = guard.upgrade_write();
//! guard.as_mut_slice()[0] = 0xAB;
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{
    BasicPageGuard, BufferPoolManager, Frame, PageReadGuard, PageWriteGuard, PoolStats,
    PoolStatsSnapshot,
};
pub use index::{DefaultKeyHasher, DiskExtendibleHashTable, KeyHasher};
pub use storage::page::Page;
pub use storage::{DiskManager, DiskScheduler};
