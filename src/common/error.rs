//! Error types for stratumdb.

use std::io;

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All recoverable failures in the storage core.
///
/// Caller bugs (out-of-range frame ids, flushing the invalid page id,
/// removing a pinned frame from the replacer) are not represented here;
/// those terminate the process via an assertion.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Buffer pool has no free frame and no evictable frame.
    ///
    /// This happens when every frame is pinned.
    #[error("no free or evictable frame available in the buffer pool")]
    NoFreeFrames,

    /// Attempted to delete a page that is still pinned.
    #[error("page {0} is still pinned")]
    PagePinned(u32),
}
