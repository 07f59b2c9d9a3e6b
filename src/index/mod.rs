//! Index structures built on the buffer pool.
//!
//! - [`DiskExtendibleHashTable`] - directory-based extendible hash index

mod extendible_hash_table;

pub use extendible_hash_table::{DefaultKeyHasher, DiskExtendibleHashTable, KeyHasher};
