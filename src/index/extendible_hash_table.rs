//! Disk-backed extendible hash table.
//!
//! All state lives in three kinds of pages reached from a single header:
//!
//! ```text
//!  header ──▶ directory ──▶ bucket
//!  (high      (low           (packed
//!   hash       hash           key/value
//!   bits)      bits)          pairs)
//! ```
//!
//! Every operation descends through page guards obtained from the buffer
//! pool; the table itself holds no in-memory state beyond its
//! configuration. Buckets split on overflow, doubling the directory when a
//! bucket's local depth catches up with the global depth. The table never
//! shrinks on remove.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::debug;

use crate::buffer::{BufferPoolManager, PageWriteGuard};
use crate::common::{PageId, Result};
use crate::storage::page::{
    HashTableBucketPage, HashTableDirectoryPage, HashTableHeaderPage,
};

/// Produces the 32-bit hash the table routes on.
///
/// Supplied by the caller at construction; the table is generic over it so
/// dispatch is static.
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// SipHash-based hasher for any `Hash` key.
///
/// `std::collections::hash_map::DefaultHasher::new()` uses fixed keys, so
/// the hash of a key is stable across runs, a requirement for an on-disk
/// index.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultKeyHasher;

impl<K: Hash> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// A disk-backed extendible hash index mapping unique keys to values.
///
/// Generic over the key, value, and hash function; keys and values must be
/// plain-old-data so they can live on bucket pages.
pub struct DiskExtendibleHashTable<K, V, H = DefaultKeyHasher> {
    bpm: Arc<BufferPoolManager>,
    hasher: H,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, H> DiskExtendibleHashTable<K, V, H>
where
    K: Pod + PartialEq,
    V: Pod,
    H: KeyHasher<K>,
{
    /// Create a table, allocating and initializing its header page.
    ///
    /// * `header_max_depth` - how many high hash bits route to directories
    /// * `directory_max_depth` - cap on directory growth
    /// * `bucket_max_size` - entries per bucket, at most
    ///   [`crate::storage::page::bucket_page_capacity`]
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        let guard = bpm.new_page()?;
        let header_page_id = guard.page_id();

        let mut guard = guard.upgrade_write();
        HashTableHeaderPage::new(header_max_depth).write_to(guard.as_mut_slice());
        drop(guard);

        Ok(Self {
            bpm,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    /// Bind a table to an existing header page, e.g. after reopening the
    /// database file. The header itself is not touched.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        hasher: H,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Self {
        Self {
            bpm,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        }
    }

    /// Page id of the table's header.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    #[inline]
    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash_key(key)
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Insert `(key, value)`.
    ///
    /// Returns `Ok(false)` for a duplicate key, or when the routed bucket
    /// cannot split because its directory is at maximum size.
    pub fn insert(&self, key: K, value: V) -> Result<bool> {
        let hash = self.hash(&key);

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let mut header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
        let directory_idx = header.hash_to_directory_index(hash);
        let directory_page_id = header.directory_page_id(directory_idx);

        if !directory_page_id.is_valid() {
            return self.insert_to_new_directory(
                &mut header_guard,
                &mut header,
                directory_idx,
                key,
                value,
            );
        }
        drop(header_guard);

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        let mut directory = HashTableDirectoryPage::from_bytes(directory_guard.as_slice());

        let mut bucket_idx = directory.hash_to_bucket_index(hash);
        let mut bucket_guard = self.bpm.fetch_page_write(directory.bucket_page_id(bucket_idx))?;
        let mut bucket = HashTableBucketPage::<K, V>::from_bytes(bucket_guard.as_slice());

        // A duplicate always routes to the same bucket as the key itself,
        // so one check up front covers every split path below.
        if bucket.lookup(&key).is_some() {
            return Ok(false);
        }

        let mut split_performed = false;
        while bucket.is_full() {
            if directory.global_depth() == directory.local_depth(bucket_idx)
                && directory.size() == directory.max_size()
            {
                // Out of directory: the insert fails, but any splits we
                // already performed stay, including entries migrated into
                // the bucket currently in hand.
                if split_performed {
                    bucket.write_to(bucket_guard.as_mut_slice());
                    directory.write_to(directory_guard.as_mut_slice());
                }
                return Ok(false);
            }
            split_performed = true;

            // The sibling index under the pre-split local depth.
            let split_idx = directory.split_image_index(bucket_idx);

            let new_bucket_guard = self.bpm.new_page()?;
            let new_bucket_page_id = new_bucket_guard.page_id();
            let mut new_bucket_guard = new_bucket_guard.upgrade_write();
            let mut new_bucket = HashTableBucketPage::<K, V>::new(self.bucket_max_size);

            if directory.global_depth() == directory.local_depth(bucket_idx) {
                // Local depth moves first; the doubling then mirrors it and
                // the mapping update below repoints the split image.
                directory.incr_local_depth(bucket_idx);
                directory.incr_global_depth();
            } else {
                directory.incr_local_depth(bucket_idx);
            }
            let new_local_depth = directory.local_depth(bucket_idx);
            Self::update_directory_mapping(
                &mut directory,
                bucket_idx,
                split_idx,
                new_bucket_page_id,
                new_local_depth,
            );

            // Redistribute: entries whose hash selects the split image move
            // to the new bucket.
            let new_mask = (1u32 << new_local_depth) - 1;
            let split_target = (split_idx as u32) & new_mask;
            let mut i = 0;
            while i < bucket.size() {
                let (entry_key, entry_value) = *bucket.entry_at(i);
                if (self.hash(&entry_key) & new_mask) == split_target {
                    bucket.remove_at(i);
                    let moved = new_bucket.insert(entry_key, entry_value);
                    debug_assert!(moved, "redistribution overflowed a fresh bucket");
                } else {
                    i += 1;
                }
            }

            // Continue with whichever bucket now owns the key's hash; the
            // other side is finished and goes to its page.
            if (hash & new_mask) == split_target {
                bucket.write_to(bucket_guard.as_mut_slice());
                bucket_guard = new_bucket_guard;
                bucket = new_bucket;
            } else {
                new_bucket.write_to(new_bucket_guard.as_mut_slice());
            }
            bucket_idx = directory.hash_to_bucket_index(hash);
        }

        let inserted = bucket.insert(key, value);
        if inserted || split_performed {
            bucket.write_to(bucket_guard.as_mut_slice());
        }
        if split_performed {
            directory.write_to(directory_guard.as_mut_slice());
        }
        Ok(inserted)
    }

    /// First insert routed to an empty header slot: allocate a directory
    /// page, give it one bucket at slot 0 with local depth 0, and record
    /// the directory in the header.
    fn insert_to_new_directory(
        &self,
        header_guard: &mut PageWriteGuard<'_>,
        header: &mut HashTableHeaderPage,
        directory_idx: usize,
        key: K,
        value: V,
    ) -> Result<bool> {
        let guard = self.bpm.new_page()?;
        let directory_page_id = guard.page_id();
        let mut directory_guard = guard.upgrade_write();
        let mut directory = HashTableDirectoryPage::new(self.directory_max_depth);

        if !self.insert_to_new_bucket(&mut directory, 0, key, value)? {
            return Ok(false);
        }
        directory.write_to(directory_guard.as_mut_slice());

        header.set_directory_page_id(directory_idx, directory_page_id);
        header.write_to(header_guard.as_mut_slice());
        Ok(true)
    }

    /// Allocate a bucket page, insert the first entry, and wire it into
    /// the directory at `bucket_idx` with local depth 0.
    fn insert_to_new_bucket(
        &self,
        directory: &mut HashTableDirectoryPage,
        bucket_idx: usize,
        key: K,
        value: V,
    ) -> Result<bool> {
        let guard = self.bpm.new_page()?;
        let bucket_page_id = guard.page_id();
        let mut bucket_guard = guard.upgrade_write();
        let mut bucket = HashTableBucketPage::<K, V>::new(self.bucket_max_size);

        if !bucket.insert(key, value) {
            return Ok(false);
        }
        bucket.write_to(bucket_guard.as_mut_slice());

        directory.set_bucket_page_id(bucket_idx, bucket_page_id);
        directory.set_local_depth(bucket_idx, 0);
        Ok(true)
    }

    /// Rewrite every directory slot affected by a split.
    ///
    /// All slots whose low `new_local_depth` bits match the split image
    /// point at the new bucket; the slots that keep the old bucket record
    /// the bumped local depth. Updating only the single split-image slot
    /// would leave stale mappings whenever local depth is below global
    /// depth.
    fn update_directory_mapping(
        directory: &mut HashTableDirectoryPage,
        old_bucket_idx: usize,
        split_idx: usize,
        new_bucket_page_id: PageId,
        new_local_depth: u32,
    ) {
        let new_mask = (1u32 << new_local_depth) - 1;
        let split_target = (split_idx as u32) & new_mask;
        let old_target = (old_bucket_idx as u32) & new_mask;

        for idx in 0..directory.size() {
            let tag = (idx as u32) & new_mask;
            if tag == split_target {
                directory.set_bucket_page_id(idx, new_bucket_page_id);
                directory.set_local_depth(idx, new_local_depth as u8);
            } else if tag == old_target {
                directory.set_local_depth(idx, new_local_depth as u8);
            }
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Point lookup. Returns the value stored under `key`, if any.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        drop(header_guard);

        if !directory_page_id.is_valid() {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        let directory = HashTableDirectoryPage::from_bytes(directory_guard.as_slice());
        let bucket_page_id = directory.bucket_page_id(directory.hash_to_bucket_index(hash));

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = HashTableBucketPage::<K, V>::from_bytes(bucket_guard.as_slice());
        Ok(bucket.lookup(key))
    }

    // ========================================================================
    // Remove
    // ========================================================================

    /// Remove `key`. Returns whether it was present.
    ///
    /// Buckets are never coalesced and the directory never shrinks; an
    /// emptied bucket simply stays empty.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        drop(header_guard);

        if !directory_page_id.is_valid() {
            return Ok(false);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        let directory = HashTableDirectoryPage::from_bytes(directory_guard.as_slice());
        let bucket_page_id = directory.bucket_page_id(directory.hash_to_bucket_index(hash));

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        let mut bucket = HashTableBucketPage::<K, V>::from_bytes(bucket_guard.as_slice());

        let removed = bucket.remove(key);
        if removed {
            bucket.write_to(bucket_guard.as_mut_slice());
        }
        Ok(removed)
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Check every live directory's invariants, panicking on violation.
    pub fn verify_integrity(&self) -> Result<()> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());

        for idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(idx);
            if !directory_page_id.is_valid() {
                continue;
            }
            let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
            HashTableDirectoryPage::from_bytes(directory_guard.as_slice()).verify_integrity();
        }
        Ok(())
    }

    /// Log the table's occupancy at debug level.
    pub fn print_table(&self) -> Result<()> {
        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
        debug!(
            "header page {} (max_depth {})",
            self.header_page_id,
            header.max_depth()
        );

        for idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(idx);
            if !directory_page_id.is_valid() {
                continue;
            }
            let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
            let directory = HashTableDirectoryPage::from_bytes(directory_guard.as_slice());
            debug!(
                "  directory[{idx}] = {directory_page_id} (global_depth {})",
                directory.global_depth()
            );

            for bucket_idx in 0..directory.size() {
                let bucket_page_id = directory.bucket_page_id(bucket_idx);
                let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
                let bucket = HashTableBucketPage::<K, V>::from_bytes(bucket_guard.as_slice());
                debug!(
                    "    bucket[{bucket_idx}] = {bucket_page_id} (local_depth {}, {}/{} entries)",
                    directory.local_depth(bucket_idx),
                    bucket.size(),
                    bucket.max_size()
                );
            }
        }
        Ok(())
    }
}
