//! Hash-index bucket page.
//!
//! A bucket holds up to `max_size` key/value pairs with unique keys.
//! Keys and values are plain-old-data ([`bytemuck::Pod`]) and are stored
//! packed, so the page capacity is a compile-time function of the entry
//! size.
//!
//! # Layout
//! ```text
//! Offset  Size              Field
//! ------  ----              -----
//! 0       4                 size (u32, little-endian)
//! 4       4                 max_size (u32, little-endian)
//! 8       size × |K|+|V|    packed (K, V) entries
//! ```

use std::mem::size_of;

use bytemuck::Pod;

use crate::common::config::PAGE_SIZE;

const OFFSET_SIZE: usize = 0;
const OFFSET_MAX_SIZE: usize = 4;
const OFFSET_ENTRIES: usize = 8;

/// Largest number of `(K, V)` entries that fit in one bucket page.
pub const fn bucket_page_capacity<K, V>() -> usize {
    (PAGE_SIZE - OFFSET_ENTRIES) / (size_of::<K>() + size_of::<V>())
}

/// In-memory form of a bucket page.
///
/// `entries.len()` is the on-page `size` field.
pub struct HashTableBucketPage<K, V> {
    max_size: u32,
    entries: Vec<(K, V)>,
}

impl<K, V> HashTableBucketPage<K, V>
where
    K: Pod + PartialEq,
    V: Pod,
{
    /// Create an empty bucket.
    ///
    /// # Panics
    /// Panics if `max_size` entries cannot fit in a page.
    pub fn new(max_size: u32) -> Self {
        assert!(
            max_size as usize <= bucket_page_capacity::<K, V>(),
            "bucket max_size {max_size} exceeds page capacity {}",
            bucket_page_capacity::<K, V>()
        );
        Self {
            max_size,
            entries: Vec::with_capacity(max_size as usize),
        }
    }

    /// Decode a bucket from page bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let size = read_u32(data, OFFSET_SIZE) as usize;
        let max_size = read_u32(data, OFFSET_MAX_SIZE);

        let key_len = size_of::<K>();
        let entry_len = key_len + size_of::<V>();

        let entries = (0..size)
            .map(|i| {
                let offset = OFFSET_ENTRIES + i * entry_len;
                let key = bytemuck::pod_read_unaligned(&data[offset..offset + key_len]);
                let value =
                    bytemuck::pod_read_unaligned(&data[offset + key_len..offset + entry_len]);
                (key, value)
            })
            .collect();

        Self { max_size, entries }
    }

    /// Encode this bucket into page bytes.
    pub fn write_to(&self, data: &mut [u8]) {
        write_u32(data, OFFSET_SIZE, self.entries.len() as u32);
        write_u32(data, OFFSET_MAX_SIZE, self.max_size);

        let key_len = size_of::<K>();
        let entry_len = key_len + size_of::<V>();

        for (i, (key, value)) in self.entries.iter().enumerate() {
            let offset = OFFSET_ENTRIES + i * entry_len;
            data[offset..offset + key_len].copy_from_slice(bytemuck::bytes_of(key));
            data[offset + key_len..offset + entry_len].copy_from_slice(bytemuck::bytes_of(value));
        }
    }

    /// Append `(key, value)`. Fails on a full bucket or a duplicate key.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.is_full() {
            return false;
        }
        if self.entries.iter().any(|(existing, _)| *existing == key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    /// Linear scan for `key`.
    pub fn lookup(&self, key: &K) -> Option<V> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| *value)
    }

    /// Remove `key` by swapping its entry with the last one.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.entries.iter().position(|(existing, _)| existing == key) {
            Some(idx) => {
                self.entries.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Remove the entry at `bucket_idx` by swapping it with the last one.
    pub fn remove_at(&mut self, bucket_idx: usize) {
        self.entries.swap_remove(bucket_idx);
    }

    /// Key at `bucket_idx`.
    pub fn key_at(&self, bucket_idx: usize) -> K {
        self.entries[bucket_idx].0
    }

    /// Value at `bucket_idx`.
    pub fn value_at(&self, bucket_idx: usize) -> V {
        self.entries[bucket_idx].1
    }

    /// Entry at `bucket_idx`.
    pub fn entry_at(&self, bucket_idx: usize) -> &(K, V) {
        &self.entries[bucket_idx]
    }

    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Capacity of this bucket.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.max_size as usize
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[inline]
fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

#[inline]
fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
