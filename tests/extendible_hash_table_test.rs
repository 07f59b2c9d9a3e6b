//! Integration tests for the disk-backed extendible hash table.
//!
//! Split behavior is driven with an identity hasher so the tests control
//! exactly which directory slots and buckets each key lands in; the
//! default hasher covers larger randomized round-trips.

use std::sync::Arc;

use stratumdb::buffer::BufferPoolManager;
use stratumdb::index::{DiskExtendibleHashTable, KeyHasher};
use stratumdb::storage::page::{HashTableDirectoryPage, HashTableHeaderPage};
use stratumdb::storage::DiskManager;
use stratumdb::{DefaultKeyHasher, PageId};
use tempfile::tempdir;

/// Hash = key. Lets a test pick hash bits directly.
struct IdentityHasher;

impl KeyHasher<u32> for IdentityHasher {
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (Arc::new(BufferPoolManager::new(pool_size, dm, 2)), dir)
}

/// Decode the (single) directory page of a table built with header depth 0.
fn decode_directory(bpm: &BufferPoolManager, header_page_id: PageId) -> HashTableDirectoryPage {
    let header_guard = bpm.fetch_page_read(header_page_id).unwrap();
    let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
    let directory_page_id = header.directory_page_id(0);
    assert!(directory_page_id.is_valid());
    drop(header_guard);

    let directory_guard = bpm.fetch_page_read(directory_page_id).unwrap();
    HashTableDirectoryPage::from_bytes(directory_guard.as_slice())
}

/// Three colliding keys through a capacity-2 bucket: the directory doubles
/// twice, every key remains reachable, and the depth invariants hold.
#[test]
fn test_split_grows_directory_to_depth_two() {
    let (bpm, _dir) = create_bpm(16);
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 0, 9, 2)
            .unwrap();

    assert!(ht.insert(0b000, 10).unwrap());
    assert!(ht.insert(0b010, 20).unwrap());
    // All three keys share their low bit, so one split cannot separate
    // them; the insert splits again until the bucket fits.
    assert!(ht.insert(0b100, 30).unwrap());

    assert_eq!(ht.get_value(&0b000).unwrap(), Some(10));
    assert_eq!(ht.get_value(&0b010).unwrap(), Some(20));
    assert_eq!(ht.get_value(&0b100).unwrap(), Some(30));

    ht.verify_integrity().unwrap();

    let directory = decode_directory(&bpm, ht.header_page_id());
    assert_eq!(directory.global_depth(), 2);
}

/// Splitting below global depth must repoint every aliasing directory
/// slot, not just the split image.
#[test]
fn test_split_below_global_depth_updates_all_slots() {
    let (bpm, _dir) = create_bpm(32);
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 0, 9, 2)
            .unwrap();

    // Drive the directory to depth 3 with keys that collide on low bits,
    // then split a shallow bucket and re-check every invariant.
    for key in [0b000, 0b010, 0b100, 0b110, 0b1000, 0b1010] {
        assert!(ht.insert(key, key + 1).unwrap(), "insert of {key:#b} failed");
        ht.verify_integrity().unwrap();
    }

    for key in [0b000u32, 0b010, 0b100, 0b110, 0b1000, 0b1010] {
        assert_eq!(ht.get_value(&key).unwrap(), Some(key + 1));
    }
}

/// Duplicate keys are rejected and leave the stored value untouched.
#[test]
fn test_duplicate_insert_rejected() {
    let (bpm, _dir) = create_bpm(16);
    let ht = DiskExtendibleHashTable::<u64, u64, _>::new(
        Arc::clone(&bpm),
        DefaultKeyHasher,
        2,
        9,
        16,
    )
    .unwrap();

    assert!(ht.insert(42, 1).unwrap());
    assert!(!ht.insert(42, 2).unwrap());
    assert_eq!(ht.get_value(&42).unwrap(), Some(1));
}

/// Removing every key empties the buckets but never coalesces them or
/// shrinks the directory.
#[test]
fn test_delete_without_shrink() {
    let (bpm, _dir) = create_bpm(16);
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 0, 9, 2)
            .unwrap();

    let keys = [0b000u32, 0b010, 0b100];
    for &key in &keys {
        assert!(ht.insert(key, key).unwrap());
    }
    let depth_before = decode_directory(&bpm, ht.header_page_id()).global_depth();

    for &key in &keys {
        assert!(ht.remove(&key).unwrap());
    }
    for &key in &keys {
        assert_eq!(ht.get_value(&key).unwrap(), None);
        assert!(!ht.remove(&key).unwrap());
    }

    // The header still points at a live directory of unchanged depth.
    assert!(ht.header_page_id().is_valid());
    let directory = decode_directory(&bpm, ht.header_page_id());
    assert_eq!(directory.global_depth(), depth_before);
    ht.verify_integrity().unwrap();
}

/// Insert fails once the routed bucket can no longer split.
#[test]
fn test_insert_fails_at_max_directory_size() {
    let (bpm, _dir) = create_bpm(16);
    // Directory capped at size 1 with single-entry buckets.
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 0, 0, 1)
            .unwrap();

    assert!(ht.insert(0, 100).unwrap());
    assert!(!ht.insert(1, 200).unwrap());

    assert_eq!(ht.get_value(&0).unwrap(), Some(100));
    assert_eq!(ht.get_value(&1).unwrap(), None);
}

/// Keys with distinct high bits land in distinct directories.
#[test]
fn test_header_routes_to_multiple_directories() {
    let (bpm, _dir) = create_bpm(32);
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 2, 9, 4)
            .unwrap();

    let keys = [0x0000_0001u32, 0x4000_0001, 0x8000_0001, 0xC000_0001];
    for (i, &key) in keys.iter().enumerate() {
        assert!(ht.insert(key, i as u32).unwrap());
    }

    let header_guard = bpm.fetch_page_read(ht.header_page_id()).unwrap();
    let header = HashTableHeaderPage::from_bytes(header_guard.as_slice());
    for i in 0..4 {
        assert!(header.directory_page_id(i).is_valid(), "slot {i} unset");
    }
    drop(header_guard);

    for (i, &key) in keys.iter().enumerate() {
        assert_eq!(ht.get_value(&key).unwrap(), Some(i as u32));
    }
    ht.verify_integrity().unwrap();
}

/// The occupancy dump walks every live directory and bucket, including
/// freshly split ones, without tripping a guard or decode error.
#[test]
fn test_print_table_walks_all_directories() {
    let (bpm, _dir) = create_bpm(32);
    let ht =
        DiskExtendibleHashTable::<u32, u32, _>::new(Arc::clone(&bpm), IdentityHasher, 1, 9, 2)
            .unwrap();

    // An empty table prints just its header.
    ht.print_table().unwrap();

    // Low-bit-colliding keys force splits in one directory; a high-bit
    // key populates a second one.
    for key in [0b000, 0b010, 0b100, 0x8000_0000] {
        assert!(ht.insert(key, key ^ 0x5555).unwrap());
    }

    ht.print_table().unwrap();
    ht.verify_integrity().unwrap();
}

/// Lookup on an empty table misses without allocating anything.
#[test]
fn test_lookup_on_empty_table() {
    let (bpm, _dir) = create_bpm(8);
    let ht = DiskExtendibleHashTable::<u64, u64, _>::new(
        Arc::clone(&bpm),
        DefaultKeyHasher,
        2,
        9,
        8,
    )
    .unwrap();

    assert_eq!(ht.get_value(&12345).unwrap(), None);
    assert!(!ht.remove(&12345).unwrap());
}

/// Larger randomized round-trip through the default hasher, with enough
/// keys to force many splits and buffer-pool eviction churn.
#[test]
fn test_bulk_round_trip_with_default_hasher() {
    let (bpm, _dir) = create_bpm(64);
    let ht = DiskExtendibleHashTable::<u64, u64, _>::new(
        Arc::clone(&bpm),
        DefaultKeyHasher,
        2,
        9,
        8,
    )
    .unwrap();

    let n: u64 = 500;
    for key in 0..n {
        assert!(ht.insert(key, key * 7).unwrap(), "insert of {key} failed");
    }
    ht.verify_integrity().unwrap();

    for key in 0..n {
        assert_eq!(ht.get_value(&key).unwrap(), Some(key * 7));
    }
    assert_eq!(ht.get_value(&n).unwrap(), None);

    // Remove the even keys; odd keys stay reachable.
    for key in (0..n).step_by(2) {
        assert!(ht.remove(&key).unwrap());
    }
    for key in 0..n {
        let expected = if key % 2 == 0 { None } else { Some(key * 7) };
        assert_eq!(ht.get_value(&key).unwrap(), expected);
    }
    ht.verify_integrity().unwrap();
}

/// The table's pages live through the buffer pool, so a flushed table can
/// be reopened over the same file and read back.
#[test]
fn test_table_survives_pool_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let header_page_id;
    {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(32, dm, 2));
        let ht = DiskExtendibleHashTable::<u64, u64, _>::new(
            Arc::clone(&bpm),
            DefaultKeyHasher,
            2,
            9,
            8,
        )
        .unwrap();

        for key in 0..100u64 {
            assert!(ht.insert(key, key + 1000).unwrap());
        }
        header_page_id = ht.header_page_id();
        bpm.flush_all_pages().unwrap();
    }

    {
        let dm = DiskManager::open(&path).unwrap();
        let bpm = Arc::new(BufferPoolManager::new(32, dm, 2));

        // Rebind a table to the existing header page.
        let ht = DiskExtendibleHashTable::<u64, u64, _>::open(
            Arc::clone(&bpm),
            DefaultKeyHasher,
            header_page_id,
            9,
            8,
        );

        for key in 0..100u64 {
            assert_eq!(ht.get_value(&key).unwrap(), Some(key + 1000));
        }
    }
}
