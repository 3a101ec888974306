//! Tests for Index
//!
//! These tests verify:
//! - Lossy upserts and point lookups
//! - Persistence across reopen
//! - Growth of the mapped region
//! - Recovery from an unusable index file

use std::fs;
use std::path::PathBuf;

use ringkv::config::Config;
use ringkv::index::{Index, RECORD_SIZE};
use ringkv::{Key, Location, MAX_KEY_LEN};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const SMALL: u64 = 8 * 1024;

fn small_config() -> Config {
    Config::builder()
        .index_initial_size(SMALL)
        .index_grow_threshold(4 * 1024)
        .index_grow_chunk(SMALL)
        .build()
}

fn setup_temp_index() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("INDEX");
    (temp_dir, path)
}

fn key(name: &str) -> Key {
    Key::new(name.as_bytes()).unwrap()
}

fn loc(n: u64) -> Location {
    Location::new(n / 10, (n % 10) * 64, 64)
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_file_at_initial_size() {
    let (_temp, path) = setup_temp_index();

    let index = Index::open(&path, &small_config()).unwrap();

    assert!(index.is_empty());
    assert_eq!(index.path(), path.as_path());
    assert_eq!(index.mapped_size(), SMALL);
    assert_eq!(fs::metadata(&path).unwrap().len(), SMALL);
}

#[test]
fn test_open_reformats_foreign_file() {
    let (_temp, path) = setup_temp_index();
    fs::write(&path, vec![0xEEu8; 4096]).unwrap();

    let index = Index::open(&path, &small_config()).unwrap();

    assert!(index.is_empty());
    assert_eq!(index.mapped_size(), SMALL);
}

#[test]
fn test_open_reformats_truncated_file() {
    let (_temp, path) = setup_temp_index();
    fs::write(&path, b"RING").unwrap();

    let index = Index::open(&path, &small_config()).unwrap();

    assert!(index.is_empty());
}

// =============================================================================
// Put / Get Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();

    assert_eq!(index.lossy_put(key("a"), loc(1)).unwrap(), None);

    assert_eq!(index.get(b"a"), Some(loc(1)));
    assert_eq!(index.get(b"b"), None);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_overwrite_returns_previous_location() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();

    index.lossy_put(key("a"), loc(1)).unwrap();
    let previous = index.lossy_put(key("a"), loc(2)).unwrap();

    assert_eq!(previous, Some(loc(1)));
    assert_eq!(index.get(b"a"), Some(loc(2)));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_iteration_is_key_ordered() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();

    for name in ["pear", "apple", "app", "zoo"] {
        index.lossy_put(key(name), loc(1)).unwrap();
    }

    let keys: Vec<&[u8]> = index.iter().map(|(k, _)| k.as_bytes()).collect();
    assert_eq!(keys, vec![&b"app"[..], &b"apple"[..], &b"pear"[..], &b"zoo"[..]]);
}

#[test]
fn test_max_length_key() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();
    let long = vec![b'x'; MAX_KEY_LEN];

    index.lossy_put(Key::new(&long).unwrap(), loc(3)).unwrap();
    index.persist().unwrap();
    drop(index);

    let index = Index::open(&path, &small_config()).unwrap();
    assert_eq!(index.get(&long), Some(loc(3)));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_keeps_entries() {
    let (_temp, path) = setup_temp_index();
    {
        let mut index = Index::open(&path, &small_config()).unwrap();
        index.lossy_put(key("a"), loc(1)).unwrap();
        index.lossy_put(key("b"), loc(2)).unwrap();
        index.lossy_put(key("a"), loc(3)).unwrap();
        index.persist().unwrap();
    }

    let index = Index::open(&path, &small_config()).unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index.get(b"a"), Some(loc(3)));
    assert_eq!(index.get(b"b"), Some(loc(2)));
}

// =============================================================================
// Growth Tests
// =============================================================================

#[test]
fn test_inserts_grow_region() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();

    let count = 3 * SMALL / RECORD_SIZE;
    for n in 0..count {
        index.lossy_put(key(&format!("key-{:04}", n)), loc(n)).unwrap();
    }

    assert!(index.mapped_size() > SMALL);
    for n in 0..count {
        assert_eq!(index.get(format!("key-{:04}", n).as_bytes()), Some(loc(n)));
    }

    index.persist().unwrap();
    drop(index);

    let index = Index::open(&path, &small_config()).unwrap();
    assert_eq!(index.len() as u64, count);
    assert_eq!(index.get(b"key-0000"), Some(loc(0)));
}

#[test]
fn test_check_free_space_grows_below_threshold() {
    let (_temp, path) = setup_temp_index();
    let config = Config::builder()
        .index_initial_size(SMALL)
        .index_grow_threshold(2 * SMALL)
        .index_grow_chunk(SMALL)
        .build();
    let mut index = Index::open(&path, &config).unwrap();
    index.lossy_put(key("a"), loc(1)).unwrap();

    assert!(index.check_free_space().unwrap());
    assert_eq!(index.mapped_size(), 2 * SMALL);
    assert_eq!(index.get(b"a"), Some(loc(1)));
}

#[test]
fn test_check_free_space_noop_with_headroom() {
    let (_temp, path) = setup_temp_index();
    let mut index = Index::open(&path, &small_config()).unwrap();

    assert!(!index.check_free_space().unwrap());
    assert_eq!(index.mapped_size(), SMALL);
}
