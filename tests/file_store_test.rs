//! Index persistence through a file-backed store.

mod common;

use blockbtree::{BTreeIndex, BlockStore, Error, FileBlockStore, IndexConfig, NodeType};
use common::{init_logger, key};
use tempfile::tempdir;

const BLOCK_SIZE: usize = 256;

fn config() -> IndexConfig {
    IndexConfig::new(8, 16)
}

#[test]
fn test_index_survives_reopen() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");

    let (root, head) = {
        let store = FileBlockStore::create(&path, BLOCK_SIZE, 64).unwrap();
        let mut index = BTreeIndex::create(store, config()).unwrap();
        for k in 0..50 {
            index.insert(&key(k), &key(k * 7)).unwrap();
        }
        let state = (index.root_block(), index.freelist_head());
        index.detach().unwrap();
        state
    };

    let store = FileBlockStore::open(&path, BLOCK_SIZE).unwrap();
    assert_eq!(store.block_count(), 64);
    let mut index = BTreeIndex::open(store, config()).unwrap();

    assert_eq!(index.root_block(), root);
    assert_eq!(index.freelist_head(), head);
    for k in 0..50 {
        let value = index.lookup(&key(k)).unwrap();
        assert_eq!(&value[..8], &key(k * 7));
        assert_eq!(&value[8..], &[0u8; 8]);
    }
    assert!(index.sanity_check().unwrap().is_ok());

    // keeps growing after the reopen
    for k in 50..80 {
        index.insert(&key(k), &key(k)).unwrap();
    }
    assert_eq!(index.sanity_check().unwrap().keys, 80);
}

#[test]
fn test_open_with_wrong_widths() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");

    let store = FileBlockStore::create(&path, BLOCK_SIZE, 8).unwrap();
    BTreeIndex::create(store, config()).unwrap().detach().unwrap();

    let store = FileBlockStore::open(&path, BLOCK_SIZE).unwrap();
    assert!(matches!(
        BTreeIndex::open(store, IndexConfig::new(8, 8)),
        Err(Error::Corrupt { .. })
    ));
}

#[test]
fn test_file_stats_track_allocations() {
    init_logger();
    let dir = tempdir().unwrap();
    let store = FileBlockStore::create(dir.path().join("index.db"), BLOCK_SIZE, 32).unwrap();
    let mut index = BTreeIndex::create(store, config()).unwrap();

    for k in 0..20 {
        index.insert(&key(k), &key(k)).unwrap();
    }

    let free = index.free_blocks().unwrap().len() as u64;
    let stats = index.store().stats().snapshot();
    assert_eq!(stats.blocks_in_use() + free, 32);
    assert!(stats.blocks_written > 0);

    let root = index.node(index.root_block()).unwrap();
    assert_eq!(root.node_type(), NodeType::Root);
}

#[test]
fn test_create_refuses_existing_file() {
    init_logger();
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.db");

    FileBlockStore::create(&path, BLOCK_SIZE, 4).unwrap();
    assert!(matches!(
        FileBlockStore::create(&path, BLOCK_SIZE, 4),
        Err(Error::Io(_))
    ));
}
