//! blockbtree - A disk-resident B-tree index over fixed-size blocks.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           blockbtree                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Index Engine (index/btree/)                 │   │
//! │  │   lookup / update / insert + split / display / sanity    │   │
//! │  │          freelist allocator (superblock-rooted)          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Node Codec (storage/node/)                  │   │
//! │  │        NodeHeader + NodeLayout + Node (CRC32)            │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Block Store (storage/)                      │   │
//! │  │     BlockStore trait: FileBlockStore | MemoryBlockStore  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, Error, config)
//! - [`storage`] - Block stores and the node format
//! - [`index`] - The B-tree index engine
//!
//! # Quick Start
//! ```no_run
//! use blockbtree::{BTreeIndex, FileBlockStore, IndexConfig};
//!
//! // 256 blocks of 4 KiB, 16-byte keys and 32-byte values
//! let store = FileBlockStore::create("my_index.db", 4096, 256).unwrap();
//! let mut index = BTreeIndex::create(store, IndexConfig::new(16, 32)).unwrap();
//!
//! index.insert(b"hello", b"world").unwrap();
//! let value = index.lookup(b"hello").unwrap();
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::DEFAULT_BLOCK_SIZE;
pub use common::{BlockId, Error, IndexConfig, Result};

pub use index::{BTreeIndex, DisplayFormat, SanityReport, Violation, ViolationKind};
pub use storage::node::{Node, NodeHeader, NodeLayout, NodeType};
pub use storage::{BlockStore, FileBlockStore, MemoryBlockStore, StoreStats, StoreStatsSnapshot};
