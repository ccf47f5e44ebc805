//! Storage layer - block stores and the node format.
//!
//! This module handles everything below the index algorithm:
//! - [`BlockStore`] - The contract the index consumes
//! - [`FileBlockStore`] / [`MemoryBlockStore`] - Concrete stores
//! - [`StoreStats`] - I/O and allocation counters
//! - [`node`] - Node layout and (de)serialization

mod block_store;
mod file_store;
mod memory_store;
pub mod node;
mod stats;

pub use block_store::BlockStore;
pub use file_store::FileBlockStore;
pub use memory_store::MemoryBlockStore;
pub use stats::{StoreStats, StoreStatsSnapshot};
