//! Configuration constants for the index.

use crate::common::BlockId;

/// Default block size in bytes (4KB).
///
/// Matches the OS page size on most systems. Stores may use any block size
/// as long as every node type still fits [`MIN_SLOTS`] slots.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// On-disk width of a block number (child pointers, freelist links).
pub const BLOCK_NUMBER_SIZE: usize = 8;

/// Block that holds the superblock of a freshly created index.
pub const SUPERBLOCK_BLOCK: BlockId = BlockId(0);

/// Minimum number of slots a node type must offer.
///
/// A split of a node holding `n` keys leaves `n / 2` keys on the left and
/// at least one on the right, so anything below 3 cannot split an interior node.
pub const MIN_SLOTS: usize = 3;

/// Fixed key and value widths of an index.
///
/// The block size is not part of the config: it always comes from the store.
///
/// # Example
/// ```
/// use blockbtree::IndexConfig;
///
/// let config = IndexConfig::new(8, 16);
/// assert_eq!(config.key_size, 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Width of every key in bytes.
    pub key_size: usize,
    /// Width of every value in bytes.
    pub value_size: usize,
}

impl IndexConfig {
    /// Create a config with the given key and value widths.
    pub fn new(key_size: usize, value_size: usize) -> Self {
        Self {
            key_size,
            value_size,
        }
    }
}
