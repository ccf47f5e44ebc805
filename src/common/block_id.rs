//! Block identifier type.

use std::fmt;

/// Identifies a block in a block store.
///
/// Block numbers are the only references between nodes: child pointers and
/// freelist links are stored on disk as `u64` block numbers.
///
/// Block 0 always holds the superblock, so it can never be a child or a free
/// block. That makes it usable as the null sentinel ([`BlockId::NULL`]) for
/// the end of the freelist.
///
/// # Example
/// ```
/// use blockbtree::BlockId;
///
/// let block = BlockId::new(42);
/// assert!(!block.is_null());
/// assert!(BlockId::NULL.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockId(pub u64);

impl BlockId {
    /// End-of-freelist / no-space sentinel.
    pub const NULL: BlockId = BlockId(0);

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// Check if this is the null sentinel.
    #[inline]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// The block that follows this one.
    #[inline]
    pub fn next(&self) -> BlockId {
        BlockId(self.0 + 1)
    }

    /// Byte offset of this block in a store with the given block size.
    #[inline]
    pub fn offset(&self, block_size: usize) -> u64 {
        self.0 * block_size as u64
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_new() {
        let block = BlockId::new(42);
        assert_eq!(block.0, 42);
        assert!(!block.is_null());
    }

    #[test]
    fn test_null_sentinel() {
        assert!(BlockId::NULL.is_null());
        assert_eq!(BlockId::default(), BlockId::NULL);
    }

    #[test]
    fn test_block_id_ordering() {
        assert!(BlockId::new(1) < BlockId::new(2));
        assert_eq!(BlockId::new(1).next(), BlockId::new(2));
    }

    #[test]
    fn test_block_offset() {
        assert_eq!(BlockId::new(3).offset(4096), 3 * 4096);
        assert_eq!(BlockId::NULL.offset(4096), 0);
    }

    #[test]
    fn test_block_id_display() {
        assert_eq!(format!("{}", BlockId::new(7)), "7");
    }
}
