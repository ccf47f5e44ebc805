//! The block store contract consumed by the index.

use std::sync::Arc;

use crate::common::{BlockId, Result};

/// Fixed-size block storage underneath an index.
///
/// The index never touches physical storage itself: it reads and writes whole
/// blocks by number and tells the store when a block changes hands through the
/// freelist. Caching, eviction and persistence policy all live behind this
/// trait.
///
/// # Interior Mutability
/// All methods take `&self`. Implementations serialize access internally
/// (see [`FileBlockStore`](super::FileBlockStore)), so read-only index
/// operations such as display and sanity checks can run through a shared
/// reference.
pub trait BlockStore {
    /// Size of every block in bytes.
    fn block_size(&self) -> usize;

    /// Total number of blocks in the store.
    fn block_count(&self) -> u64;

    /// Read block `block` into `buf` (`buf.len() == block_size()`).
    ///
    /// # Errors
    /// Returns `Error::InvalidBlock` if the block is past the end of the store.
    fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` (`buf.len() == block_size()`) to block `block`.
    ///
    /// # Errors
    /// Returns `Error::InvalidBlock` if the block is past the end of the store.
    fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()>;

    /// Bookkeeping: `block` was taken off the freelist.
    ///
    /// Never gates the allocation itself.
    fn notify_allocate(&self, _block: BlockId) {}

    /// Bookkeeping: `block` was put back on the freelist.
    fn notify_deallocate(&self, _block: BlockId) {}
}

impl<S: BlockStore + ?Sized> BlockStore for &S {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(block, buf)
    }

    fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()> {
        (**self).write_block(block, buf)
    }

    fn notify_allocate(&self, block: BlockId) {
        (**self).notify_allocate(block)
    }

    fn notify_deallocate(&self, block: BlockId) {
        (**self).notify_deallocate(block)
    }
}

impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(block, buf)
    }

    fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()> {
        (**self).write_block(block, buf)
    }

    fn notify_allocate(&self, block: BlockId) {
        (**self).notify_allocate(block)
    }

    fn notify_deallocate(&self, block: BlockId) {
        (**self).notify_deallocate(block)
    }
}
