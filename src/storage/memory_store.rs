//! In-memory block store.

use std::collections::BTreeSet;

use log::trace;
use parking_lot::{Mutex, RwLock};

use crate::common::{BlockId, Error, Result};
use crate::storage::{BlockStore, StoreStats};

/// Keeps all blocks in memory.
///
/// Besides being a fast store for tests and benchmarks, it records which
/// blocks the index has told it about through the allocation notifications,
/// and it can hand out a byte-for-byte snapshot of every block.
///
/// # Example
/// ```
/// use blockbtree::{BlockId, BlockStore, MemoryBlockStore};
///
/// let store = MemoryBlockStore::new(256, 4);
/// let mut buf = vec![0u8; 256];
/// buf[0] = 7;
/// store.write_block(BlockId::new(1), &buf).unwrap();
/// ```
pub struct MemoryBlockStore {
    blocks: RwLock<Vec<Box<[u8]>>>,
    block_size: usize,
    allocated: Mutex<BTreeSet<BlockId>>,
    stats: StoreStats,
}

impl MemoryBlockStore {
    /// Create a store of `block_count` zeroed blocks.
    ///
    /// # Panics
    /// Panics if `block_size` is 0.
    pub fn new(block_size: usize, block_count: u64) -> Self {
        assert!(block_size > 0, "block_size must be > 0");

        let blocks = (0..block_count)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect();

        Self {
            blocks: RwLock::new(blocks),
            block_size,
            allocated: Mutex::new(BTreeSet::new()),
            stats: StoreStats::new(),
        }
    }

    /// Store statistics.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Blocks currently marked allocated by notifications, ascending.
    pub fn allocated_blocks(&self) -> Vec<BlockId> {
        self.allocated.lock().iter().copied().collect()
    }

    /// Whether `block` is currently marked allocated.
    pub fn is_allocated(&self, block: BlockId) -> bool {
        self.allocated.lock().contains(&block)
    }

    /// Copy of every block's bytes.
    pub fn snapshot(&self) -> Vec<Vec<u8>> {
        self.blocks.read().iter().map(|b| b.to_vec()).collect()
    }

    /// Flip the bits of one byte of a block.
    ///
    /// # Errors
    /// Returns `Error::InvalidBlock` if the block is past the end of the store.
    pub fn corrupt_byte(&self, block: BlockId, offset: usize) -> Result<()> {
        let mut blocks = self.blocks.write();
        let data = blocks
            .get_mut(block.0 as usize)
            .ok_or(Error::InvalidBlock(block))?;
        let byte = data
            .get_mut(offset)
            .ok_or(Error::SlotOutOfRange {
                offset,
                limit: self.block_size,
            })?;
        *byte = !*byte;
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::InvalidConfig(format!(
                "buffer of {} bytes for block size {}",
                len, self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockStore for MemoryBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.blocks.read().len() as u64
    }

    fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;

        let blocks = self.blocks.read();
        let data = blocks
            .get(block.0 as usize)
            .ok_or(Error::InvalidBlock(block))?;
        buf.copy_from_slice(data);

        self.stats.record_read();
        Ok(())
    }

    fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;

        let mut blocks = self.blocks.write();
        let data = blocks
            .get_mut(block.0 as usize)
            .ok_or(Error::InvalidBlock(block))?;
        data.copy_from_slice(buf);

        self.stats.record_write();
        Ok(())
    }

    fn notify_allocate(&self, block: BlockId) {
        trace!("store: block {} allocated", block);
        self.allocated.lock().insert(block);
        self.stats.record_allocate();
    }

    fn notify_deallocate(&self, block: BlockId) {
        trace!("store: block {} deallocated", block);
        self.allocated.lock().remove(&block);
        self.stats.record_deallocate();
    }
}
