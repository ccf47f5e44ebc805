//! Freelist allocator.
//!
//! Unused blocks form a singly-linked list threaded through the `freelist`
//! field of `Unallocated` nodes; the superblock holds the head and
//! `BlockId::NULL` ends the list.
//!
//! Each operation writes one block and then the superblock, with no atomic
//! grouping: a crash in between can leak a block or leave the head pointing
//! at a live node. Nothing at this layer repairs that.

use std::collections::HashSet;

use log::trace;

use crate::common::{BlockId, Error, Result};
use crate::storage::node::{Node, NodeType};
use crate::storage::BlockStore;

use super::BTreeIndex;

impl<S: BlockStore> BTreeIndex<S> {
    /// Pop the head of the freelist.
    ///
    /// The returned block is still tagged `Unallocated` on disk until the
    /// caller writes a node into it.
    ///
    /// # Errors
    /// - `Error::NoSpace` if the freelist is empty
    /// - `Error::Inconsistent` if the head block is not tagged `Unallocated`
    pub fn allocate_node(&mut self) -> Result<BlockId> {
        let block = self.freelist_head();
        if block.is_null() {
            return Err(Error::NoSpace);
        }

        let node = self.read_node(block)?;
        if node.node_type() != NodeType::Unallocated {
            return Err(Error::inconsistent(
                block,
                format!("freelist head is a {:?} node", node.node_type()),
            ));
        }

        self.superblock.set_freelist(node.freelist());
        self.write_superblock()?;
        self.store.notify_allocate(block);

        trace!("allocated block {}, freelist head now {}", block, node.freelist());
        Ok(block)
    }

    /// Return a live block to the front of the freelist.
    ///
    /// # Errors
    /// - `Error::Inconsistent` if the block is already `Unallocated` (double
    ///   free), or is the superblock or the root
    /// - `Error::InvalidBlock` if the block is past the end of the store
    pub fn deallocate_node(&mut self, block: BlockId) -> Result<()> {
        if block == self.superblock_block() || block == self.root_block() {
            return Err(Error::inconsistent(
                block,
                "superblock and root cannot be freed",
            ));
        }
        if block.0 >= self.store.block_count() {
            return Err(Error::InvalidBlock(block));
        }

        let node = self.read_node(block)?;
        if node.node_type() == NodeType::Unallocated {
            return Err(Error::inconsistent(block, "double free"));
        }

        self.push_free(block)
    }

    /// Tag `block` Unallocated and make it the freelist head.
    ///
    /// Does not look at the block's current contents, so it can also take
    /// back a block that was allocated but never written.
    pub(crate) fn push_free(&mut self, block: BlockId) -> Result<()> {
        let mut free = Node::new(NodeType::Unallocated, self.layout);
        free.set_freelist(self.freelist_head());
        self.write_node(block, &mut free)?;

        self.superblock.set_freelist(block);
        self.write_superblock()?;
        self.store.notify_deallocate(block);

        trace!("freed block {}", block);
        Ok(())
    }

    /// Walk the freelist from the head.
    ///
    /// # Errors
    /// `Error::Inconsistent` if the list loops or runs into a block that is
    /// not `Unallocated`.
    pub fn free_blocks(&self) -> Result<Vec<BlockId>> {
        let mut blocks = Vec::new();
        let mut seen = HashSet::new();
        let mut block = self.freelist_head();

        while !block.is_null() {
            if !seen.insert(block) {
                return Err(Error::inconsistent(block, "freelist cycle"));
            }
            let node = self.read_node(block)?;
            if node.node_type() != NodeType::Unallocated {
                return Err(Error::inconsistent(
                    block,
                    format!("{:?} node on the freelist", node.node_type()),
                ));
            }
            blocks.push(block);
            block = node.freelist();
        }

        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::index::btree::tests::small_index;

    fn write_leaf<S: BlockStore>(index: &BTreeIndex<S>, block: BlockId) {
        let mut leaf = Node::new(NodeType::Leaf, index.layout());
        index.write_node(block, &mut leaf).unwrap();
    }

    #[test]
    fn test_allocate_pops_in_order() {
        let mut index = small_index(5);
        assert_eq!(index.allocate_node().unwrap(), BlockId(2));
        assert_eq!(index.allocate_node().unwrap(), BlockId(3));
        assert_eq!(index.allocate_node().unwrap(), BlockId(4));
        assert!(matches!(index.allocate_node(), Err(Error::NoSpace)));
        assert!(index.freelist_head().is_null());
    }

    #[test]
    fn test_allocate_persists_superblock() {
        let mut index = small_index(5);
        index.allocate_node().unwrap();

        let superblock = index.node(BlockId(0)).unwrap();
        assert_eq!(superblock.freelist(), BlockId(3));
        assert!(index.store().is_allocated(BlockId(2)));
    }

    #[test]
    fn test_deallocate_pushes_front() {
        let mut index = small_index(6);
        let a = index.allocate_node().unwrap();
        let b = index.allocate_node().unwrap();
        write_leaf(&index, a);
        write_leaf(&index, b);

        index.deallocate_node(a).unwrap();
        assert_eq!(index.freelist_head(), a);
        assert_eq!(index.free_blocks().unwrap(), vec![a, BlockId(4), BlockId(5)]);
        assert!(!index.store().is_allocated(a));

        // LIFO reuse
        assert_eq!(index.allocate_node().unwrap(), a);
    }

    #[test]
    fn test_double_free_rejected() {
        let mut index = small_index(6);
        let a = index.allocate_node().unwrap();
        write_leaf(&index, a);
        index.deallocate_node(a).unwrap();

        assert!(matches!(
            index.deallocate_node(a),
            Err(Error::Inconsistent { .. })
        ));
        // never-allocated blocks are Unallocated too
        assert!(index.deallocate_node(BlockId(5)).is_err());
    }

    #[test]
    fn test_reserved_blocks_cannot_be_freed() {
        let mut index = small_index(6);
        assert!(matches!(
            index.deallocate_node(BlockId(0)),
            Err(Error::Inconsistent { .. })
        ));
        assert!(matches!(
            index.deallocate_node(BlockId(1)),
            Err(Error::Inconsistent { .. })
        ));
        assert!(matches!(
            index.deallocate_node(BlockId(6)),
            Err(Error::InvalidBlock(BlockId(6)))
        ));
    }

    #[test]
    fn test_allocate_rejects_live_head() {
        let mut index = small_index(6);
        // Overwrite the head with a live node behind the allocator's back
        write_leaf(&index, BlockId(2));

        assert!(matches!(
            index.allocate_node(),
            Err(Error::Inconsistent { .. })
        ));
        assert_eq!(index.freelist_head(), BlockId(2));
    }

    #[test]
    fn test_no_double_use_across_cycles() {
        let mut index = small_index(12);
        let mut live: HashSet<BlockId> = HashSet::new();

        for round in 0..50 {
            let block = index.allocate_node().unwrap();
            assert!(live.insert(block), "block {} handed out twice", block);
            write_leaf(&index, block);

            if round % 3 == 2 {
                let victim = *live.iter().min().unwrap();
                index.deallocate_node(victim).unwrap();
                live.remove(&victim);
            }
            if live.len() == 9 {
                let victim = *live.iter().max().unwrap();
                index.deallocate_node(victim).unwrap();
                live.remove(&victim);
            }

            let free: HashSet<BlockId> = index.free_blocks().unwrap().into_iter().collect();
            assert!(free.is_disjoint(&live));
            assert_eq!(free.len() + live.len(), 10);
        }
    }

    #[test]
    fn test_free_blocks_detects_cycle() {
        let mut index = small_index(5);
        let mut free = Node::new(NodeType::Unallocated, index.layout());
        free.set_freelist(BlockId(2));
        index.write_node(BlockId(4), &mut free).unwrap();

        assert!(matches!(
            index.free_blocks(),
            Err(Error::Inconsistent { .. })
        ));
    }
}
