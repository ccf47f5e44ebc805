//! Insertion with proactive node splitting.
//!
//! # Algorithm
//! ```text
//!   descend root → leaf, recording the path
//!   insert into the leaf in memory
//!   while the node now fills every slot:
//!       split into two new blocks, promote the median
//!       node is root?  write a new root in place (height + 1), stop
//!       otherwise insert the separator into the parent from the path
//!   write the node that absorbed the last change
//! ```
//!
//! A node holds at most `slots - 1` keys on disk, so the in-memory insert that
//! triggers a split always has a free slot to land in.
//!
//! # Commit Point
//! New halves are written to fresh blocks; the node they replace is not
//! touched. The only write that changes what the root can reach is the last
//! one (the ancestor with room, or the root). Before it, a failure returns
//! the fresh blocks to the freelist and leaves the tree as it was. After it,
//! the replaced blocks are freed; a block that fails to free is logged and
//! left leaked, and the insert still succeeds.

use log::{debug, warn};

use crate::common::{BlockId, Error, Result};
use crate::storage::node::{Node, NodeType};
use crate::storage::BlockStore;

use super::BTreeIndex;

impl<S: BlockStore> BTreeIndex<S> {
    /// Insert a new key/value pair.
    ///
    /// This is a unique index: an existing key is never overwritten (use
    /// [`update`](Self::update) for that).
    ///
    /// # Errors
    /// - `Error::AlreadyExists` if the key is present; nothing is written
    /// - `Error::NoSpace` if a split needs more blocks than the freelist has;
    ///   the tree is left unchanged
    /// - `Error::Inconsistent` / `Error::Corrupt` on a damaged tree
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = self.pad_key(key)?;
        let value = self.pad_value(value)?;

        let root_block = self.root_block();
        let root = self.read_node(root_block)?;
        if !root.node_type().is_tree_node() {
            return Err(Error::inconsistent(
                root_block,
                format!("root is a {:?} node", root.node_type()),
            ));
        }

        if root.num_keys() == 0 {
            // Empty tree: the root becomes a leaf with a single entry
            let mut leaf = Node::new(NodeType::Leaf, self.layout);
            leaf.insert_entry(0, &key, &value)?;
            return self.write_node(root_block, &mut leaf);
        }

        let mut path = Vec::new();
        let mut leaf = self.find_leaf(&key, &mut path)?;
        let pos = match leaf.search(&key)? {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(pos) => pos,
        };
        leaf.insert_entry(pos, &key, &value)?;

        let leaf_block = path
            .pop()
            .ok_or_else(|| Error::inconsistent(root_block, "empty traversal path"))?;

        if !leaf.is_overfull() {
            return self.write_node(leaf_block, &mut leaf);
        }

        self.split_and_propagate(leaf_block, leaf, path)
    }

    /// Split `node` (just filled to its slot count) and push separators up
    /// `path` until an ancestor has room or the root splits.
    fn split_and_propagate(
        &mut self,
        block: BlockId,
        node: Node,
        mut path: Vec<BlockId>,
    ) -> Result<()> {
        let mut fresh = Vec::new();

        match self.apply_splits(block, node, &mut path, &mut fresh) {
            Ok(replaced) => {
                // Committed: a block that cannot be freed only leaks
                for old in replaced {
                    if let Err(e) = self.deallocate_node(old) {
                        warn!("could not free replaced block {}: {}", old, e);
                    }
                }
                Ok(())
            }
            Err(err) => {
                debug!(
                    "insert aborted ({}), returning {} fresh blocks",
                    err,
                    fresh.len()
                );
                for block in fresh.into_iter().rev() {
                    if let Err(e) = self.push_free(block) {
                        warn!("could not return block {} to the freelist: {}", block, e);
                    }
                }
                Err(err)
            }
        }
    }

    /// Returns the blocks whose contents were moved to fresh blocks.
    fn apply_splits(
        &mut self,
        mut block: BlockId,
        mut node: Node,
        path: &mut Vec<BlockId>,
        fresh: &mut Vec<BlockId>,
    ) -> Result<Vec<BlockId>> {
        let root_block = self.root_block();
        let mut replaced = Vec::new();

        loop {
            let (mut left, mut right, separator) = node.split()?;

            let left_block = self.allocate_node()?;
            fresh.push(left_block);
            let right_block = self.allocate_node()?;
            fresh.push(right_block);

            self.write_node(left_block, &mut left)?;
            self.write_node(right_block, &mut right)?;
            debug!(
                "split {:?} block {} into {} ({} keys) and {} ({} keys)",
                node.node_type(),
                block,
                left_block,
                left.num_keys(),
                right_block,
                right.num_keys()
            );

            if block == root_block {
                let mut root = Node::new_root(self.layout, &separator, left_block, right_block)?;
                self.write_node(root_block, &mut root)?;
                debug!("root {} split, tree grew a level", root_block);
                return Ok(replaced);
            }
            replaced.push(block);

            let parent_block = path
                .pop()
                .ok_or_else(|| Error::inconsistent(block, "split node has no recorded parent"))?;
            let mut parent = self.read_node(parent_block)?;
            let pos = parent.position_of_child(block)?.ok_or_else(|| {
                Error::inconsistent(parent_block, format!("no pointer to child {}", block))
            })?;
            parent.insert_separator(pos, &separator, left_block, right_block)?;

            if !parent.is_overfull() {
                self.write_node(parent_block, &mut parent)?;
                return Ok(replaced);
            }

            block = parent_block;
            node = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use parking_lot::Mutex;

    use super::*;
    use crate::common::IndexConfig;
    use crate::index::btree::tests::{key, small_index, SMALL_BLOCK};
    use crate::storage::MemoryBlockStore;

    fn leaf_keys<S: BlockStore>(index: &BTreeIndex<S>, block: BlockId) -> Vec<u64> {
        let node = index.node(block).unwrap();
        assert_eq!(node.node_type(), NodeType::Leaf);
        (0..node.num_keys())
            .map(|i| u64::from_be_bytes(node.get_key(i).unwrap().try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_first_insert_fills_root_leaf() {
        let mut index = small_index(8);
        index.insert(&key(42), &key(1)).unwrap();

        assert_eq!(leaf_keys(&index, index.root_block()), vec![42]);
        assert_eq!(index.lookup(&key(42)).unwrap(), key(1).to_vec());
    }

    #[test]
    fn test_duplicate_insert_leaves_store_untouched() {
        let mut index = small_index(16);
        for k in 0..7 {
            index.insert(&key(k), &key(k)).unwrap();
        }
        let before = index.store().snapshot();

        assert!(matches!(
            index.insert(&key(3), &key(99)),
            Err(Error::AlreadyExists)
        ));
        assert_eq!(index.store().snapshot(), before);
        assert_eq!(index.lookup(&key(3)).unwrap(), key(3).to_vec());
    }

    #[test]
    fn test_four_key_leaf_scenario() {
        let mut index = small_index(16);
        for k in [1, 2, 3] {
            index.insert(&key(k), &key(k * 100)).unwrap();
        }
        let root = index.node(index.root_block()).unwrap();
        assert_eq!(root.node_type(), NodeType::Leaf);
        assert_eq!(leaf_keys(&index, index.root_block()), vec![1, 2, 3]);

        index.insert(&key(4), &key(400)).unwrap();
        assert_eq!(leaf_keys(&index, index.root_block()), vec![1, 2, 3, 4]);

        index.insert(&key(0), &key(0)).unwrap();
        let root = index.node(index.root_block()).unwrap();
        assert_eq!(root.node_type(), NodeType::Root);
        assert_eq!(root.num_keys(), 1);
        assert_eq!(root.get_key(0).unwrap(), &key(2));

        let children = root.children().unwrap();
        assert_eq!(leaf_keys(&index, children[0]), vec![0, 1]);
        assert_eq!(leaf_keys(&index, children[1]), vec![2, 3, 4]);

        for k in 0..=4 {
            assert_eq!(index.lookup(&key(k)).unwrap(), key(k * 100).to_vec());
        }
    }

    #[test]
    fn test_split_of_full_slot_count() {
        let mut index = small_index(16);
        let slots = index.layout().num_slots_as_leaf() as u64;
        for k in 0..slots {
            index.insert(&key(k * 3), &key(k)).unwrap();
        }

        assert_eq!(index.depth().unwrap(), 2);
        let root = index.node(index.root_block()).unwrap();
        let children = root.children().unwrap();
        assert_eq!(children.len(), 2);

        let left = leaf_keys(&index, children[0]);
        let right = leaf_keys(&index, children[1]);
        assert_eq!(left.len() + right.len(), slots as usize);
        assert!(left.windows(2).all(|w| w[0] < w[1]));
        assert!(right.windows(2).all(|w| w[0] < w[1]));
        assert!(left.last() < right.first());
    }

    #[test]
    fn test_leaf_split_frees_replaced_block() {
        let mut index = small_index(16);
        for k in 0..5 {
            index.insert(&key(k), &key(k)).unwrap();
        }
        // root split: nothing replaced, blocks 2 and 3 in use
        assert_eq!(index.free_blocks().unwrap().len(), 12);

        for k in 5..7 {
            index.insert(&key(k), &key(k)).unwrap();
        }
        // right leaf 3 split into 4 and 5; 3 went back to the freelist
        assert_eq!(index.freelist_head(), BlockId(3));
        assert_eq!(index.node(BlockId(3)).unwrap().node_type(), NodeType::Unallocated);
        assert_eq!(index.free_blocks().unwrap().len(), 11);
        assert!(index.sanity_check().unwrap().is_ok());
    }

    /// Memory store whose writes to one chosen block fail.
    struct FailingWrites {
        inner: MemoryBlockStore,
        fail: Mutex<Option<BlockId>>,
    }

    impl BlockStore for FailingWrites {
        fn block_size(&self) -> usize {
            self.inner.block_size()
        }

        fn block_count(&self) -> u64 {
            self.inner.block_count()
        }

        fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()> {
            self.inner.read_block(block, buf)
        }

        fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()> {
            if *self.fail.lock() == Some(block) {
                return Err(Error::Io(io::Error::new(io::ErrorKind::Other, "write refused")));
            }
            self.inner.write_block(block, buf)
        }
    }

    #[test]
    fn test_failed_free_after_commit_keeps_insert() {
        let store = FailingWrites {
            inner: MemoryBlockStore::new(SMALL_BLOCK, 16),
            fail: Mutex::new(None),
        };
        let mut index = BTreeIndex::create(store, IndexConfig::new(8, 8)).unwrap();
        for k in 0..6 {
            index.insert(&key(k), &key(k)).unwrap();
        }

        // the next insert splits leaf 3 and then frees it
        *index.store().fail.lock() = Some(BlockId(3));
        index.insert(&key(6), &key(6)).unwrap();
        *index.store().fail.lock() = None;

        for k in 0..7 {
            assert_eq!(index.lookup(&key(k)).unwrap(), key(k).to_vec());
        }
        let report = index.sanity_check().unwrap();
        assert_eq!(report.keys, 7);
        assert_eq!(
            report.violations,
            vec![crate::index::Violation {
                block: BlockId(3),
                kind: crate::index::ViolationKind::Leaked,
            }]
        );
    }

    #[test]
    fn test_height_grows_only_on_root_split() {
        let mut index = small_index(512);
        let mut depth = index.depth().unwrap();
        let mut growths = 0;

        for k in 0..300 {
            let root_before = index.node(index.root_block()).unwrap();
            index.insert(&key(k), &key(k)).unwrap();
            let new_depth = index.depth().unwrap();

            assert!(new_depth == depth || new_depth == depth + 1);
            if new_depth == depth + 1 {
                growths += 1;
                // the old root was at its split threshold
                let capacity = index.layout().slots_for(root_before.node_type()) - 1;
                assert_eq!(root_before.num_keys(), capacity);
            }
            depth = new_depth;
        }

        assert!(growths >= 3);
        assert_eq!(depth, growths + 1);
        assert!(index.sanity_check().unwrap().is_ok());
    }

    #[test]
    fn test_interior_split_propagates() {
        let mut index = small_index(256);
        // reverse order exercises splits at the left edge
        for k in (0..120).rev() {
            index.insert(&key(k), &key(k + 1)).unwrap();
        }

        assert!(index.depth().unwrap() >= 3);
        for k in 0..120 {
            assert_eq!(index.lookup(&key(k)).unwrap(), key(k + 1).to_vec());
        }
        let report = index.sanity_check().unwrap();
        assert!(report.is_ok(), "{:?}", report.violations);
        assert_eq!(report.keys, 120);
    }

    #[test]
    fn test_no_space_rolls_back() {
        // superblock, root, and two free blocks: exactly one root split fits
        let store = MemoryBlockStore::new(SMALL_BLOCK, 4);
        let mut index = BTreeIndex::create(store, IndexConfig::new(8, 8)).unwrap();

        for k in 0..5 {
            index.insert(&key(k), &key(k)).unwrap();
        }
        assert!(index.freelist_head().is_null());
        index.insert(&key(5), &key(5)).unwrap();
        // right leaf now holds 4 keys; the next insert into it must split
        let before = index.store().snapshot();

        assert!(matches!(
            index.insert(&key(6), &key(6)),
            Err(Error::NoSpace)
        ));
        assert_eq!(index.store().snapshot(), before);
        assert!(matches!(index.lookup(&key(6)), Err(Error::NotFound)));
        assert!(index.sanity_check().unwrap().is_ok());
    }

    #[test]
    fn test_no_space_midway_returns_fresh_block() {
        // one free block after the first root split
        let store = MemoryBlockStore::new(SMALL_BLOCK, 5);
        let mut index = BTreeIndex::create(store, IndexConfig::new(8, 8)).unwrap();

        for k in 0..6 {
            index.insert(&key(k), &key(k)).unwrap();
        }
        assert_eq!(index.free_blocks().unwrap(), vec![BlockId(4)]);

        assert!(matches!(
            index.insert(&key(6), &key(6)),
            Err(Error::NoSpace)
        ));
        assert_eq!(index.free_blocks().unwrap(), vec![BlockId(4)]);
        assert!(index.sanity_check().unwrap().is_ok());
        for k in 0..6 {
            assert!(index.lookup(&key(k)).is_ok());
        }
    }
}
