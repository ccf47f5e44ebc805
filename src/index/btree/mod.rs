//! B-tree index over fixed-size blocks.
//!
//! # Block Layout
//! ```text
//! ┌────────────┬────────────┬───────────────────────────────────┐
//! │  Block 0   │  Block 1   │  Blocks 2..N                      │
//! │ Superblock │    Root    │  tree nodes + threaded freelist   │
//! └────────────┴────────────┴───────────────────────────────────┘
//! ```
//!
//! The root always lives in block 1: when it splits, its two halves move to
//! freshly allocated blocks and a new root is written in place. Block numbers
//! are the only references between nodes.
//!
//! # Operations
//! - [`BTreeIndex::lookup`] / [`BTreeIndex::update`] - Read traversal
//! - [`BTreeIndex::insert`] - Insert with split propagation (see `insert.rs`)
//! - [`BTreeIndex::allocate_node`] / [`BTreeIndex::deallocate_node`] - Freelist
//! - [`BTreeIndex::display`] / [`BTreeIndex::sanity_check`] - Diagnostics
//!
//! # Concurrency
//! None. An index instance assumes a single writer; mutating operations take
//! `&mut self` and nothing is locked across block writes.

mod allocator;
mod display;
mod insert;
mod sanity;

use std::borrow::Cow;
use std::collections::HashSet;

use log::info;

use crate::common::config::SUPERBLOCK_BLOCK;
use crate::common::{BlockId, Error, IndexConfig, Result};
use crate::storage::node::{Node, NodeLayout, NodeType};
use crate::storage::BlockStore;

pub use display::DisplayFormat;
pub use sanity::{SanityReport, Violation, ViolationKind};

/// A unique, ordered key→value index stored in a [`BlockStore`].
///
/// # Lifecycle
/// ```text
/// create/open ──▶ insert / lookup / update ... ──▶ detach ──▶ store
/// ```
///
/// Every [`Node`] the index works with is a transient copy: it is read,
/// modified, and written back before any other operation reads that block.
///
/// # Example
/// ```
/// use blockbtree::{BTreeIndex, IndexConfig, MemoryBlockStore};
///
/// let store = MemoryBlockStore::new(4096, 64);
/// let mut index = BTreeIndex::create(store, IndexConfig::new(8, 8)).unwrap();
///
/// index.insert(b"apple", b"red").unwrap();
/// assert_eq!(&index.lookup(b"apple").unwrap()[..3], b"red");
/// ```
pub struct BTreeIndex<S: BlockStore> {
    store: S,
    layout: NodeLayout,
    superblock_block: BlockId,
    superblock: Node,
}

impl<S: BlockStore> BTreeIndex<S> {
    // ========================================================================
    // Attach / detach
    // ========================================================================

    /// Attach to the index whose superblock lives in `block`.
    ///
    /// With `create`, formats the store first: superblock in `block`, an empty
    /// leaf root in `block + 1`, and every remaining block threaded onto the
    /// freelist in ascending order. In both cases the superblock is then read
    /// back into memory.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `block` is not 0, the geometry is unusable,
    ///   or the store is too small
    /// - `Error::Corrupt` if the block is not a superblock written with the
    ///   same key/value/block sizes
    /// - I/O errors from the store
    pub fn attach(store: S, config: IndexConfig, block: BlockId, create: bool) -> Result<Self> {
        if block != SUPERBLOCK_BLOCK {
            return Err(Error::InvalidConfig(format!(
                "superblock must live in block {}, got {}",
                SUPERBLOCK_BLOCK, block
            )));
        }

        let layout = NodeLayout::new(config.key_size, config.value_size, store.block_size())?;

        if create {
            Self::format(&store, layout, block)?;
        }

        let superblock = Node::unserialize(&store, block, layout)?;
        if superblock.node_type() != NodeType::Superblock {
            return Err(Error::corrupt(
                block,
                format!("expected a superblock, found {:?}", superblock.node_type()),
            ));
        }

        info!(
            "attached index: root {}, freelist head {}, {} blocks",
            superblock.rootnode(),
            superblock.freelist(),
            store.block_count()
        );

        Ok(Self {
            store,
            layout,
            superblock_block: block,
            superblock,
        })
    }

    /// Format `store` and attach to the new index.
    pub fn create(store: S, config: IndexConfig) -> Result<Self> {
        Self::attach(store, config, SUPERBLOCK_BLOCK, true)
    }

    /// Attach to an existing index.
    pub fn open(store: S, config: IndexConfig) -> Result<Self> {
        Self::attach(store, config, SUPERBLOCK_BLOCK, false)
    }

    fn format(store: &S, layout: NodeLayout, block: BlockId) -> Result<()> {
        let count = store.block_count();
        let root = block.next();
        if count <= root.0 {
            return Err(Error::InvalidConfig(format!(
                "store of {} blocks cannot hold a superblock and a root",
                count
            )));
        }
        let first_free = root.next();

        let mut superblock = Node::new(NodeType::Superblock, layout);
        superblock.set_rootnode(root);
        superblock.set_freelist(if first_free.0 < count {
            first_free
        } else {
            BlockId::NULL
        });
        store.notify_allocate(block);
        superblock.serialize(store, block)?;

        let mut root_node = Node::new(NodeType::Leaf, layout);
        root_node.set_rootnode(root);
        store.notify_allocate(root);
        root_node.serialize(store, root)?;

        for i in first_free.0..count {
            let mut free = Node::new(NodeType::Unallocated, layout);
            free.set_rootnode(root);
            free.set_freelist(if i + 1 == count {
                BlockId::NULL
            } else {
                BlockId(i + 1)
            });
            free.serialize(store, BlockId(i))?;
        }

        info!(
            "created index: {}-byte keys, {}-byte values, {} blocks of {} bytes",
            layout.key_size(),
            layout.value_size(),
            count,
            layout.block_size()
        );
        Ok(())
    }

    /// Persist the superblock and hand back the store.
    pub fn detach(mut self) -> Result<S> {
        self.write_superblock()?;
        info!("detached index (root {})", self.root_block());
        Ok(self.store)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The underlying block store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Node geometry of this index.
    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    /// Block holding the tree root.
    pub fn root_block(&self) -> BlockId {
        self.superblock.rootnode()
    }

    /// Head of the freelist (`BlockId::NULL` when exhausted).
    pub fn freelist_head(&self) -> BlockId {
        self.superblock.freelist()
    }

    /// Block holding the superblock.
    pub fn superblock_block(&self) -> BlockId {
        self.superblock_block
    }

    /// Read a node for inspection.
    pub fn node(&self, block: BlockId) -> Result<Node> {
        self.read_node(block)
    }

    /// Number of levels from the root down to the leaves.
    pub fn depth(&self) -> Result<usize> {
        let limit = self.store.block_count() as usize;
        let mut block = self.root_block();
        let mut depth = 1;

        loop {
            let node = self.read_node(block)?;
            match node.node_type() {
                NodeType::Leaf => return Ok(depth),
                NodeType::Root | NodeType::Interior => {
                    if node.num_keys() == 0 {
                        return Ok(depth);
                    }
                    block = node.get_ptr(0)?;
                    depth += 1;
                    if depth > limit {
                        return Err(Error::inconsistent(block, "tree deeper than the store"));
                    }
                }
                other => {
                    return Err(Error::inconsistent(
                        block,
                        format!("{:?} node reached during traversal", other),
                    ))
                }
            }
        }
    }

    // ========================================================================
    // Lookup / update / delete
    // ========================================================================

    /// Look up the value stored under `key`.
    ///
    /// The returned value is always `value_size` bytes long.
    ///
    /// # Errors
    /// - `Error::NotFound` if the key is absent
    /// - `Error::KeyTooLong` if the key is wider than the key size
    pub fn lookup(&self, key: &[u8]) -> Result<Vec<u8>> {
        let key = self.pad_key(key)?;
        let leaf = self.find_leaf(&key, &mut Vec::new())?;

        match leaf.search(&key)? {
            Ok(i) => Ok(leaf.get_val(i)?.to_vec()),
            Err(_) => Err(Error::NotFound),
        }
    }

    /// Overwrite the value of an existing key in place.
    ///
    /// Only the leaf holding the key is written; the tree structure never
    /// changes.
    ///
    /// # Errors
    /// - `Error::NotFound` if the key is absent
    pub fn update(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = self.pad_key(key)?;
        let value = self.pad_value(value)?;

        let mut path = Vec::new();
        let mut leaf = self.find_leaf(&key, &mut path)?;
        let slot = match leaf.search(&key)? {
            Ok(i) => i,
            Err(_) => return Err(Error::NotFound),
        };
        leaf.set_val(slot, &value)?;

        let block = *path
            .last()
            .ok_or_else(|| Error::inconsistent(self.root_block(), "empty traversal path"))?;
        self.write_node(block, &mut leaf)
    }

    /// Remove `key`.
    ///
    /// # Errors
    /// Always `Error::Unimplemented`; the tree is left untouched.
    pub fn delete(&mut self, _key: &[u8]) -> Result<()> {
        Err(Error::Unimplemented("delete"))
    }

    // ========================================================================
    // Internal: traversal and node I/O
    // ========================================================================

    /// Descend from the root to the leaf that would hold `key`.
    ///
    /// Every visited block is appended to `path`, root first, so callers can
    /// walk back up to the parent of any node on the way.
    pub(crate) fn find_leaf(&self, key: &[u8], path: &mut Vec<BlockId>) -> Result<Node> {
        let limit = self.store.block_count() as usize;
        let mut block = self.root_block();

        loop {
            if path.len() >= limit {
                return Err(Error::inconsistent(block, "traversal deeper than the store"));
            }

            let node = self.read_node(block)?;
            path.push(block);

            match node.node_type() {
                NodeType::Leaf => return Ok(node),
                NodeType::Root | NodeType::Interior => {
                    if node.num_keys() == 0 {
                        // Nowhere to descend
                        return Err(Error::NotFound);
                    }
                    block = node.get_ptr(node.child_index(key)?)?;
                }
                other => {
                    return Err(Error::inconsistent(
                        block,
                        format!("{:?} node reached during traversal", other),
                    ))
                }
            }
        }
    }

    /// Depth-first, left-to-right walk over every node reachable from the root.
    ///
    /// `visit` receives each block with its depth (root = 0).
    pub(crate) fn walk<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(BlockId, usize, &Node) -> Result<()>,
    {
        let mut stack = vec![(self.root_block(), 0usize)];
        let mut visited = HashSet::new();

        while let Some((block, depth)) = stack.pop() {
            if !visited.insert(block) {
                return Err(Error::inconsistent(block, "block reachable twice"));
            }

            let node = self.read_node(block)?;
            visit(block, depth, &node)?;

            match node.node_type() {
                NodeType::Leaf => {}
                NodeType::Root | NodeType::Interior => {
                    if node.num_keys() > 0 {
                        for child in node.children()?.into_iter().rev() {
                            stack.push((child, depth + 1));
                        }
                    }
                }
                other => {
                    return Err(Error::inconsistent(
                        block,
                        format!("{:?} node reached during traversal", other),
                    ))
                }
            }
        }

        Ok(())
    }

    pub(crate) fn read_node(&self, block: BlockId) -> Result<Node> {
        Node::unserialize(&self.store, block, self.layout)
    }

    /// Stamp the root back-reference and write `node` to `block`.
    pub(crate) fn write_node(&self, block: BlockId, node: &mut Node) -> Result<()> {
        node.set_rootnode(self.root_block());
        node.serialize(&self.store, block)
    }

    pub(crate) fn write_superblock(&mut self) -> Result<()> {
        self.superblock.serialize(&self.store, self.superblock_block)
    }

    fn pad_key<'a>(&self, key: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        pad(key, self.layout.key_size())
            .ok_or(Error::KeyTooLong {
                len: key.len(),
                max: self.layout.key_size(),
            })
    }

    fn pad_value<'a>(&self, value: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        pad(value, self.layout.value_size())
            .ok_or(Error::ValueTooLong {
                len: value.len(),
                max: self.layout.value_size(),
            })
    }
}

/// Zero-pad `bytes` to `width`; `None` if it is wider.
fn pad(bytes: &[u8], width: usize) -> Option<Cow<'_, [u8]>> {
    match bytes.len() {
        len if len == width => Some(Cow::Borrowed(bytes)),
        len if len < width => {
            let mut padded = vec![0u8; width];
            padded[..len].copy_from_slice(bytes);
            Some(Cow::Owned(padded))
        }
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
