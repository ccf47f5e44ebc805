//! Node - the structured contents of one block.
//!
//! A [`Node`] is a transient, value-semantic view of a block: it is read with
//! [`Node::unserialize`], mutated in memory, and written back with
//! [`Node::serialize`]. The store is the only persistent owner of the bytes.

use std::cmp::Ordering;
use std::fmt;

use crate::common::config::{BLOCK_NUMBER_SIZE, MIN_SLOTS};
use crate::common::{BlockId, Error, Result};
use crate::storage::BlockStore;

use super::node_header::{NodeHeader, NodeType};

const PTR: usize = BLOCK_NUMBER_SIZE;
const HDR: usize = NodeHeader::SIZE;

/// Geometry shared by every node of one index.
///
/// The slot counts computed here are the only source of truth for "is this
/// node full" decisions.
///
/// # Example
/// ```
/// use blockbtree::NodeLayout;
///
/// let layout = NodeLayout::new(8, 8, 128).unwrap();
/// assert_eq!(layout.num_slots_as_leaf(), 5);
/// assert_eq!(layout.leaf_capacity(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLayout {
    key_size: usize,
    value_size: usize,
    block_size: usize,
}

impl NodeLayout {
    /// Validate and build a layout.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if a width is zero, a size does not fit
    /// the on-disk header fields, or either node type offers fewer than
    /// [`MIN_SLOTS`] slots.
    pub fn new(key_size: usize, value_size: usize, block_size: usize) -> Result<Self> {
        if key_size == 0 || value_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "key size {} and value size {} must be non-zero",
                key_size, value_size
            )));
        }
        for size in [key_size, value_size, block_size] {
            if u32::try_from(size).is_err() {
                return Err(Error::InvalidConfig(format!("size {} does not fit in u32", size)));
            }
        }

        let layout = Self {
            key_size,
            value_size,
            block_size,
        };

        let leaf = layout.num_slots_as_leaf();
        let interior = layout.num_slots_as_interior();
        if leaf < MIN_SLOTS || interior < MIN_SLOTS {
            return Err(Error::InvalidConfig(format!(
                "block size {} fits {} leaf and {} interior slots for {}-byte keys and {}-byte values, need {}",
                block_size, leaf, interior, key_size, value_size, MIN_SLOTS
            )));
        }

        Ok(layout)
    }

    #[inline]
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    #[inline]
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Key/value pairs that fit in a leaf block.
    pub fn num_slots_as_leaf(&self) -> usize {
        self.block_size.saturating_sub(HDR) / (self.key_size + self.value_size)
    }

    /// Keys that fit in an interior block (plus one trailing pointer).
    pub fn num_slots_as_interior(&self) -> usize {
        self.block_size.saturating_sub(HDR + PTR) / (self.key_size + PTR)
    }

    /// Most keys a leaf holds on disk; one slot is kept as split headroom.
    pub fn leaf_capacity(&self) -> usize {
        self.num_slots_as_leaf() - 1
    }

    /// Most keys an interior node holds on disk.
    pub fn interior_capacity(&self) -> usize {
        self.num_slots_as_interior() - 1
    }

    /// Slot count for a node type; zero for header-only types.
    pub fn slots_for(&self, node_type: NodeType) -> usize {
        match node_type {
            NodeType::Leaf => self.num_slots_as_leaf(),
            NodeType::Root | NodeType::Interior => self.num_slots_as_interior(),
            _ => 0,
        }
    }
}

/// In-memory view of one block: header plus the raw slot bytes.
///
/// # Slot Layout
/// ```text
/// Leaf:      [header][k0 v0][k1 v1] ... [k(n-1) v(n-1)]
/// Interior:  [header][p0 k0][p1 k1] ... [p(n-1) k(n-1)][pn]
/// ```
///
/// Keys, values and pointers are bounds-checked against the key count:
/// `offset < num_keys` for keys and values, `offset <= num_keys` for pointers.
/// An out-of-range access is `Error::SlotOutOfRange` and never happens on a
/// well-formed tree.
#[derive(Clone)]
pub struct Node {
    header: NodeHeader,
    layout: NodeLayout,
    data: Box<[u8]>,
}

impl Node {
    /// Create an empty node of the given type.
    pub fn new(node_type: NodeType, layout: NodeLayout) -> Self {
        Self {
            header: NodeHeader::new(
                node_type,
                layout.key_size as u32,
                layout.value_size as u32,
                layout.block_size as u32,
            ),
            layout,
            data: vec![0u8; layout.block_size].into_boxed_slice(),
        }
    }

    /// Build a root holding a single separator and two children.
    pub fn new_root(
        layout: NodeLayout,
        separator: &[u8],
        left: BlockId,
        right: BlockId,
    ) -> Result<Self> {
        let mut root = Node::new(NodeType::Root, layout);
        root.set_num_keys(1)?;
        root.set_key(0, separator)?;
        root.set_ptr(0, left)?;
        root.set_ptr(1, right)?;
        Ok(root)
    }

    /// Read and decode block `block`.
    ///
    /// # Errors
    /// - I/O errors from the store
    /// - `Error::Corrupt` if the checksum, type tag, geometry or key count
    ///   does not fit `layout`
    pub fn unserialize<S: BlockStore + ?Sized>(
        store: &S,
        block: BlockId,
        layout: NodeLayout,
    ) -> Result<Self> {
        if store.block_size() != layout.block_size {
            return Err(Error::InvalidConfig(format!(
                "store block size {} differs from layout block size {}",
                store.block_size(),
                layout.block_size
            )));
        }

        let mut data = vec![0u8; layout.block_size].into_boxed_slice();
        store.read_block(block, &mut data)?;
        Self::decode(block, layout, data)
    }

    fn decode(block: BlockId, layout: NodeLayout, data: Box<[u8]>) -> Result<Self> {
        let header = NodeHeader::from_bytes(&data);

        if !header.verify_checksum(&data) {
            return Err(Error::corrupt(block, "checksum mismatch"));
        }
        if header.node_type == NodeType::Invalid {
            return Err(Error::corrupt(
                block,
                format!("unknown node type tag {}", data[NodeHeader::OFFSET_NODE_TYPE]),
            ));
        }
        if header.key_size as usize != layout.key_size
            || header.value_size as usize != layout.value_size
            || header.block_size as usize != layout.block_size
        {
            return Err(Error::corrupt(
                block,
                format!(
                    "written with key/value/block sizes {}/{}/{}, expected {}/{}/{}",
                    header.key_size,
                    header.value_size,
                    header.block_size,
                    layout.key_size,
                    layout.value_size,
                    layout.block_size
                ),
            ));
        }
        let slots = layout.slots_for(header.node_type);
        if header.num_keys as usize > slots {
            return Err(Error::corrupt(
                block,
                format!("{} keys in a {:?} node with {} slots", header.num_keys, header.node_type, slots),
            ));
        }

        Ok(Self {
            header,
            layout,
            data,
        })
    }

    /// Encode the header and checksum and write the node to block `block`.
    pub fn serialize<S: BlockStore + ?Sized>(&mut self, store: &S, block: BlockId) -> Result<()> {
        self.header.checksum = 0;
        self.header.write_to(&mut self.data);

        let checksum = NodeHeader::compute_checksum(&self.data);
        self.header.checksum = checksum;
        self.data[NodeHeader::OFFSET_CHECKSUM..NodeHeader::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&checksum.to_le_bytes());

        store.write_block(block, &self.data)
    }

    // ========================================================================
    // Header access
    // ========================================================================

    #[inline]
    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    #[inline]
    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.header.node_type
    }

    /// Retag the node. Slot bytes are left as they are.
    ///
    /// # Errors
    /// `Error::SlotOutOfRange` if the key count does not fit the new type's
    /// slots; the node is left unchanged.
    pub fn set_node_type(&mut self, node_type: NodeType) -> Result<()> {
        let limit = self.layout.slots_for(node_type);
        if self.num_keys() > limit {
            return Err(Error::SlotOutOfRange {
                offset: self.num_keys(),
                limit,
            });
        }
        self.header.node_type = node_type;
        Ok(())
    }

    #[inline]
    pub fn num_keys(&self) -> usize {
        self.header.num_keys as usize
    }

    /// Set the key count, up to the slot count of the node's type.
    pub fn set_num_keys(&mut self, num_keys: usize) -> Result<()> {
        let limit = self.max_slots();
        if num_keys > limit {
            return Err(Error::SlotOutOfRange {
                offset: num_keys,
                limit,
            });
        }
        self.header.num_keys = num_keys as u32;
        Ok(())
    }

    #[inline]
    pub fn rootnode(&self) -> BlockId {
        self.header.rootnode
    }

    #[inline]
    pub fn set_rootnode(&mut self, block: BlockId) {
        self.header.rootnode = block;
    }

    #[inline]
    pub fn freelist(&self) -> BlockId {
        self.header.freelist
    }

    #[inline]
    pub fn set_freelist(&mut self, block: BlockId) {
        self.header.freelist = block;
    }

    /// Slot count for this node's type.
    #[inline]
    pub fn max_slots(&self) -> usize {
        self.layout.slots_for(self.header.node_type)
    }

    /// Whether the key count is at the type's slot count (split required).
    pub fn is_overfull(&self) -> bool {
        self.num_keys() >= self.max_slots()
    }

    // ========================================================================
    // Slot access
    // ========================================================================

    fn key_offset(&self, offset: usize) -> Result<usize> {
        if offset >= self.num_keys() {
            return Err(Error::SlotOutOfRange {
                offset,
                limit: self.num_keys(),
            });
        }
        match self.header.node_type {
            NodeType::Leaf => Ok(self.leaf_entry_offset(offset)),
            NodeType::Root | NodeType::Interior => Ok(self.interior_ptr_offset(offset) + PTR),
            _ => Err(Error::SlotOutOfRange { offset, limit: 0 }),
        }
    }

    fn value_offset(&self, offset: usize) -> Result<usize> {
        if self.header.node_type != NodeType::Leaf {
            return Err(Error::SlotOutOfRange { offset, limit: 0 });
        }
        Ok(self.key_offset(offset)? + self.layout.key_size)
    }

    fn ptr_offset(&self, offset: usize) -> Result<usize> {
        if !self.header.node_type.is_interior() {
            return Err(Error::SlotOutOfRange { offset, limit: 0 });
        }
        if offset > self.num_keys() {
            return Err(Error::SlotOutOfRange {
                offset,
                limit: self.num_keys() + 1,
            });
        }
        Ok(self.interior_ptr_offset(offset))
    }

    #[inline]
    fn leaf_entry_offset(&self, i: usize) -> usize {
        HDR + i * (self.layout.key_size + self.layout.value_size)
    }

    #[inline]
    fn interior_ptr_offset(&self, i: usize) -> usize {
        HDR + i * (PTR + self.layout.key_size)
    }

    pub fn get_key(&self, offset: usize) -> Result<&[u8]> {
        let start = self.key_offset(offset)?;
        Ok(&self.data[start..start + self.layout.key_size])
    }

    /// Store `key` in slot `offset`, zero-padding it to the key width.
    pub fn set_key(&mut self, offset: usize, key: &[u8]) -> Result<()> {
        if key.len() > self.layout.key_size {
            return Err(Error::KeyTooLong {
                len: key.len(),
                max: self.layout.key_size,
            });
        }
        let start = self.key_offset(offset)?;
        let slot = &mut self.data[start..start + self.layout.key_size];
        slot[..key.len()].copy_from_slice(key);
        slot[key.len()..].fill(0);
        Ok(())
    }

    pub fn get_val(&self, offset: usize) -> Result<&[u8]> {
        let start = self.value_offset(offset)?;
        Ok(&self.data[start..start + self.layout.value_size])
    }

    /// Store `value` in slot `offset`, zero-padding it to the value width.
    pub fn set_val(&mut self, offset: usize, value: &[u8]) -> Result<()> {
        if value.len() > self.layout.value_size {
            return Err(Error::ValueTooLong {
                len: value.len(),
                max: self.layout.value_size,
            });
        }
        let start = self.value_offset(offset)?;
        let slot = &mut self.data[start..start + self.layout.value_size];
        slot[..value.len()].copy_from_slice(value);
        slot[value.len()..].fill(0);
        Ok(())
    }

    pub fn get_ptr(&self, offset: usize) -> Result<BlockId> {
        let start = self.ptr_offset(offset)?;
        let mut bytes = [0u8; PTR];
        bytes.copy_from_slice(&self.data[start..start + PTR]);
        Ok(BlockId(u64::from_le_bytes(bytes)))
    }

    pub fn set_ptr(&mut self, offset: usize, block: BlockId) -> Result<()> {
        let start = self.ptr_offset(offset)?;
        self.data[start..start + PTR].copy_from_slice(&block.0.to_le_bytes());
        Ok(())
    }

    /// All child pointers of an interior node, left to right.
    pub fn children(&self) -> Result<Vec<BlockId>> {
        (0..=self.num_keys()).map(|i| self.get_ptr(i)).collect()
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Linear scan for `key`.
    ///
    /// Returns `Ok(index)` on an exact match, or `Err(index)` with the sorted
    /// insert position.
    pub fn search(&self, key: &[u8]) -> Result<std::result::Result<usize, usize>> {
        for i in 0..self.num_keys() {
            match self.get_key(i)?.cmp(key) {
                Ordering::Equal => return Ok(Ok(i)),
                Ordering::Greater => return Ok(Err(i)),
                Ordering::Less => {}
            }
        }
        Ok(Err(self.num_keys()))
    }

    /// Pointer slot to descend into for `key`.
    ///
    /// The pointer before the first key strictly greater than `key`, or the
    /// trailing pointer when no key is greater. Keys equal to a separator go
    /// right.
    pub fn child_index(&self, key: &[u8]) -> Result<usize> {
        for i in 0..self.num_keys() {
            if key < self.get_key(i)? {
                return Ok(i);
            }
        }
        Ok(self.num_keys())
    }

    /// Pointer slot holding `child`, if any.
    pub fn position_of_child(&self, child: BlockId) -> Result<Option<usize>> {
        for i in 0..=self.num_keys() {
            if self.get_ptr(i)? == child {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Insertion and splitting
    // ========================================================================

    /// Insert a key/value pair into a leaf at `pos`, shifting later slots right.
    ///
    /// The node may reach its full slot count (the transient state before a
    /// split) but never beyond.
    pub fn insert_entry(&mut self, pos: usize, key: &[u8], value: &[u8]) -> Result<()> {
        let n = self.num_keys();
        if self.header.node_type != NodeType::Leaf || pos > n {
            return Err(Error::SlotOutOfRange { offset: pos, limit: n });
        }
        self.set_num_keys(n + 1)?;

        let start = self.leaf_entry_offset(pos);
        let end = self.leaf_entry_offset(n);
        let width = self.layout.key_size + self.layout.value_size;
        self.data.copy_within(start..end, start + width);

        self.set_key(pos, key)?;
        self.set_val(pos, value)
    }

    /// Insert separator `key` into an interior node at `pos`.
    ///
    /// Pointer `pos` (the child that split) becomes `left` and `right` is
    /// inserted after it.
    pub fn insert_separator(
        &mut self,
        pos: usize,
        key: &[u8],
        left: BlockId,
        right: BlockId,
    ) -> Result<()> {
        let n = self.num_keys();
        if !self.header.node_type.is_interior() || pos > n {
            return Err(Error::SlotOutOfRange { offset: pos, limit: n });
        }
        self.set_num_keys(n + 1)?;

        // Shift k(pos) .. p(n) one (key, ptr) pair to the right
        let start = self.interior_ptr_offset(pos) + PTR;
        let end = self.interior_ptr_offset(n) + PTR;
        let width = PTR + self.layout.key_size;
        self.data.copy_within(start..end, start + width);

        self.set_key(pos, key)?;
        self.set_ptr(pos, left)?;
        self.set_ptr(pos + 1, right)
    }

    /// Split this node into two fresh nodes and the separator to promote.
    ///
    /// - Leaf: the lower half of the entries goes left, the upper half
    ///   (including the median) goes right, and the median key is promoted.
    /// - Interior/Root: keys below the median go left with their pointers,
    ///   keys above go right, and the median moves up. Both halves are typed
    ///   `Interior`.
    pub fn split(&self) -> Result<(Node, Node, Vec<u8>)> {
        match self.header.node_type {
            NodeType::Leaf => self.split_leaf(),
            NodeType::Root | NodeType::Interior => self.split_interior(),
            _ => Err(Error::SlotOutOfRange { offset: 0, limit: 0 }),
        }
    }

    fn split_leaf(&self) -> Result<(Node, Node, Vec<u8>)> {
        let n = self.num_keys();
        if n < 2 {
            return Err(Error::SlotOutOfRange { offset: n, limit: 2 });
        }
        let mid = n / 2;

        let mut left = Node::new(NodeType::Leaf, self.layout);
        let lower = self.leaf_entry_offset(0)..self.leaf_entry_offset(mid);
        left.data[HDR..HDR + lower.len()].copy_from_slice(&self.data[lower]);
        left.set_num_keys(mid)?;

        let mut right = Node::new(NodeType::Leaf, self.layout);
        let upper = self.leaf_entry_offset(mid)..self.leaf_entry_offset(n);
        right.data[HDR..HDR + upper.len()].copy_from_slice(&self.data[upper]);
        right.set_num_keys(n - mid)?;

        let separator = self.get_key(mid)?.to_vec();
        Ok((left, right, separator))
    }

    fn split_interior(&self) -> Result<(Node, Node, Vec<u8>)> {
        let n = self.num_keys();
        if n < MIN_SLOTS {
            return Err(Error::SlotOutOfRange {
                offset: n,
                limit: MIN_SLOTS,
            });
        }
        let mid = n / 2;

        // p0 k0 ... k(mid-1) p(mid)
        let mut left = Node::new(NodeType::Interior, self.layout);
        let lower = self.interior_ptr_offset(0)..self.interior_ptr_offset(mid) + PTR;
        left.data[HDR..HDR + lower.len()].copy_from_slice(&self.data[lower]);
        left.set_num_keys(mid)?;

        // p(mid+1) k(mid+1) ... k(n-1) p(n)
        let mut right = Node::new(NodeType::Interior, self.layout);
        let upper = self.interior_ptr_offset(mid + 1)..self.interior_ptr_offset(n) + PTR;
        right.data[HDR..HDR + upper.len()].copy_from_slice(&self.data[upper]);
        right.set_num_keys(n - mid - 1)?;

        let separator = self.get_key(mid)?.to_vec();
        Ok((left, right, separator))
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_type", &self.header.node_type)
            .field("num_keys", &self.header.num_keys)
            .field("rootnode", &self.header.rootnode)
            .field("freelist", &self.header.freelist)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
