//! Node header and type definitions.
//!
//! Every block starts with a [`NodeHeader`] containing:
//! - [`NodeType`] discriminator
//! - CRC32 checksum for integrity
//! - The key/value/block geometry the block was written with
//! - Key count and the two overloaded block-number fields

use crate::common::BlockId;

/// Type of node stored in a block.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Uninitialized or corrupted block.
    #[default]
    Invalid = 0,
    /// Tree metadata: root block, freelist head, widths.
    Superblock = 1,
    /// Interior node pointed to by the superblock.
    Root = 2,
    /// Interior (non-leaf) node.
    Interior = 3,
    /// Leaf node holding key/value pairs.
    Leaf = 4,
    /// Block on the freelist.
    Unallocated = 5,
}

impl NodeType {
    /// Convert from u8, returning Invalid for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeType::Superblock,
            2 => NodeType::Root,
            3 => NodeType::Interior,
            4 => NodeType::Leaf,
            5 => NodeType::Unallocated,
            _ => NodeType::Invalid,
        }
    }

    /// Root and Interior nodes share the same slot layout.
    #[inline]
    pub fn is_interior(&self) -> bool {
        matches!(self, NodeType::Root | NodeType::Interior)
    }

    /// Whether this node type is part of the tree reachable from the root.
    #[inline]
    pub fn is_tree_node(&self) -> bool {
        matches!(self, NodeType::Root | NodeType::Interior | NodeType::Leaf)
    }
}

/// Metadata stored at the beginning of every block.
///
/// # Layout (40 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     node_type (NodeType as u8)
/// 1       3     reserved (zero)
/// 4       4     checksum (CRC32, little-endian)
/// 8       4     key_size
/// 12      4     value_size
/// 16      4     block_size
/// 20      4     num_keys
/// 24      8     rootnode
/// 32      8     freelist
/// ```
///
/// `rootnode` is an informational back-reference to the tree root on tree
/// nodes. `freelist` is the next free block on Unallocated nodes and the
/// freelist head on the superblock.
///
/// # Checksum
/// The checksum is computed over the entire block with the checksum field
/// itself set to zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    /// Type of this node.
    pub node_type: NodeType,
    /// CRC32 checksum of the block.
    pub checksum: u32,
    /// Key width the block was written with.
    pub key_size: u32,
    /// Value width the block was written with.
    pub value_size: u32,
    /// Block size the block was written with.
    pub block_size: u32,
    /// Number of keys in use.
    pub num_keys: u32,
    /// Root block of the tree.
    pub rootnode: BlockId,
    /// Next free block, or freelist head on the superblock.
    pub freelist: BlockId,
}

impl NodeHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 40;

    /// Offset of each field within the header.
    pub const OFFSET_NODE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 4;
    pub const OFFSET_KEY_SIZE: usize = 8;
    pub const OFFSET_VALUE_SIZE: usize = 12;
    pub const OFFSET_BLOCK_SIZE: usize = 16;
    pub const OFFSET_NUM_KEYS: usize = 20;
    pub const OFFSET_ROOTNODE: usize = 24;
    pub const OFFSET_FREELIST: usize = 32;

    /// Create a header of the given type with zero keys and null links.
    pub fn new(node_type: NodeType, key_size: u32, value_size: u32, block_size: u32) -> Self {
        Self {
            node_type,
            checksum: 0,
            key_size,
            value_size,
            block_size,
            num_keys: 0,
            rootnode: BlockId::NULL,
            freelist: BlockId::NULL,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        Self {
            node_type: NodeType::from_u8(data[Self::OFFSET_NODE_TYPE]),
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
            key_size: read_u32(data, Self::OFFSET_KEY_SIZE),
            value_size: read_u32(data, Self::OFFSET_VALUE_SIZE),
            block_size: read_u32(data, Self::OFFSET_BLOCK_SIZE),
            num_keys: read_u32(data, Self::OFFSET_NUM_KEYS),
            rootnode: BlockId(read_u64(data, Self::OFFSET_ROOTNODE)),
            freelist: BlockId(read_u64(data, Self::OFFSET_FREELIST)),
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < NodeHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for NodeHeader");

        data[Self::OFFSET_NODE_TYPE] = self.node_type as u8;
        data[Self::OFFSET_NODE_TYPE + 1..Self::OFFSET_CHECKSUM].fill(0);
        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u32(data, Self::OFFSET_KEY_SIZE, self.key_size);
        write_u32(data, Self::OFFSET_VALUE_SIZE, self.value_size);
        write_u32(data, Self::OFFSET_BLOCK_SIZE, self.block_size);
        write_u32(data, Self::OFFSET_NUM_KEYS, self.num_keys);
        write_u64(data, Self::OFFSET_ROOTNODE, self.rootnode.0);
        write_u64(data, Self::OFFSET_FREELIST, self.freelist.0);
    }

    /// Compute the CRC32 checksum of a block.
    ///
    /// The checksum field (bytes 4-7) is hashed as zeros, so the checksum
    /// doesn't include itself.
    pub fn compute_checksum(block_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();

        hasher.update(&block_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&block_data[Self::OFFSET_CHECKSUM + 4..]);

        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, block_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(block_data)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
