//! Error types for the B-tree index.

use thiserror::Error;

use crate::common::BlockId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors returned by the index and its block stores.
///
/// Every operation forwards the first error it hits unchanged: there are no
/// retries and no automatic repair.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the block store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The freelist is exhausted.
    #[error("No free blocks left in the store")]
    NoSpace,

    /// The key is absent, or traversal reached an interior node with no keys.
    #[error("Key not found")]
    NotFound,

    /// Insert of a key that is already present.
    #[error("Key already exists")]
    AlreadyExists,

    /// Operation is not supported.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    /// A node's type or contents violate a structural invariant.
    ///
    /// Signals either a logic defect or on-disk corruption. Fatal to the
    /// current operation.
    #[error("Block {block} is inconsistent: {reason}")]
    Inconsistent { block: BlockId, reason: String },

    /// A block could not be decoded as a node of this index.
    #[error("Block {block} is corrupt: {reason}")]
    Corrupt { block: BlockId, reason: String },

    /// Slot access past the node's key count or capacity.
    #[error("Slot offset {offset} out of range (limit {limit})")]
    SlotOutOfRange { offset: usize, limit: usize },

    /// Block number beyond the end of the store.
    #[error("Invalid block number: {0}")]
    InvalidBlock(BlockId),

    /// Key wider than the configured key width.
    #[error("Key of {len} bytes exceeds key size {max}")]
    KeyTooLong { len: usize, max: usize },

    /// Value wider than the configured value width.
    #[error("Value of {len} bytes exceeds value size {max}")]
    ValueTooLong { len: usize, max: usize },

    /// Key/value widths or block geometry cannot form a valid tree.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn inconsistent(block: BlockId, reason: impl Into<String>) -> Self {
        Error::Inconsistent {
            block,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(block: BlockId, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            block,
            reason: reason.into(),
        }
    }
}
