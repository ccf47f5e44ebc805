//! Index structures.
//!
//! - [`btree`] - Disk-resident B-tree over a [`BlockStore`](crate::storage::BlockStore)

pub mod btree;

pub use btree::{BTreeIndex, DisplayFormat, SanityReport, Violation, ViolationKind};
