//! Node types and layout.
//!
//! This module contains:
//! - [`NodeHeader`] - Metadata at the start of every block
//! - [`NodeType`] - Discriminator for the different node formats
//! - [`NodeLayout`] - Slot geometry derived from key/value/block sizes
//! - [`Node`] - A decoded block with bounds-checked slot access

#[allow(clippy::module_inception)]
mod node;
mod node_header;

pub use node::{Node, NodeLayout};
pub use node_header::{NodeHeader, NodeType};
