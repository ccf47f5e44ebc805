//! Textual dumps of the tree for debugging.

use std::io::Write;

use crate::common::{BlockId, Result};
use crate::storage::node::{Node, NodeType};
use crate::storage::BlockStore;

use super::BTreeIndex;

/// Output format for [`BTreeIndex::display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayFormat {
    /// One line per node, indented by depth.
    Depth,
    /// Graphviz digraph with one vertex per node and one edge per child.
    DepthDot,
    /// `(key,value)` per line, in key order.
    SortedKeyVal,
}

impl<S: BlockStore> BTreeIndex<S> {
    /// Render the tree into a string.
    pub fn display(&self, format: DisplayFormat) -> Result<String> {
        let mut out = Vec::new();
        self.display_to(&mut out, format)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Render the tree into `out`.
    ///
    /// # Errors
    /// Store and write failures, or `Error::Inconsistent` if the walk reaches
    /// a block that is not a tree node.
    pub fn display_to<W: Write>(&self, out: &mut W, format: DisplayFormat) -> Result<()> {
        if format == DisplayFormat::DepthDot {
            writeln!(out, "digraph tree {{")?;
        }

        self.walk(|block, depth, node| {
            match format {
                DisplayFormat::Depth => {
                    writeln!(out, "{:indent$}{}", "", describe(block, node)?, indent = depth * 2)?;
                }
                DisplayFormat::DepthDot => {
                    writeln!(out, "  {} [ label=\"{}\" ];", block, describe(block, node)?)?;
                    if node.node_type().is_interior() && node.num_keys() > 0 {
                        for child in node.children()? {
                            writeln!(out, "  {} -> {};", block, child)?;
                        }
                    }
                }
                DisplayFormat::SortedKeyVal => {
                    if node.node_type() == NodeType::Leaf {
                        for i in 0..node.num_keys() {
                            writeln!(
                                out,
                                "({},{})",
                                render_bytes(node.get_key(i)?),
                                render_bytes(node.get_val(i)?)
                            )?;
                        }
                    }
                }
            }
            Ok(())
        })?;

        if format == DisplayFormat::DepthDot {
            writeln!(out, "}}")?;
        }
        Ok(())
    }

    /// Every key/value pair in key order.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        self.walk(|_, _, node| {
            if node.node_type() == NodeType::Leaf {
                for i in 0..node.num_keys() {
                    entries.push((node.get_key(i)?.to_vec(), node.get_val(i)?.to_vec()));
                }
            }
            Ok(())
        })?;
        Ok(entries)
    }
}

/// `N: Leaf: k0 v0 k1 v1` or `N: Interior: *p0 k0 *p1`.
fn describe(block: BlockId, node: &Node) -> Result<String> {
    let mut line = format!("{}: {:?}:", block, node.node_type());

    if node.node_type() == NodeType::Leaf {
        for i in 0..node.num_keys() {
            line.push(' ');
            line.push_str(&render_bytes(node.get_key(i)?));
            line.push(' ');
            line.push_str(&render_bytes(node.get_val(i)?));
        }
    } else if node.num_keys() > 0 {
        for i in 0..node.num_keys() {
            line.push_str(&format!(" *{} {}", node.get_ptr(i)?, render_bytes(node.get_key(i)?)));
        }
        line.push_str(&format!(" *{}", node.get_ptr(node.num_keys())?));
    }

    Ok(line)
}

/// Text when the bytes (minus zero padding) are printable ASCII, hex otherwise.
fn render_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = &bytes[..end];

    let printable = !text.is_empty()
        && text
            .iter()
            .all(|&b| (b.is_ascii_graphic() || b == b' ') && b != b'"' && b != b'\\');

    if printable {
        text.iter().map(|&b| b as char).collect()
    } else {
        let mut hex = String::with_capacity(2 + bytes.len() * 2);
        hex.push_str("0x");
        for b in bytes {
            hex.push_str(&format!("{:02x}", b));
        }
        hex
    }
}
