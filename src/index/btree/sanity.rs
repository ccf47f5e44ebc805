//! Structural consistency check.
//!
//! Unlike every other operation, the check does not stop at the first
//! problem: each reachable node is visited once and every violation found is
//! collected into a [`SanityReport`]. Only store I/O failures abort it.

use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};

use crate::common::{BlockId, Error, Result};
use crate::storage::node::{Node, NodeType};
use crate::storage::BlockStore;

use super::BTreeIndex;

/// What is wrong with a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// The block could not be decoded (checksum, geometry, bad block number).
    Unreadable(String),
    /// A node type that does not belong at this position in the tree.
    UnexpectedType(NodeType),
    /// Interior node without keys.
    EmptyInterior,
    /// `key[index]` is not greater than `key[index - 1]`.
    KeysOutOfOrder { index: usize },
    /// `key[index]` lies outside the range given by the ancestors' separators.
    KeyOutOfRange { index: usize },
    /// More keys than a node keeps on disk.
    Overfull { num_keys: usize, capacity: usize },
    /// Leaf at a different depth than the first leaf found.
    LeafDepthMismatch { expected: usize, found: usize },
    /// A second pointer to an already visited block.
    ReachableTwice,
    /// Freelist entry not tagged Unallocated.
    FreeBlockNotUnallocated(NodeType),
    /// Freelist entry that is also part of the tree.
    FreeBlockReachable,
    /// The freelist leads back to an earlier entry.
    FreelistCycle,
    /// Neither superblock, reachable, nor free.
    Leaked,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Unreadable(reason) => write!(f, "unreadable: {}", reason),
            ViolationKind::UnexpectedType(t) => write!(f, "unexpected {:?} node", t),
            ViolationKind::EmptyInterior => write!(f, "interior node has no keys"),
            ViolationKind::KeysOutOfOrder { index } => {
                write!(f, "key {} is not greater than key {}", index, index - 1)
            }
            ViolationKind::KeyOutOfRange { index } => {
                write!(f, "key {} is outside the parent's separator range", index)
            }
            ViolationKind::Overfull {
                num_keys,
                capacity,
            } => write!(f, "{} keys exceed capacity {}", num_keys, capacity),
            ViolationKind::LeafDepthMismatch { expected, found } => {
                write!(f, "leaf at depth {}, expected {}", found, expected)
            }
            ViolationKind::ReachableTwice => write!(f, "reachable twice"),
            ViolationKind::FreeBlockNotUnallocated(t) => {
                write!(f, "{:?} node on the freelist", t)
            }
            ViolationKind::FreeBlockReachable => write!(f, "on the freelist and in the tree"),
            ViolationKind::FreelistCycle => write!(f, "freelist cycle"),
            ViolationKind::Leaked => write!(f, "leaked"),
        }
    }
}

/// A problem found at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub block: BlockId,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {}", self.block, self.kind)
    }
}

/// Result of [`BTreeIndex::sanity_check`].
#[derive(Debug, Clone, Default)]
pub struct SanityReport {
    pub violations: Vec<Violation>,
    /// Tree nodes read during the walk.
    pub nodes_visited: usize,
    /// Keys found in leaves.
    pub keys: usize,
    /// Levels from the root to the first leaf; `None` if no leaf was reached.
    pub depth: Option<usize>,
    /// Blocks on the freelist up to the first bad entry.
    pub free_blocks: usize,
}

impl SanityReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn flag(&mut self, block: BlockId, kind: ViolationKind) {
        let violation = Violation { block, kind };
        warn!("sanity check: {}", violation);
        self.violations.push(violation);
    }
}

/// A node still to visit, with the key range its parent allows.
struct Frame {
    block: BlockId,
    depth: usize,
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
}

impl<S: BlockStore> BTreeIndex<S> {
    /// Walk the whole tree and the freelist and report every violation.
    ///
    /// # Errors
    /// Only `Error::Io` from the store; everything else becomes a
    /// [`Violation`].
    pub fn sanity_check(&self) -> Result<SanityReport> {
        let mut report = SanityReport::default();
        let mut reachable = HashSet::new();
        let mut leaf_depth = None;

        let mut stack = vec![Frame {
            block: self.root_block(),
            depth: 0,
            lower: None,
            upper: None,
        }];

        while let Some(frame) = stack.pop() {
            let block = frame.block;
            if !reachable.insert(block) {
                report.flag(block, ViolationKind::ReachableTwice);
                continue;
            }

            let node = match self.read_node(block) {
                Ok(node) => node,
                Err(Error::Io(e)) => return Err(Error::Io(e)),
                Err(e) => {
                    report.flag(block, ViolationKind::Unreadable(e.to_string()));
                    continue;
                }
            };
            report.nodes_visited += 1;

            let expected = if frame.depth == 0 {
                [NodeType::Root, NodeType::Leaf]
            } else {
                [NodeType::Interior, NodeType::Leaf]
            };
            if !expected.contains(&node.node_type()) {
                report.flag(block, ViolationKind::UnexpectedType(node.node_type()));
                // Root and Interior share a layout, so a mistagged one is still walked
                if !node.node_type().is_tree_node() {
                    continue;
                }
            }

            self.check_keys(block, &node, &frame, &mut report)?;

            if node.node_type() == NodeType::Leaf {
                report.keys += node.num_keys();
                match leaf_depth {
                    None => leaf_depth = Some(frame.depth),
                    Some(expected) if expected != frame.depth => report.flag(
                        block,
                        ViolationKind::LeafDepthMismatch {
                            expected,
                            found: frame.depth,
                        },
                    ),
                    Some(_) => {}
                }
                continue;
            }

            if node.num_keys() == 0 {
                report.flag(block, ViolationKind::EmptyInterior);
                continue;
            }

            let n = node.num_keys();
            for i in (0..=n).rev() {
                let child = match node.get_ptr(i) {
                    Ok(child) => child,
                    Err(e) => {
                        report.flag(block, ViolationKind::Unreadable(e.to_string()));
                        continue;
                    }
                };
                let lower = if i == 0 {
                    frame.lower.clone()
                } else {
                    Some(node.get_key(i - 1)?.to_vec())
                };
                let upper = if i == n {
                    frame.upper.clone()
                } else {
                    Some(node.get_key(i)?.to_vec())
                };
                stack.push(Frame {
                    block: child,
                    depth: frame.depth + 1,
                    lower,
                    upper,
                });
            }
        }

        report.depth = leaf_depth.map(|d| d + 1);
        self.check_freelist(&reachable, &mut report)?;

        debug!(
            "sanity check: {} nodes, {} keys, {} free blocks, {} violations",
            report.nodes_visited,
            report.keys,
            report.free_blocks,
            report.violations.len()
        );
        Ok(report)
    }

    /// Ordering, range and capacity of one node's keys.
    fn check_keys(
        &self,
        block: BlockId,
        node: &Node,
        frame: &Frame,
        report: &mut SanityReport,
    ) -> Result<()> {
        let n = node.num_keys();
        let capacity = node.max_slots().saturating_sub(1);
        if n > capacity {
            report.flag(block, ViolationKind::Overfull { num_keys: n, capacity });
        }

        for i in 0..n {
            let key = node.get_key(i)?;
            if i > 0 && node.get_key(i - 1)? >= key {
                report.flag(block, ViolationKind::KeysOutOfOrder { index: i });
            }

            let below = frame.lower.as_deref().is_some_and(|lower| key < lower);
            let above = frame.upper.as_deref().is_some_and(|upper| key >= upper);
            if below || above {
                report.flag(block, ViolationKind::KeyOutOfRange { index: i });
            }
        }
        Ok(())
    }

    /// Walk the freelist, then flag blocks that are neither in use nor free.
    fn check_freelist(&self, reachable: &HashSet<BlockId>, report: &mut SanityReport) -> Result<()> {
        let mut free = HashSet::new();
        let mut block = self.freelist_head();

        while !block.is_null() {
            if !free.insert(block) {
                report.flag(block, ViolationKind::FreelistCycle);
                break;
            }
            if reachable.contains(&block) {
                report.flag(block, ViolationKind::FreeBlockReachable);
            }

            let node = match self.read_node(block) {
                Ok(node) => node,
                Err(Error::Io(e)) => return Err(Error::Io(e)),
                Err(e) => {
                    report.flag(block, ViolationKind::Unreadable(e.to_string()));
                    break;
                }
            };
            if node.node_type() != NodeType::Unallocated {
                report.flag(block, ViolationKind::FreeBlockNotUnallocated(node.node_type()));
                break;
            }

            report.free_blocks += 1;
            block = node.freelist();
        }

        for i in 0..self.store().block_count() {
            let block = BlockId(i);
            if block != self.superblock_block()
                && !reachable.contains(&block)
                && !free.contains(&block)
            {
                report.flag(block, ViolationKind::Leaked);
            }
        }
        Ok(())
    }
}
