//! Structural statistics and invariant checking.
//!
//! Both walk the whole tree without locks. The results are exact only
//! while no writer is active; under concurrent puts they describe some
//! recent state of each node.

use std::fmt as StdFmt;

use crate::key::Key;
use crate::node::Node;
use crate::nodeversion::VersionCapsule;

use super::FourTree;

// ============================================================================
//  TreeStats
// ============================================================================

/// Shape summary of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    /// Reachable nodes, root included.
    pub nodes: usize,

    /// Occupied slots across all nodes.
    pub entries: usize,

    /// Depth of the deepest node (root = 1).
    pub max_depth: usize,
}

// ============================================================================
//  InvariantViolation
// ============================================================================

/// A broken structural invariant, located by node depth and slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// An occupied slot follows a vacant one.
    Gap {
        /// Depth of the offending node.
        depth: usize,
        /// The occupied slot past the gap.
        slot: usize,
    },

    /// Slot keys do not strictly increase.
    Unordered {
        /// Depth of the offending node.
        depth: usize,
        /// The slot whose key is not above its predecessor.
        slot: usize,
    },

    /// A key lies outside the range its parent link routes to this node.
    OutOfRange {
        /// Depth of the offending node.
        depth: usize,
        /// The slot holding the stray key.
        slot: usize,
    },

    /// A child hangs under a link that routing can never reach.
    MisplacedChild {
        /// Depth of the parent node.
        depth: usize,
        /// The child link index.
        link: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Gap { depth, slot } => {
                write!(f, "occupied slot {slot} follows a vacant slot (depth {depth})")
            }

            Self::Unordered { depth, slot } => {
                write!(f, "key in slot {slot} does not exceed its predecessor (depth {depth})")
            }

            Self::OutOfRange { depth, slot } => {
                write!(f, "key in slot {slot} is outside the node's range (depth {depth})")
            }

            Self::MisplacedChild { depth, link } => {
                write!(f, "child under unreachable link {link} (depth {depth})")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

// ============================================================================
//  Walks
// ============================================================================

/// A node to visit with the exclusive key bounds its parent link implies.
struct Visit<'t, V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> {
    node: &'t Node<V, WIDTH, WORDS, C>,
    lower: Option<Key<WORDS>>,
    upper: Option<Key<WORDS>>,
    depth: usize,
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> FourTree<V, WIDTH, WORDS, C> {
    /// Count nodes and entries and measure depth.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        let mut stack: Vec<(&Node<V, WIDTH, WORDS, C>, usize)> = vec![(self.root(), 1)];

        while let Some((node, depth)) = stack.pop() {
            stats.nodes += 1;
            stats.entries += node.occupied();
            stats.max_depth = stats.max_depth.max(depth);

            for link in 0..=WIDTH {
                let child: *mut Node<V, WIDTH, WORDS, C> = node.child(link);
                if !child.is_null() {
                    // SAFETY: non-null links target nodes that are freed only
                    // when the tree drops.
                    stack.push((unsafe { &*child }, depth + 1));
                }
            }
        }

        stats
    }

    /// Verify slot density, key order, routing ranges and child placement
    /// for every node.
    ///
    /// # Errors
    /// The first [`InvariantViolation`] found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut stack: Vec<Visit<'_, V, WIDTH, WORDS, C>> = vec![Visit {
            node: self.root(),
            lower: None,
            upper: None,
            depth: 1,
        }];

        while let Some(Visit {
            node,
            lower,
            upper,
            depth,
        }) = stack.pop()
        {
            let occupied: usize = node.occupied();

            if let Some(slot) = (occupied..WIDTH).find(|&slot| node.is_occupied(slot)) {
                return Err(InvariantViolation::Gap { depth, slot });
            }

            let keys: Vec<Key<WORDS>> = (0..occupied).filter_map(|slot| node.key_at(slot)).collect();

            for slot in 1..keys.len() {
                if keys[slot - 1] >= keys[slot] {
                    return Err(InvariantViolation::Unordered { depth, slot });
                }
            }

            for (slot, key) in keys.iter().enumerate() {
                let below_lower = lower.is_some_and(|l| *key <= l);
                let above_upper = upper.is_some_and(|u| *key >= u);
                if below_lower || above_upper {
                    return Err(InvariantViolation::OutOfRange { depth, slot });
                }
            }

            for link in 0..=WIDTH {
                let child: *mut Node<V, WIDTH, WORDS, C> = node.child(link);
                if child.is_null() {
                    continue;
                }

                let reachable: bool = if link == WIDTH {
                    occupied == WIDTH
                } else {
                    link < occupied
                };
                if !reachable {
                    return Err(InvariantViolation::MisplacedChild { depth, link });
                }

                stack.push(Visit {
                    // SAFETY: non-null links target nodes that are freed only
                    // when the tree drops.
                    node: unsafe { &*child },
                    lower: if link == 0 { lower } else { Some(keys[link - 1]) },
                    upper: if link == WIDTH { upper } else { Some(keys[link]) },
                    depth: depth + 1,
                });
            }
        }

        Ok(())
    }
}
