//! # `FourTree`
//!
//! A concurrent ordered index built from fixed-fanout nodes.
//!
//! Each node holds up to three sorted `(key, value)` slots and four child
//! links. Nodes never split or rebalance: once a node is full, a key that
//! falls between (or outside) its slots goes into the child hanging off the
//! matching link, creating that child on first use.
//!
//! - Keys are fixed-width byte strings (16 bytes by default), compared as
//!   big-endian 8-byte words. Shorter keys are zero-padded.
//! - Values are stored as `Arc<V>` and returned as `Arc<V>`.
//! - Supported operations are point lookup and insert-or-overwrite.
//!   There is no delete, range scan, or rebalancing.
//!
//! ## Concurrency
//!
//! Readers never lock. Every node carries a version word
//! ([`NodeVersion`]); a reader snapshots it, reads, and retries if it
//! changed. Writers lock exactly one node: the node whose slot they fill or
//! update, or the parent whose link they attach a new child to.
//!
//! Displaced values are retired through [`seize`] epoch guards, so a reader
//! holding a guard never observes a freed value.
//!
//! ```rust
//! use fourtree::FourTree;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let tree: Arc<FourTree<u64>> = Arc::new(FourTree::new());
//!
//! let handles: Vec<_> = (0u64..4)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             let guard = tree.guard();
//!             for i in 0..100 {
//!                 let k = t * 1000 + i;
//!                 tree.put_with_guard(&k.to_be_bytes(), k, &guard);
//!             }
//!         })
//!     })
//!     .collect();
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! assert_eq!(tree.len(), 400);
//! assert_eq!(tree.get(&3042u64.to_be_bytes()).as_deref(), Some(&3042));
//! ```
//!
//! ## Shape
//!
//! Without rebalancing the shape depends on insertion order. Random order
//! gives logarithmic depth; sorted input degrades to a chain. Use
//! [`FourTree::stats`] and [`FourTree::check_invariants`] to inspect it.
//!
//! ## Features
//!
//! - `tracing`: emit `tracing` events for retries (trace) and child
//!   attachment (debug). Off by default and free when off.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::inline_always)]

mod tracing_helpers;

pub mod config;
pub mod cursor;
pub mod key;
pub mod node;
pub mod nodeversion;
pub mod ordering;
pub mod tree;

pub use config::{ConfigError, KEY_WIDTH_ENV, TreeConfig};
pub use key::Key;
pub use nodeversion::{LockGuard, NodeVersion, VersionCapsule};
pub use tree::{FourTree, InvariantViolation, TreeStats};
