//! Filepath: src/tree.rs
//!
//! [`FourTree`] - a fixed-fanout concurrent ordered index.
//!
//! # Protocol
//!
//! ```text
//! get:  guard = tree.guard()
//!       cursor.find_unlocked()        // lock-free, version-validated
//!       clone Arc under the guard
//!
//! put:  cursor.find_locked()          // ends holding one node lock
//!       Update -> swap value, retire the old one through the guard
//!       Fill   -> mark_insert, occupy the vacant slot
//!       Attach -> allocate child with the entry, mark_insert, link it
//!       unlock (guard drop)
//! ```
//!
//! The tree never splits, merges, or rebalances. A full node grows the tree
//! one level deeper along a single child link, so inserting keys in sorted
//! order builds a chain whose depth is proportional to `n / WIDTH`.

use std::fmt as StdFmt;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use seize::{Collector, Guard, LocalGuard};

use crate::config::{ConfigError, TreeConfig};
use crate::cursor::{Cursor, WriteKind, WriteTarget};
use crate::key::{DEFAULT_KEY_WORDS, Key};
use crate::node::Node;
use crate::nodeversion::{NodeVersion, VersionCapsule};
use crate::tracing_helpers::debug_log;

mod check;
mod print;


pub use check::{InvariantViolation, TreeStats};

/// Default keyed slots per node (fanout 4).
pub const DEFAULT_WIDTH: usize = 3;

// ============================================================================
//  FourTree
// ============================================================================

/// A concurrent ordered index of fixed-fanout nodes.
///
/// # Type Parameters
///
/// - `V` - value type; values are stored and returned as `Arc<V>`
/// - `WIDTH` - keyed slots per node (fanout − 1), default 3
/// - `WORDS` - key width in 8-byte words, default 2 (16-byte keys)
/// - `C` - version capsule, default [`NodeVersion`]
///
/// # Example
///
/// ```rust
/// use fourtree::FourTree;
///
/// let tree: FourTree<String> = FourTree::new();
/// let guard = tree.guard();
///
/// tree.put_with_guard(b"key", "value".to_string(), &guard);
/// assert_eq!(tree.get_with_guard(b"key", &guard).as_deref(), Some(&"value".to_string()));
/// assert!(tree.get_with_guard(b"missing", &guard).is_none());
/// ```
pub struct FourTree<
    V,
    const WIDTH: usize = DEFAULT_WIDTH,
    const WORDS: usize = DEFAULT_KEY_WORDS,
    C: VersionCapsule = NodeVersion,
> {
    /// Epoch collector for displaced values.
    collector: Collector,

    /// The root, allocated at construction and never replaced. Every other
    /// node hangs below it and is freed by the walk in `Drop`.
    root: NonNull<Node<V, WIDTH, WORDS, C>>,

    /// Nodes allocated, root included.
    nodes: AtomicUsize,

    /// Configured key width in bytes.
    key_width: usize,

    /// Number of distinct keys.
    count: AtomicUsize,
}

// SAFETY: the root pointer targets a node the tree owns; nodes are freed
// only when the tree drops. Nodes publish `Arc<V>` across threads, so both `Send`
// and `Sync` need `V: Send + Sync`, as for `Arc<V>`.
unsafe impl<V: Send + Sync, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Send
    for FourTree<V, WIDTH, WORDS, C>
{
}

// SAFETY: see `Send` above; all shared mutation goes through atomics and
// the per-node version lock.
unsafe impl<V: Send + Sync, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Sync
    for FourTree<V, WIDTH, WORDS, C>
{
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> FourTree<V, WIDTH, WORDS, C> {
    /// Create an empty tree using the full key width.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Key::<WORDS>::CAPACITY)
    }

    /// Create an empty tree with explicit parameters.
    ///
    /// # Errors
    /// [`ConfigError`] if the key width is zero or does not fit in `WORDS`.
    pub fn with_config(config: TreeConfig) -> Result<Self, ConfigError> {
        let key_width: usize = config.resolve_key_width(Key::<WORDS>::CAPACITY)?;
        Ok(Self::build(key_width))
    }

    fn build(key_width: usize) -> Self {
        let root: NonNull<Node<V, WIDTH, WORDS, C>> = NonNull::from(Box::leak(Box::new(Node::new())));

        debug_log!(width = WIDTH, words = WORDS, key_width, "tree initialized");

        Self {
            collector: Collector::new(),
            root,
            nodes: AtomicUsize::new(1),
            key_width,
            count: AtomicUsize::new(0),
        }
    }

    /// Short name of this index type.
    #[must_use]
    pub const fn name() -> &'static str {
        "fourtree"
    }

    /// Enter a protected region and return a guard.
    ///
    /// Values loaded while the guard lives are not reclaimed, and values
    /// displaced by puts made with it are retired through it. Reuse one
    /// guard across many operations on the same thread to amortize the cost.
    #[must_use]
    #[inline]
    pub fn guard(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// The root node.
    #[inline]
    #[must_use]
    pub const fn root(&self) -> &Node<V, WIDTH, WORDS, C> {
        // SAFETY: allocated in `build`, freed only in `Drop`, never unlinked.
        unsafe { self.root.as_ref() }
    }

    /// Configured key width in bytes.
    #[inline]
    #[must_use]
    pub const fn key_width(&self) -> usize {
        self.key_width
    }

    /// Number of distinct keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(AtomicOrdering::Relaxed)
    }

    /// Check if the tree holds no keys.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of nodes allocated, including the root.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.load(AtomicOrdering::Relaxed)
    }

    /// Reject guards entered on another tree's collector.
    ///
    /// A foreign guard neither pins this tree's values nor retires into
    /// this tree's epoch domain.
    #[inline]
    fn check_guard(&self, guard: &LocalGuard<'_>) {
        assert!(
            std::ptr::eq(guard.collector(), &self.collector),
            "guard belongs to another collector"
        );
    }

    /// Encode a caller key.
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width.
    #[inline]
    fn encode(&self, key: &[u8]) -> Key<WORDS> {
        assert!(
            key.len() <= self.key_width,
            "key length {} exceeds configured width {}",
            key.len(),
            self.key_width
        );
        Key::new(key)
    }

    // ========================================================================
    //  Get
    // ========================================================================

    /// Look up `key`.
    ///
    /// Convenience wrapper that enters a fresh guard.
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Arc<V>> {
        let guard: LocalGuard<'_> = self.guard();
        self.get_with_guard(key, &guard)
    }

    /// Look up `key` using an explicit guard.
    ///
    /// Lock-free: contention shows up only as internal retries. `guard`
    /// must come from this tree's [`guard`](Self::guard).
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width, or if `guard`
    /// belongs to another tree.
    #[must_use]
    pub fn get_with_guard(&self, key: &[u8], guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        self.check_guard(guard);
        let key: Key<WORDS> = self.encode(key);
        Cursor::new(self.root(), key).find_unlocked(guard)
    }

    /// Depth of the node holding `key` (root = 1), or `None` if absent.
    #[must_use]
    pub fn depth_of(&self, key: &[u8]) -> Option<usize> {
        let guard: LocalGuard<'_> = self.guard();
        let mut cursor = Cursor::new(self.root(), self.encode(key));
        cursor.find_unlocked(&guard).map(|_| cursor.depth())
    }

    // ========================================================================
    //  Put
    // ========================================================================

    /// Insert or overwrite `key`.
    ///
    /// Convenience wrapper that enters a fresh guard.
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width.
    pub fn put(&self, key: &[u8], value: V) {
        let guard: LocalGuard<'_> = self.guard();
        self.put_with_guard(key, value, &guard);
    }

    /// Insert or overwrite `key` using an explicit guard.
    ///
    /// Always completes; contention is resolved by spinning. A displaced
    /// value is retired through `guard` and freed once no reader can hold it.
    /// `guard` must come from this tree's [`guard`](Self::guard).
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width, or if `guard`
    /// belongs to another tree.
    pub fn put_with_guard(&self, key: &[u8], value: V, guard: &LocalGuard<'_>) {
        self.put_arc_with_guard(key, Arc::new(value), guard);
    }

    /// Like [`put_with_guard`](Self::put_with_guard) for a value that is
    /// already shared.
    ///
    /// # Panics
    /// Panics if `key` is longer than the configured width, or if `guard`
    /// belongs to another tree.
    pub fn put_arc_with_guard(&self, key: &[u8], value: Arc<V>, guard: &LocalGuard<'_>) {
        self.check_guard(guard);
        let key: Key<WORDS> = self.encode(key);
        let mut cursor = Cursor::new(self.root(), key);

        let WriteTarget {
            node,
            slot,
            kind,
            mut lock,
        } = cursor.find_locked();

        match kind {
            WriteKind::Update => {
                // Layout unchanged: the pointer swap is the publication.
                node.assign(&key, value, slot, &lock, guard);
            }

            WriteKind::Fill => {
                lock.mark_insert();
                node.assign(&key, value, slot, &lock, guard);
                self.count.fetch_add(1, AtomicOrdering::Relaxed);
            }

            WriteKind::Attach => {
                let child: *mut Node<V, WIDTH, WORDS, C> =
                    Box::into_raw(Node::with_entry(&key, value));

                lock.mark_insert();
                node.link_child(slot, child, &lock);
                self.nodes.fetch_add(1, AtomicOrdering::Relaxed);
                self.count.fetch_add(1, AtomicOrdering::Relaxed);

                debug_log!(
                    key = %key,
                    link = slot,
                    depth = cursor.depth() + 1,
                    "attached child node"
                );
            }
        }

        drop(lock);
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Default
    for FourTree<V, WIDTH, WORDS, C>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Drop
    for FourTree<V, WIDTH, WORDS, C>
{
    fn drop(&mut self) {
        // Nodes first (each frees its live values); retired values go with
        // the collector field afterwards.
        let mut stack: Vec<*mut Node<V, WIDTH, WORDS, C>> = vec![self.root.as_ptr()];

        while let Some(ptr) = stack.pop() {
            // SAFETY: every node came from `Box` and is reachable through
            // exactly one link (or is the root). `&mut self` means no reader
            // or writer remains.
            let node: Box<Node<V, WIDTH, WORDS, C>> = unsafe { Box::from_raw(ptr) };
            stack.extend((0..=WIDTH).map(|link| node.child(link)).filter(|child| !child.is_null()));
        }
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> StdFmt::Debug
    for FourTree<V, WIDTH, WORDS, C>
{
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("FourTree")
            .field("width", &WIDTH)
            .field("key_width", &self.key_width)
            .field("len", &self.len())
            .field("nodes", &self.node_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Tests
// ============================================================================
