//! Filepath: src/cursor.rs
//!
//! Traversal state machine for [`FourTree`](crate::FourTree).
//!
//! A [`Cursor`] walks from the root to the node responsible for one key.
//!
//! - [`Cursor::find_unlocked`] is the read path: no locks, each hop is
//!   validated inside [`Node::route`], and the result is a value or absence.
//! - [`Cursor::find_locked`] is the write path: it ends holding the lock of
//!   the node to mutate and says what to do there ([`WriteKind`]).
//!
//! # Write Protocol
//!
//! ```text
//! loop (attempt):
//!   node = root
//!   loop (hop):
//!     (route, token) = node.route(key)
//!     Found / Vacant       -> target = node
//!     Descend(non-null)    -> node = child; continue
//!     Descend(null)        -> target = node (parent of the new node)
//!     has_changed(token)?  -> restart attempt
//!     try_lock() failed?   -> restart attempt
//!     changed under lock?  -> unlock, restart attempt
//!     return target with its lock
//! ```
//!
//! Every attempt starts from the root with fresh state. Contention is
//! absorbed here and never reported to the caller.

use std::hint;
use std::sync::Arc;

use seize::LocalGuard;

use crate::key::Key;
use crate::node::{Node, Route};
use crate::nodeversion::{LockGuard, VersionCapsule};
use crate::tracing_helpers::trace_log;

// ============================================================================
//  WriteTarget
// ============================================================================

/// What a writer does at the locked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// The key is in `slot`: swap its value in place.
    Update,

    /// `slot` is the first vacant slot and the key sorts after every
    /// occupied one: occupy it.
    Fill,

    /// Child link `slot` is empty: hang a new node there.
    Attach,
}

/// The locked node a write must apply to.
#[derive(Debug)]
pub struct WriteTarget<'t, V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> {
    /// The node to mutate (for [`WriteKind::Attach`], the parent).
    pub node: &'t Node<V, WIDTH, WORDS, C>,

    /// Slot index, or child link index for [`WriteKind::Attach`].
    pub slot: usize,

    /// What to do there.
    pub kind: WriteKind,

    /// Lock on `node`, released on drop.
    pub lock: LockGuard<'t, C>,
}

// ============================================================================
//  Cursor
// ============================================================================

/// Root-to-node traversal for one key.
#[derive(Debug)]
pub struct Cursor<'t, V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> {
    root: &'t Node<V, WIDTH, WORDS, C>,
    key: Key<WORDS>,

    /// Depth of the last node visited (root = 1).
    depth: usize,
}

impl<'t, V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule>
    Cursor<'t, V, WIDTH, WORDS, C>
{
    /// Create a cursor for `key` starting at `root`.
    ///
    /// Every node reachable from `root` must live at least as long as `'t`;
    /// the tree guarantees this because nodes are freed only when it drops.
    #[must_use]
    pub const fn new(root: &'t Node<V, WIDTH, WORDS, C>, key: Key<WORDS>) -> Self {
        Self {
            root,
            key,
            depth: 0,
        }
    }

    /// The key being searched.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> &Key<WORDS> {
        &self.key
    }

    /// Depth of the last node visited by a find (root = 1).
    ///
    /// After [`find_unlocked`](Self::find_unlocked) returns a value, this is
    /// the depth of the node holding the key.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Follow a non-null child link.
    #[inline]
    fn step(&mut self, child: *mut Node<V, WIDTH, WORDS, C>) -> &'t Node<V, WIDTH, WORDS, C> {
        self.depth += 1;

        // SAFETY: `child` is non-null and was published by a writer under
        // the parent's lock with release ordering. Nodes are never freed
        // while the tree is borrowed for `'t`.
        unsafe { &*child }
    }

    /// Lock-free lookup.
    ///
    /// Version mismatches are retried inside [`Node::route`]. A vacant slot
    /// or a missing child link means the key is absent.
    pub fn find_unlocked(&mut self, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        let mut node: &'t Node<V, WIDTH, WORDS, C> = self.root;
        self.depth = 1;

        loop {
            match node.route(&self.key).0 {
                Route::Found(slot) => return node.load_value(slot, guard),
                Route::Vacant(_) => return None,
                Route::Descend { child, .. } => {
                    if child.is_null() {
                        return None;
                    }
                    node = self.step(child);
                }
            }
        }
    }

    /// Locate and lock the node a write of this key applies to.
    ///
    /// Spins until it wins; never fails.
    pub fn find_locked(&mut self) -> WriteTarget<'t, V, WIDTH, WORDS, C> {
        'attempt: loop {
            let mut node: &'t Node<V, WIDTH, WORDS, C> = self.root;
            self.depth = 1;

            loop {
                let (route, token) = node.route(&self.key);

                let (kind, slot) = match route {
                    Route::Found(slot) => (WriteKind::Update, slot),
                    Route::Vacant(slot) => (WriteKind::Fill, slot),
                    Route::Descend { slot, child } => {
                        if !child.is_null() {
                            node = self.step(child);
                            continue;
                        }
                        (WriteKind::Attach, slot)
                    }
                };

                if node.version().has_changed(token) {
                    trace_log!(depth = self.depth, "find_locked: changed before lock, restarting");
                    hint::spin_loop();
                    continue 'attempt;
                }

                let Some(lock) = LockGuard::try_acquire(node.version()) else {
                    trace_log!(depth = self.depth, "find_locked: try_lock failed, restarting");
                    hint::spin_loop();
                    continue 'attempt;
                };

                if lock.has_changed(token) {
                    trace_log!(depth = self.depth, "find_locked: changed under lock, restarting");
                    drop(lock);
                    hint::spin_loop();
                    continue 'attempt;
                }

                return WriteTarget {
                    node,
                    slot,
                    kind,
                    lock,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodeversion::NodeVersion;
    use crate::tree::FourTree;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Capsule that can lose lock races on demand.
    #[derive(Default)]
    struct RacyVersion {
        inner: NodeVersion,
        /// `try_lock` calls that fail outright.
        fail_locks: AtomicUsize,
        /// `try_lock` calls preceded by another writer's completed insert.
        insert_before_lock: AtomicUsize,
        attempts: AtomicUsize,
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    impl VersionCapsule for RacyVersion {
        fn stable(&self) -> u32 {
            self.inner.stable()
        }

        fn has_changed(&self, token: u32) -> bool {
            self.inner.has_changed(token)
        }

        fn has_changed_locked(&self, token: u32) -> bool {
            self.inner.has_changed_locked(token)
        }

        fn try_lock(&self) -> bool {
            self.attempts.fetch_add(1, AtomicOrdering::SeqCst);
            if take(&self.fail_locks) {
                return false;
            }
            if take(&self.insert_before_lock) {
                assert!(self.inner.try_lock());
                // SAFETY: locked just above.
                unsafe {
                    self.inner.mark_insert();
                    self.inner.unlock();
                }
            }
            self.inner.try_lock()
        }

        unsafe fn unlock(&self) {
            // SAFETY: forwarded caller contract.
            unsafe { self.inner.unlock() };
        }

        unsafe fn mark_insert(&self) {
            // SAFETY: forwarded caller contract.
            unsafe { self.inner.mark_insert() };
        }

        fn is_locked(&self) -> bool {
            self.inner.is_locked()
        }

        fn value(&self) -> u32 {
            self.inner.value()
        }
    }

    fn key(s: &str) -> Key {
        Key::new(s.as_bytes())
    }

    #[test]
    fn test_empty_tree_fills_root() {
        let tree: FourTree<u64> = FourTree::new();
        let mut cursor = Cursor::new(tree.root(), key("a"));

        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Fill);
        assert_eq!(target.slot, 0);
        assert!(std::ptr::eq(target.node, tree.root()));
        assert!(target.node.version().is_locked());

        drop(target);
        assert!(!tree.root().version().is_locked());
    }

    #[test]
    fn test_existing_key_updates() {
        let tree: FourTree<u64> = FourTree::new();
        tree.put(b"a", 1);
        tree.put(b"b", 2);

        let mut cursor = Cursor::new(tree.root(), key("b"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Update);
        assert_eq!(target.slot, 1);
        assert_eq!(cursor.depth(), 1);
    }

    #[test]
    fn test_full_root_attaches_child() {
        let tree: FourTree<u64> = FourTree::new();
        for (k, v) in [("b", 1), ("d", 2), ("f", 3)] {
            tree.put(k.as_bytes(), v);
        }

        let mut cursor = Cursor::new(tree.root(), key("a"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Attach);
        assert_eq!(target.slot, 0);
        drop(target);

        let mut cursor = Cursor::new(tree.root(), key("z"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Attach);
        assert_eq!(target.slot, 3);
    }

    #[test]
    fn test_unlocked_reports_depth() {
        let tree: FourTree<u64> = FourTree::new();
        for (i, k) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            tree.put(k.as_bytes(), i as u64);
        }

        let guard = tree.guard();
        let mut cursor = Cursor::new(tree.root(), key("e"));
        assert_eq!(cursor.find_unlocked(&guard).as_deref(), Some(&4));
        assert_eq!(cursor.depth(), 2);

        let mut cursor = Cursor::new(tree.root(), key("zz"));
        assert_eq!(cursor.find_unlocked(&guard), None);
    }

    #[test]
    fn test_stale_token_detected_after_insert() {
        let tree: FourTree<u64> = FourTree::new();
        tree.put(b"m", 1);

        // A stale token no longer matches once the root gains a slot.
        let (_, stale) = tree.root().route(&key("z"));
        tree.put(b"n", 2);
        assert!(tree.root().version().has_changed(stale));

        // The cursor recomputes from scratch and lands on the next slot.
        let mut cursor = Cursor::new(tree.root(), key("z"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Fill);
        assert_eq!(target.slot, 2);
    }

    #[test]
    fn test_locked_restarts_when_lock_is_taken() {
        let tree: FourTree<u64, 3, 2, RacyVersion> = FourTree::new();
        tree.put(b"a", 1);

        let root: &RacyVersion = tree.root().version();
        root.attempts.store(0, AtomicOrdering::SeqCst);
        root.fail_locks.store(3, AtomicOrdering::SeqCst);

        let mut cursor = Cursor::new(tree.root(), key("b"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Fill);
        assert_eq!(target.slot, 1);
        assert_eq!(root.attempts.load(AtomicOrdering::SeqCst), 4);
    }

    #[test]
    fn test_locked_restarts_when_node_changed_under_lock() {
        let tree: FourTree<u64, 3, 2, RacyVersion> = FourTree::new();
        tree.put(b"a", 1);

        let root: &RacyVersion = tree.root().version();
        let inserts_before: u32 = root.inner.insert_count();
        root.attempts.store(0, AtomicOrdering::SeqCst);
        root.insert_before_lock.store(1, AtomicOrdering::SeqCst);

        let mut cursor = Cursor::new(tree.root(), key("b"));
        let target = cursor.find_locked();
        assert_eq!(target.kind, WriteKind::Fill);
        assert_eq!(target.slot, 1);
        assert!(target.node.version().is_locked());

        // The first lock saw a newer version than its token and was dropped.
        assert_eq!(root.attempts.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(root.inner.insert_count(), inserts_before + 1);
    }
}
