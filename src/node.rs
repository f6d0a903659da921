//! Filepath: src/node.rs
//!
//! Fixed-fanout node for [`FourTree`](crate::FourTree).
//!
//! A node holds up to `WIDTH` ordered `(key, value)` slots and `WIDTH + 1`
//! child links. Nodes never split, merge, or move: a node that runs out of
//! slots grows the tree by linking a child below it.
//!
//! # Layout (WIDTH=3, WORDS=2)
//!
//! ```text
//!            [ K0 | K1 | K2 ]
//!           /     |    |     \
//!        C0      C1    C2     C3 (rightmost)
//!
//!   C0: keys < K0
//!   C1: K0 < keys < K1
//!   C2: K1 < keys < K2
//!   C3: keys > K2
//! ```
//!
//! `children[WIDTH]` is stored separately as `rightmost` to avoid a
//! `WIDTH + 1` array length, which needs unstable `generic_const_exprs`.
//!
//! # Invariants
//! - Occupied slots form a prefix `0..k` (no gaps).
//! - Occupied keys strictly increase with slot index.
//! - A slot, once occupied, never becomes vacant, and its key never changes.
//! - A child link, once set, never changes.
//!
//! # Thread Safety
//! Slot keys, value pointers, child links and the version word are only
//! written while the node lock is held. Unlocked readers load them with
//! `Acquire` and validate against a version token.

use std::cmp::Ordering;
use std::fmt as StdFmt;
use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicU64};

use seize::{Collector, Guard, LocalGuard};

use crate::key::Key;
use crate::nodeversion::{LockGuard, NodeVersion, VersionCapsule};
use crate::ordering::{READ_ORD, RELAXED, SWAP_ORD, WRITE_ORD};
use crate::tracing_helpers::trace_log;

// ============================================================================
//  Route
// ============================================================================

/// Where a key leads inside one node.
pub enum Route<N> {
    /// The key is stored in this slot.
    Found(usize),

    /// The key is absent from this node and would go into this vacant slot.
    Vacant(usize),

    /// The key belongs under child link `slot` (`slot == WIDTH` is the
    /// rightmost link). A null `child` means the subtree does not exist yet.
    Descend {
        /// Child link index, `0..=WIDTH`.
        slot: usize,
        /// Child pointer as loaded, possibly null.
        child: *mut N,
    },
}

// Manual impls: derives would require `N: Clone/PartialEq/Debug`.
impl<N> Clone for Route<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Route<N> {}

impl<N> PartialEq for Route<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Found(a), Self::Found(b)) | (Self::Vacant(a), Self::Vacant(b)) => a == b,
            (
                Self::Descend { slot: a, child: ca },
                Self::Descend { slot: b, child: cb },
            ) => a == b && StdPtr::eq(*ca, *cb),
            _ => false,
        }
    }
}

impl<N> Eq for Route<N> {}

impl<N> StdFmt::Debug for Route<N> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Found(slot) => f.debug_tuple("Found").field(slot).finish(),
            Self::Vacant(slot) => f.debug_tuple("Vacant").field(slot).finish(),
            Self::Descend { slot, child } => f
                .debug_struct("Descend")
                .field("slot", slot)
                .field("child", child)
                .finish(),
        }
    }
}

// ============================================================================
//  Node
// ============================================================================

/// One fixed-fanout node.
///
/// # Type Parameters
/// * `V` - value type, stored as `Arc<V>`
/// * `WIDTH` - keyed slots per node (fanout − 1)
/// * `WORDS` - key width in machine words
/// * `C` - version capsule implementation
#[repr(C, align(64))]
pub struct Node<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule = NodeVersion> {
    /// Version capsule for optimistic concurrency control.
    version: C,

    /// Key words per slot. Meaningful only where the value is non-null.
    keys: [[AtomicU64; WORDS]; WIDTH],

    /// Value per slot, from `Arc::into_raw`. Null means vacant.
    values: [AtomicPtr<V>; WIDTH],

    /// `children[i]` holds keys below `keys[i]`.
    children: [AtomicPtr<Self>; WIDTH],

    /// Holds keys above every occupied slot.
    rightmost: AtomicPtr<Self>,

    /// Owns `Arc<V>` values: `Send`/`Sync` follow `Arc<V>`.
    _marker: PhantomData<Arc<V>>,
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Node<V, WIDTH, WORDS, C> {
    const SHAPE_CHECK: () = {
        assert!(WIDTH > 0, "a node needs at least one slot");
        assert!(WORDS > 0, "a key needs at least one word");
    };

    /// Create an empty, unlinked node.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SHAPE_CHECK;

        Self {
            version: C::default(),
            keys: std::array::from_fn(|_| std::array::from_fn(|_| AtomicU64::new(0))),
            values: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            children: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            rightmost: AtomicPtr::new(StdPtr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// Create a node whose first slot already holds `(key, value)`.
    ///
    /// The node is private until linked, so no lock is involved.
    #[must_use]
    pub fn with_entry(key: &Key<WORDS>, value: Arc<V>) -> Box<Self> {
        let mut node: Box<Self> = Box::new(Self::new());

        for (cell, &word) in node.keys[0].iter_mut().zip(key.words()) {
            *cell.get_mut() = word;
        }
        *node.values[0].get_mut() = Arc::into_raw(value).cast_mut();

        node
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// The node's version capsule.
    #[inline]
    pub const fn version(&self) -> &C {
        &self.version
    }

    /// Check if `slot` holds a key.
    #[inline]
    #[must_use]
    pub fn is_occupied(&self, slot: usize) -> bool {
        !self.values[slot].load(READ_ORD).is_null()
    }

    /// Number of occupied slots (the length of the occupied prefix).
    #[must_use]
    pub fn occupied(&self) -> usize {
        (0..WIDTH)
            .position(|slot| !self.is_occupied(slot))
            .unwrap_or(WIDTH)
    }

    /// Key stored in `slot`, if occupied.
    #[must_use]
    pub fn key_at(&self, slot: usize) -> Option<Key<WORDS>> {
        if !self.is_occupied(slot) {
            return None;
        }
        let words: [u64; WORDS] = std::array::from_fn(|i| self.keys[slot][i].load(READ_ORD));
        Some(Key::from_words(words))
    }

    /// Child link `slot`; `slot == WIDTH` is the rightmost link.
    #[inline]
    #[must_use]
    pub fn child(&self, slot: usize) -> *mut Self {
        self.child_link(slot).load(READ_ORD)
    }

    #[inline]
    fn child_link(&self, slot: usize) -> &AtomicPtr<Self> {
        if slot == WIDTH {
            &self.rightmost
        } else {
            &self.children[slot]
        }
    }

    /// Load the value in `slot` under an epoch guard.
    ///
    /// The returned `Arc` is independent of the guard: the strong count is
    /// taken while the guard still keeps the allocation alive.
    #[must_use]
    pub fn load_value(&self, slot: usize, guard: &LocalGuard<'_>) -> Option<Arc<V>> {
        let ptr: *mut V = guard.protect(&self.values[slot], READ_ORD);
        if ptr.is_null() {
            return None;
        }

        // SAFETY: `ptr` came from `Arc::into_raw`. Displaced values are only
        // retired through the collector, and `guard` is active, so the
        // allocation is still live and its strong count is at least one.
        unsafe {
            Arc::increment_strong_count(ptr);
            Some(Arc::from_raw(ptr))
        }
    }

    /// Compare `key` against the key in an occupied `slot`.
    #[inline]
    fn compare_slot(&self, key: &Key<WORDS>, slot: usize) -> Ordering {
        let words: &[AtomicU64; WORDS] = &self.keys[slot];
        key.compare_with(|i| words[i].load(READ_ORD))
    }

    // ========================================================================
    //  Routing
    // ========================================================================

    /// Decide where `key` goes in this node.
    ///
    /// Scans occupied slots left to right. Every decision is validated
    /// against the version token captured at the start of the scan; a
    /// detected change rescans this node. Returns the route and the token
    /// it was validated against.
    pub fn route(&self, key: &Key<WORDS>) -> (Route<Self>, u32) {
        'rescan: loop {
            let token: u32 = self.version.stable();

            for slot in 0..WIDTH {
                let route: Route<Self> = if !self.is_occupied(slot) {
                    Route::Vacant(slot)
                } else {
                    match self.compare_slot(key, slot) {
                        Ordering::Equal => Route::Found(slot),
                        Ordering::Less => Route::Descend {
                            slot,
                            child: self.child(slot),
                        },
                        Ordering::Greater => continue,
                    }
                };

                if self.version.has_changed(token) {
                    trace_log!(slot, "route: version changed, rescanning node");
                    continue 'rescan;
                }
                return (route, token);
            }

            let child: *mut Self = self.child(WIDTH);
            if self.version.has_changed(token) {
                trace_log!("route: version changed at rightmost, rescanning node");
                continue 'rescan;
            }
            return (Route::Descend { slot: WIDTH, child }, token);
        }
    }

    // ========================================================================
    //  Mutation (lock held)
    // ========================================================================

    /// Write `(key, value)` into `slot`, retiring any displaced value.
    ///
    /// Never touches child links. The displaced value goes to `guard`'s
    /// collector and is freed only once no reader can still hold it.
    ///
    /// The lock guard is the proof of exclusive access. Passing the wrong
    /// slot, or a guard for another node, is a caller bug; both are only
    /// checked in debug builds.
    pub fn assign(
        &self,
        key: &Key<WORDS>,
        value: Arc<V>,
        slot: usize,
        lock: &LockGuard<'_, C>,
        guard: &LocalGuard<'_>,
    ) {
        debug_assert!(slot < WIDTH, "slot {slot} out of range for width {WIDTH}");
        debug_assert!(lock.guards(&self.version), "assign() without this node's lock");

        for (cell, &word) in self.keys[slot].iter().zip(key.words()) {
            cell.store(word, WRITE_ORD);
        }

        let new_ptr: *mut V = Arc::into_raw(value).cast_mut();
        let old_ptr: *mut V = self.values[slot].swap(new_ptr, SWAP_ORD);

        if !old_ptr.is_null() {
            // SAFETY: `old_ptr` came from `Arc::into_raw` and was just
            // unlinked; no new reader can reach it after the swap.
            unsafe { guard.defer_retire(old_ptr, reclaim_value::<V>) };
        }
    }

    /// Link `child` under link `slot`.
    ///
    /// The caller must have marked an insert on `lock` first so readers
    /// holding an older token re-route.
    pub fn link_child(&self, slot: usize, child: *mut Self, lock: &LockGuard<'_, C>) {
        debug_assert!(slot <= WIDTH, "link {slot} out of range for width {WIDTH}");
        debug_assert!(lock.guards(&self.version), "link_child() without this node's lock");
        debug_assert!(self.child(slot).is_null(), "child links are set once");

        self.child_link(slot).store(child, WRITE_ORD);
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Default
    for Node<V, WIDTH, WORDS, C>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> Drop
    for Node<V, WIDTH, WORDS, C>
{
    fn drop(&mut self) {
        // Live values are owned by the node; displaced ones went to the
        // collector and are not reachable from here.
        for value in &mut self.values {
            let ptr: *mut V = *value.get_mut();
            if !ptr.is_null() {
                // SAFETY: `ptr` came from `Arc::into_raw` and `&mut self`
                // means no reader remains.
                unsafe { drop(Arc::from_raw(ptr)) };
            }
        }
    }
}

impl<V, const WIDTH: usize, const WORDS: usize, C: VersionCapsule> StdFmt::Debug
    for Node<V, WIDTH, WORDS, C>
{
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let keys: Vec<Key<WORDS>> = (0..WIDTH).filter_map(|slot| self.key_at(slot)).collect();
        f.debug_struct("Node")
            .field("version", &self.version.value())
            .field("keys", &keys)
            .field("rightmost", &!self.rightmost.load(RELAXED).is_null())
            .finish_non_exhaustive()
    }
}

/// Reclaim a value retired by [`Node::assign`] (seize callback).
///
/// # Safety
/// `ptr` must come from `Arc::into_raw` and be unreachable by new readers.
unsafe fn reclaim_value<V>(ptr: *mut V, _collector: &Collector) {
    // SAFETY: guaranteed by the caller and by seize's grace period.
    unsafe { drop(Arc::from_raw(ptr)) };
}
