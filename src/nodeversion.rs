//! Filepath: src/nodeversion.rs
//!
//! Version capsule for optimistic concurrency control.
//!
//! Every node carries one capsule: a version counter, a lock bit and an
//! "inserting" dirty marker packed into a single word. The node does not
//! inherit this behavior; it holds a [`VersionCapsule`] as a field and the
//! capsule type is a generic parameter of the tree, so alternative
//! implementations can be injected.
//!
//! # Concurrency Model
//! 1. Readers: `stable()` for a token, read node fields, `has_changed(token)`.
//!    On change, discard everything read and restart.
//! 2. Writers: [`LockGuard::try_acquire`], mutate, `mark_insert()` when the
//!    slot count or child set changes, then drop the guard.
//!
//! Readers never block. Writers only contend with writers of the same node,
//! and never wait: a failed `try_lock` is retried at a higher level.
//!
//! ```rust
//! use fourtree::nodeversion::{LockGuard, NodeVersion, VersionCapsule};
//!
//! let version = NodeVersion::new();
//! let token = version.stable();
//!
//! {
//!     let mut guard = LockGuard::try_acquire(&version).unwrap();
//!     guard.mark_insert();
//! }
//!
//! assert!(version.has_changed(token));
//! ```

use std::fmt as StdFmt;
use std::hint;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering, fence};

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, RELAXED, UNLOCK_ORD, VERSION_ORD};

#[cfg(all(test, not(miri)))]
mod concurrent_tests;


// ============================================================================
//  Bit Layout
// ============================================================================

/// Lock bit: a writer holds the node.
const LOCK_BIT: u32 = 1 << 0;

/// Inserting bit: a structural change is in flight.
const INSERTING_BIT: u32 = 1 << 1;

/// Either bit set means a snapshot taken now would be unstable.
const BUSY_MASK: u32 = LOCK_BIT | INSERTING_BIT;

/// Low bit of the insert counter (bits 2..32).
const VINSERT_LOWBIT: u32 = 1 << 2;

// ============================================================================
//  VersionCapsule
// ============================================================================

/// The contract a node's version stamp must provide.
///
/// Tokens are opaque `u32` snapshots. A token returned by [`stable`] never
/// has the lock or dirty state set.
///
/// [`stable`]: VersionCapsule::stable
pub trait VersionCapsule: Default + Send + Sync {
    /// Spin until no writer holds the node and return a snapshot token.
    fn stable(&self) -> u32;

    /// True if the node mutated since `token` was taken, or is locked now.
    fn has_changed(&self, token: u32) -> bool;

    /// Like [`has_changed`](VersionCapsule::has_changed), but called by the
    /// lock holder: its own lock bit is not a change.
    fn has_changed_locked(&self, token: u32) -> bool;

    /// Non-blocking attempt to take exclusive mutation rights.
    fn try_lock(&self) -> bool;

    /// Release the lock, advancing the version if an insert was marked.
    ///
    /// # Safety
    /// The caller must hold the lock (a successful [`try_lock`] not yet
    /// paired with an unlock).
    ///
    /// [`try_lock`]: VersionCapsule::try_lock
    unsafe fn unlock(&self);

    /// Mark a structural change so the version advances on unlock and
    /// in-flight readers discard their snapshots.
    ///
    /// # Safety
    /// The caller must hold the lock.
    unsafe fn mark_insert(&self);

    /// Check if the lock is currently held.
    fn is_locked(&self) -> bool;

    /// Raw version word, for diagnostics.
    fn value(&self) -> u32;
}

// ============================================================================
//  NodeVersion
// ============================================================================

/// Seqlock-style version word.
///
/// # Layout
/// Bits 2-31: insert counter | Bit 1: inserting | Bit 0: locked
#[derive(Default)]
pub struct NodeVersion {
    value: AtomicU32,
}

impl NodeVersion {
    /// Create an unlocked version with a zero counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
        }
    }

    /// Create a version from a raw word.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    /// Check if a structural change is in flight.
    #[inline]
    #[must_use]
    pub fn is_inserting(&self) -> bool {
        (self.value.load(RELAXED) & INSERTING_BIT) != 0
    }

    /// Number of completed structural changes.
    #[inline]
    #[must_use]
    pub fn insert_count(&self) -> u32 {
        self.value.load(RELAXED) >> VINSERT_LOWBIT.trailing_zeros()
    }
}

impl VersionCapsule for NodeVersion {
    #[inline]
    fn stable(&self) -> u32 {
        loop {
            let value: u32 = self.value.load(VERSION_ORD);
            if (value & BUSY_MASK) == 0 {
                return value;
            }
            hint::spin_loop();
        }
    }

    #[inline]
    fn has_changed(&self, token: u32) -> bool {
        self.value.load(VERSION_ORD) != token
    }

    #[inline]
    fn has_changed_locked(&self, token: u32) -> bool {
        (self.value.load(VERSION_ORD) & !LOCK_BIT) != token
    }

    #[inline]
    fn try_lock(&self) -> bool {
        let value: u32 = self.value.load(RELAXED);
        if (value & BUSY_MASK) != 0 {
            return false;
        }

        self.value
            .compare_exchange(value, value | LOCK_BIT, CAS_SUCCESS, CAS_FAILURE)
            .is_ok()
    }

    #[inline]
    unsafe fn unlock(&self) {
        // INVARIANT: lock is held, so only this thread writes the word.
        let value: u32 = self.value.load(RELAXED);
        debug_assert!((value & LOCK_BIT) != 0, "unlock() on an unlocked node");

        let next: u32 = if (value & INSERTING_BIT) != 0 {
            value.wrapping_add(VINSERT_LOWBIT) & !BUSY_MASK
        } else {
            value & !LOCK_BIT
        };

        self.value.store(next, UNLOCK_ORD);
    }

    #[inline]
    unsafe fn mark_insert(&self) {
        // INVARIANT: lock is held, so only this thread writes the word.
        let value: u32 = self.value.load(RELAXED);
        debug_assert!((value & LOCK_BIT) != 0, "mark_insert() without the lock");

        self.value.store(value | INSERTING_BIT, RELAXED);

        // The dirty bit must be visible before any structural store that follows.
        fence(Ordering::Release);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        (self.value.load(RELAXED) & LOCK_BIT) != 0
    }

    #[inline]
    fn value(&self) -> u32 {
        self.value.load(RELAXED)
    }
}

impl StdFmt::Debug for NodeVersion {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        let value: u32 = self.value.load(RELAXED);
        f.debug_struct("NodeVersion")
            .field("locked", &((value & LOCK_BIT) != 0))
            .field("inserting", &((value & INSERTING_BIT) != 0))
            .field("counter", &(value >> 2))
            .finish()
    }
}

// ============================================================================
//  LockGuard
// ============================================================================

/// Proof that a node's lock is held.
///
/// Only [`LockGuard::try_acquire`] creates one. Operations that mutate a
/// node take `&LockGuard` as evidence. Dropping the guard unlocks, on every
/// exit path including unwinding.
///
/// `PhantomData<*mut ()>` keeps the guard `!Send` and `!Sync`: the lock is
/// released by the thread that took it.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a, C: VersionCapsule = NodeVersion> {
    version: &'a C,
    _marker: PhantomData<*mut ()>,
}

impl<'a, C: VersionCapsule> LockGuard<'a, C> {
    /// Try to lock `version` without blocking.
    #[inline]
    pub fn try_acquire(version: &'a C) -> Option<Self> {
        if version.try_lock() {
            Some(Self {
                version,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }

    /// Mark a structural change; the version advances when the guard drops.
    #[inline]
    pub fn mark_insert(&mut self) {
        // SAFETY: the guard exists only while the lock is held.
        unsafe { self.version.mark_insert() };
    }

    /// True if the node changed since `token`, not counting this lock.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, token: u32) -> bool {
        self.version.has_changed_locked(token)
    }

    /// True if this guard locks `version`.
    #[inline]
    #[must_use]
    pub fn guards(&self, version: &C) -> bool {
        std::ptr::eq(self.version, version)
    }
}

impl<C: VersionCapsule> Drop for LockGuard<'_, C> {
    fn drop(&mut self) {
        // SAFETY: the guard exists only while the lock is held.
        unsafe { self.version.unlock() };
    }
}

impl<C: VersionCapsule> StdFmt::Debug for LockGuard<'_, C> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("LockGuard")
            .field("value", &self.version.value())
            .finish()
    }
}
