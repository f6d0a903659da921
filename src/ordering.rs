//! Memory orderings shared by every node access.
//!
//! Naming the orderings keeps the publication protocol readable at each
//! call site: writers publish with [`WRITE_ORD`] while holding the node
//! lock, readers consume with [`READ_ORD`] around a version token.

use std::sync::atomic::Ordering;

/// Loads that may race a writer (slot occupancy, keys, child links).
/// Pairs with [`WRITE_ORD`].
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Stores that become visible to unlocked readers.
/// Pairs with [`READ_ORD`].
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Value swap on update: acquire the displaced pointer, release the new one.
pub const SWAP_ORD: Ordering = Ordering::AcqRel;

/// Lock acquisition CAS, success side.
pub const CAS_SUCCESS: Ordering = Ordering::Acquire;

/// Lock acquisition CAS, failure side. Only the observed value matters.
pub const CAS_FAILURE: Ordering = Ordering::Relaxed;

/// Loads of data that is either private or protected by the held lock.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Version word loads in `stable()` and `has_changed()`.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Version word store that releases the lock.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
