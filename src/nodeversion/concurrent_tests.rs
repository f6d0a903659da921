//! Concurrent tests for `NodeVersion`.
//!
//! Real threads hammering one version word. Guarded with `#[cfg(not(miri))]`
//! at the module declaration because Miri is too slow for these loops.

use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::thread;
use std::time::Duration;

/// Spin until the lock is taken.
fn lock_spin(v: &NodeVersion) -> LockGuard<'_> {
    loop {
        if let Some(guard) = LockGuard::try_acquire(v) {
            return guard;
        }
        std::hint::spin_loop();
    }
}

#[test]
fn test_concurrent_try_lock_counts_every_insert() {
    let version = Arc::new(NodeVersion::new());
    let iterations: u32 = 1000;
    let num_threads: u32 = 4;

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let v = Arc::clone(&version);
            thread::spawn(move || {
                for _ in 0..iterations {
                    let mut guard = lock_spin(&v);
                    guard.mark_insert();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked");
    }

    assert!(!version.is_locked());
    assert!(!version.is_inserting());
    assert_eq!(version.insert_count(), iterations * num_threads);
}

#[test]
fn test_lock_protects_plain_counter() {
    // Two non-atomic-looking halves of a pair updated under the lock must
    // always be observed equal by a validated reader.
    let version = Arc::new(NodeVersion::new());
    let left = Arc::new(AtomicU64::new(0));
    let right = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let (v, l, r) = (Arc::clone(&version), Arc::clone(&left), Arc::clone(&right));
            thread::spawn(move || {
                for _ in 0..2000 {
                    let mut guard = lock_spin(&v);
                    guard.mark_insert();
                    let next = l.load(Ordering::Relaxed) + 1;
                    l.store(next, Ordering::Release);
                    r.store(next, Ordering::Release);
                }
            })
        })
        .collect();

    let reader = {
        let (v, l, r, s) = (
            Arc::clone(&version),
            Arc::clone(&left),
            Arc::clone(&right),
            Arc::clone(&stop),
        );
        thread::spawn(move || {
            let mut validated = 0u64;
            while !s.load(Ordering::Acquire) {
                let token = v.stable();
                let a = l.load(Ordering::Acquire);
                let b = r.load(Ordering::Acquire);
                if !v.has_changed(token) {
                    assert_eq!(a, b, "validated snapshot saw a torn pair");
                    validated += 1;
                }
            }
            validated
        })
    };

    for w in writers {
        w.join().expect("writer panicked");
    }
    stop.store(true, Ordering::Release);
    reader.join().expect("reader panicked");

    assert_eq!(left.load(Ordering::Relaxed), 4000);
    assert_eq!(right.load(Ordering::Relaxed), 4000);
}

#[test]
fn test_stable_waits_for_insert_to_finish() {
    let version = Arc::new(NodeVersion::new());
    let writer_done = Arc::new(AtomicBool::new(false));

    let v_writer = Arc::clone(&version);
    let done = Arc::clone(&writer_done);
    let writer = thread::spawn(move || {
        let mut guard = lock_spin(&v_writer);
        guard.mark_insert();
        thread::sleep(Duration::from_millis(50));
        done.store(true, Ordering::Release);
        drop(guard);
    });

    thread::sleep(Duration::from_millis(10));

    let token = version.stable();
    assert_eq!(token & BUSY_MASK, 0);
    assert!(writer_done.load(Ordering::Acquire));

    writer.join().expect("writer panicked");
}

#[test]
fn test_guard_unlocks_on_panic() {
    let version = Arc::new(NodeVersion::new());
    let v = Arc::clone(&version);

    let handle = thread::spawn(move || {
        let mut guard = lock_spin(&v);
        guard.mark_insert();
        panic!("intentional panic");
    });

    assert!(handle.join().is_err(), "should have panicked");

    assert!(!version.is_locked());
    assert!(!version.is_inserting());
    assert!(version.try_lock());
    // SAFETY: locked by the try_lock above.
    unsafe { version.unlock() };
}
