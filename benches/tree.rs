//! Benchmarks for `FourTree` using Divan.
//!
//! Run with: `cargo bench --bench tree`

use std::sync::Arc;

use divan::{Bencher, black_box};
use fourtree::FourTree;

fn main() {
    divan::main();
}

const MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Scrambled 8-byte key; distinct for distinct `i`.
fn key(i: u64) -> [u8; 8] {
    i.wrapping_mul(MIX).to_be_bytes()
}

fn setup_tree(n: u64) -> FourTree<u64> {
    let tree = FourTree::new();
    for i in 0..n {
        tree.put(&key(i), i);
    }
    tree
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench]
fn new_tree() -> FourTree<u64> {
    FourTree::new()
}

// =============================================================================
// Put
// =============================================================================

#[divan::bench_group]
mod put {
    use super::{Arc, Bencher, FourTree, black_box, key, setup_tree};

    #[divan::bench]
    fn fill_root(bencher: Bencher) {
        bencher
            .with_inputs(FourTree::<u64>::new)
            .bench_local_values(|tree| {
                tree.put(black_box(b"hello"), black_box(42));
                tree
            });
    }

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn attach_into_n(bencher: Bencher, n: u64) {
        bencher
            .with_inputs(|| setup_tree(n))
            .bench_local_values(|tree| {
                tree.put(black_box(&key(n + 1)), black_box(0));
                tree
            });
    }

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn overwrite_in_n(bencher: Bencher, n: u64) {
        let tree = setup_tree(n);
        let guard = tree.guard();
        let k = key(n / 2);
        bencher.bench_local(|| tree.put_with_guard(black_box(&k), black_box(7), &guard));
    }

    #[divan::bench]
    fn shared_arc(bencher: Bencher) {
        let value: Arc<u64> = Arc::new(42);
        bencher
            .with_inputs(FourTree::<u64>::new)
            .bench_local_values(|tree| {
                let guard = tree.guard();
                tree.put_arc_with_guard(black_box(b"k"), Arc::clone(&value), &guard);
                drop(guard);
                tree
            });
    }

    #[divan::bench(args = [16, 64, 256])]
    fn sorted_chain(bencher: Bencher, n: u64) {
        bencher
            .with_inputs(FourTree::<u64>::new)
            .bench_local_values(|tree| {
                for i in 0..n {
                    tree.put(black_box(&i.to_be_bytes()), i);
                }
                tree
            });
    }
}

// =============================================================================
// Get
// =============================================================================

#[divan::bench_group]
mod get {
    use super::{Bencher, FourTree, black_box, key, setup_tree};

    #[divan::bench]
    fn from_empty(bencher: Bencher) {
        let tree: FourTree<u64> = FourTree::new();
        bencher.bench_local(|| tree.get(black_box(b"missing")));
    }

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn hit(bencher: Bencher, n: u64) {
        let tree = setup_tree(n);
        let guard = tree.guard();
        let k = key(n / 2);
        bencher.bench_local(|| tree.get_with_guard(black_box(&k), &guard));
    }

    #[divan::bench(args = [100, 1_000, 10_000])]
    fn miss(bencher: Bencher, n: u64) {
        let tree = setup_tree(n);
        let guard = tree.guard();
        let k = key(n + 1);
        bencher.bench_local(|| tree.get_with_guard(black_box(&k), &guard));
    }

    #[divan::bench(args = [1_000])]
    fn all_keys(bencher: Bencher, n: u64) {
        let tree = setup_tree(n);
        bencher.bench_local(|| {
            let guard = tree.guard();
            (0..n).filter(|&i| tree.get_with_guard(&key(i), &guard).is_some()).count()
        });
    }
}

// =============================================================================
// Concurrent
// =============================================================================

#[divan::bench_group]
mod concurrent {
    use super::{Bencher, black_box, key, setup_tree};

    #[divan::bench(threads = [1, 2, 4, 8])]
    fn get_shared(bencher: Bencher) {
        let tree = setup_tree(10_000);
        bencher.bench(|| {
            let guard = tree.guard();
            tree.get_with_guard(black_box(&key(4_321)), &guard)
        });
    }

    #[divan::bench(threads = [1, 2, 4, 8])]
    fn overwrite_shared(bencher: Bencher) {
        let tree = setup_tree(10_000);
        bencher.bench(|| {
            let guard = tree.guard();
            tree.put_with_guard(black_box(&key(4_321)), black_box(1), &guard);
        });
    }
}
