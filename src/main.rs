//! Concurrent load driver for `FourTree`.
//!
//! Inserts disjoint key ranges from several threads, verifies every key,
//! and prints timings and the resulting tree shape.
//!
//! ```bash
//! cargo run --release -- [threads] [keys_per_thread]
//! FOURTREE_KEY_WIDTH=8 cargo run --release -- 8 100000
//! ```
//!
//! Runs with at most 64 keys also dump the tree.

#![allow(clippy::cast_precision_loss)]

use std::env;
use std::io;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use fourtree::{FourTree, TreeConfig};

const DEFAULT_THREADS: usize = 4;
const DEFAULT_KEYS_PER_THREAD: usize = 10_000;
const DUMP_LIMIT: usize = 64;

/// Odd multiplier: a bijection on `u64`, so mixed keys stay distinct while
/// arriving in scrambled order.
const MIX: u64 = 0x9e37_79b9_7f4a_7c15;

fn key_for(n: u64) -> [u8; 8] {
    n.wrapping_mul(MIX).to_be_bytes()
}

fn parse_arg(index: usize, default: usize) -> Result<usize, String> {
    env::args().nth(index).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|_| format!("argument {index}: expected a number, got {raw:?}"))
    })
}

fn throughput(ops: usize, elapsed: Duration) -> f64 {
    ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / 1e6
}

fn total_keys(threads: usize, per_thread: usize) -> Result<usize, String> {
    threads
        .checked_mul(per_thread)
        .filter(|&total| u64::try_from(total).is_ok())
        .ok_or_else(|| format!("{threads} threads x {per_thread} keys overflows"))
}

fn run() -> Result<(), String> {
    let threads: usize = parse_arg(1, DEFAULT_THREADS)?.max(1);
    let per_thread: usize = parse_arg(2, DEFAULT_KEYS_PER_THREAD)?;
    let total: usize = total_keys(threads, per_thread)?;

    let config: TreeConfig = TreeConfig::from_env().map_err(|e| e.to_string())?;
    let tree: FourTree<u64> = FourTree::with_config(config).map_err(|e| e.to_string())?;
    if tree.key_width() < 8 {
        return Err(format!("key width {} is too small for 8-byte demo keys", tree.key_width()));
    }

    println!("{}: {threads} threads x {per_thread} keys", FourTree::<u64>::name());

    let start = Instant::now();
    thread::scope(|s| {
        for t in 0..threads {
            let tree = &tree;
            s.spawn(move || {
                let guard = tree.guard();
                for i in 0..per_thread {
                    let n = (t * per_thread + i) as u64;
                    tree.put_with_guard(&key_for(n), n, &guard);
                }
            });
        }
    });
    let put_time = start.elapsed();

    let start = Instant::now();
    let missing: usize = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let tree = &tree;
                s.spawn(move || {
                    let guard = tree.guard();
                    (0..per_thread)
                        .filter(|i| {
                            let n = (t * per_thread + i) as u64;
                            tree.get_with_guard(&key_for(n), &guard).as_deref() != Some(&n)
                        })
                        .count()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap_or(per_thread)).sum()
    });
    let get_time = start.elapsed();

    println!("put: {put_time:?} ({:.2} Mops/s)", throughput(total, put_time));
    println!("get: {get_time:?} ({:.2} Mops/s)", throughput(total, get_time));

    let stats = tree.stats();
    println!(
        "len={} nodes={} max_depth={}",
        tree.len(),
        stats.nodes,
        stats.max_depth
    );

    if total <= DUMP_LIMIT {
        tree.print(&mut io::stdout().lock()).map_err(|e| e.to_string())?;
    }

    tree.check_invariants().map_err(|e| e.to_string())?;
    if missing > 0 || tree.len() != total {
        return Err(format!("{missing} keys missing or wrong, len {} != {total}", tree.len()));
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
