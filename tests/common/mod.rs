//! Shared test setup: tracing to the console and to an NDJSON file.
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//! }
//! ```
//!
//! Library events only appear with `--features tracing`.
//!
//! # Environment
//!
//! - `RUST_LOG`: filter directives, e.g. `fourtree=debug,fourtree::cursor=trace`
//! - `FOURTREE_LOG_DIR`: log directory (default `logs/`)
//! - `FOURTREE_LOG_CONSOLE`: `0` disables console output
//!
//! Events land in `logs/fourtree.jsonl`, one JSON object per line:
//!
//! ```bash
//! jq 'select(.fields.message == "attached child node")' logs/fourtree.jsonl
//! ```

#![allow(dead_code)]

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, Once};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const LOG_FILE: &str = "fourtree.jsonl";

static INIT: Once = Once::new();

/// Install the subscriber once per test binary. Later calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(install);
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
}

#[expect(clippy::expect_used)]
fn install() {
    let log_dir: PathBuf = env::var("FOURTREE_LOG_DIR").map_or_else(|_| PathBuf::from("logs"), PathBuf::from);
    let console: bool = env::var("FOURTREE_LOG_CONSOLE").map_or(true, |v| v != "0");

    std::fs::create_dir_all(&log_dir).expect("create log directory");

    // Append: each test binary runs in its own process.
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))
        .expect("open log file");

    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_target(true)
            .with_line_number(true)
            .compact()
            .with_filter(filter())
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_thread_ids(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(filter());

    let _ = Registry::default().with(console_layer).with(file_layer).try_init();
}
