//! Feature-gated logging macros.
//!
//! With the `tracing` feature these forward to the `tracing` crate. Without
//! it they expand to nothing, so hot paths carry no logging cost.
//!
//! ```bash
//! # Node attach events from a stress run
//! RUST_LOG=fourtree::tree=debug cargo test --features tracing --test stress_tests
//!
//! # Every lock retry on the write path
//! RUST_LOG=fourtree::cursor=trace cargo test --features tracing
//! ```
//!
//! Field syntax is `tracing`'s (`key = %key`, `slot`, ...). Arguments are
//! not evaluated when the feature is off.

#![allow(unused_macros, unused_imports)]

/// Trace-level logging. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Debug-level logging. No-op without the `tracing` feature.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
