//! # cairn-gc
//!
//! Conservative, generational, tracing garbage collector for untyped heap
//! allocations. A drop-in replacement for `malloc`/`realloc`/`free`: callers
//! hand it raw byte counts and get back raw pointers, and the collector
//! scans the process stack and static data segment for anything that looks
//! like a pointer into memory it manages.
//!
//! ## Design
//!
//! - **Chunk registry**: hash-bucketed bookkeeping of every live block, kept
//!   in one of three generations (nursery .. tenured).
//! - **Conservative scanner**: word-granularity scan of a byte range; every
//!   word is tested as a candidate pointer, no type information required or
//!   trusted.
//! - **Generational collector**: each cycle selects which generations
//!   participate (by threshold, or all of them when forced), traces roots
//!   and chunk interiors scoped to that selection, then sweeps it
//!   reverse (oldest-first) so a chunk promoted this cycle is never swept
//!   twice.
//!
//! Single-threaded, stop-the-world, non-compacting. See each module's docs
//! for the rest.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod facade;
pub mod record;
pub mod registry;
pub mod roots;
pub mod scanner;
pub mod sys_alloc;

pub use collector::{GcStats, GenerationalCollector};
pub use config::{ConfigError, GcConfig};
pub use facade::{alloc, cleanup, collect, force_collect, free, init, init_with_config, print_leaks, ready, realloc};
