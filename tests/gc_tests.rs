//! End-to-end scenarios against the public allocation facade.
//!
//! The facade is one global, mutex-guarded singleton, and `cleanup()`
//! permanently rejects any later `init()` in the same process — so unlike
//! a resettable test fixture, these tests never tear the collector down
//! between each other. Every test here serializes through
//! `TEST_LOCK`, initializes once (a no-op on every call after the first),
//! and is responsible for freeing or collecting away everything it
//! allocated before returning, so the next test starts from an empty
//! registry without needing a `cleanup()`/`init()` round trip.

use cairn_gc::{alloc, force_collect, free, init, print_leaks, realloc};
use std::sync::Mutex;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn with_gc<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    init(); // idempotent: a no-op if an earlier scenario already initialized it
    f()
}

/// An unrooted block, never stored anywhere reachable, is reclaimed by a
/// forced collection.
#[test]
fn simple_free_via_collector() {
    with_gc(|| {
        let ptr = alloc(64, false);
        assert!(!ptr.is_null());

        force_collect();

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("0 leaked chunk"));
    });
}

/// A block kept alive by a root on the stack survives three successive
/// forced collections, promoting nursery -> gen1 -> gen2 -> gen2 (clamped).
#[test]
fn rooted_block_survives_across_collections() {
    with_gc(|| {
        let ptr = alloc(32, false);
        assert!(!ptr.is_null());

        // Keep a pointer to the block alive on the stack across every call.
        let root: *mut u8 = ptr;
        std::hint::black_box(&root);

        for _ in 0..3 {
            force_collect();
            std::hint::black_box(&root);
        }

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("1 leaked chunk"));

        free(ptr);
    });
}

/// A root that points into the *middle* of a block, not its base address,
/// still keeps the block alive.
#[test]
fn interior_pointer_reachability() {
    with_gc(|| {
        let ptr = alloc(256, false);
        assert!(!ptr.is_null());

        let interior: *mut u8 = unsafe { ptr.add(100) };
        std::hint::black_box(&interior);

        force_collect();
        std::hint::black_box(&interior);

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("1 leaked chunk"));

        free(ptr);
    });
}

/// Two blocks pointing at each other, kept alive by one root into the
/// cycle, are both retained; once the root is dropped, both are collected.
#[test]
fn cyclic_graph_collection() {
    with_gc(|| {
        let a = alloc(std::mem::size_of::<usize>(), false);
        let b = alloc(std::mem::size_of::<usize>(), false);
        assert!(!a.is_null() && !b.is_null());

        unsafe {
            (a as *mut usize).write(b as usize);
            (b as *mut usize).write(a as usize);
        }

        {
            let root: *mut u8 = a;
            std::hint::black_box(&root);
            force_collect();
            std::hint::black_box(&root);
        }

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("2 leaked chunk"));

        // No root into the cycle anymore; both members are now garbage.
        force_collect();

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("0 leaked chunk"));
    });
}

/// Growing a block with `realloc` keeps it tracked under its new address.
#[test]
fn realloc_preserves_trackedness() {
    with_gc(|| {
        let ptr = alloc(16, false);
        assert!(!ptr.is_null());

        let grown = realloc(ptr, 4096);
        assert!(!grown.is_null());

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("1 leaked chunk"));

        free(grown);
    });
}

/// `realloc` re-registers its result in generation 0, even if the original
/// block had been promoted to an older generation — a resize is treated as
/// a fresh allocation for promotion purposes, matching the reference
/// implementation's `table_insert`.
#[test]
fn realloc_resets_generation_to_zero() {
    with_gc(|| {
        let ptr = alloc(16, false);
        assert!(!ptr.is_null());

        let root: *mut u8 = ptr;
        for _ in 0..2 {
            std::hint::black_box(&root);
            force_collect();
        }
        std::hint::black_box(&root);

        let mut before = Vec::new();
        print_leaks(&mut before).unwrap();
        let before = String::from_utf8(before).unwrap();
        assert!(before.contains("gen 2"), "expected the block promoted to gen 2: {before}");

        let moved = realloc(ptr, 32);
        assert!(!moved.is_null());

        let mut after = Vec::new();
        print_leaks(&mut after).unwrap();
        let after = String::from_utf8(after).unwrap();
        assert!(after.contains("gen 0"), "realloc should reset to gen 0: {after}");
        assert!(!after.contains("gen 2"));

        free(moved);
    });
}

/// Zero-size requests and a degenerate `realloc(null, 0)` never return a
/// usable pointer, and never panic.
#[test]
fn zero_size_and_degenerate_calls_are_handled() {
    with_gc(|| {
        assert!(alloc(0, false).is_null());
        assert!(realloc(std::ptr::null_mut(), 0).is_null());

        let ptr = alloc(8, false);
        assert!(realloc(ptr, 0).is_null()); // shrinking to zero frees it

        let mut report = Vec::new();
        print_leaks(&mut report).unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.contains("0 leaked chunk"));
    });
}

