//! Conservative root/heap scanner.
//!
//! Treats a byte range as an array of word-sized candidate pointers — no type
//! information is available or trusted, so every word in scope is tested
//! against the registry regardless of whether it actually holds a pointer.
//! Marking is driven by an explicit worklist rather than recursion: an object
//! graph built by the user can be arbitrarily deep, and this collector must
//! not blow its own stack walking it.

use crate::record::GENERATIONS;
use crate::registry::{ChunkRegistry, RecordRef};
use std::ptr;

const WORD: usize = std::mem::size_of::<usize>();

/// Scan `[start, end)` one word at a time. Every word read is treated as a
/// candidate address; any candidate covered by a record in one of the
/// `to_collect` generations is marked and queued so its own interior gets
/// scanned in turn.
///
/// # Safety
/// `[start, end)` must be a readable range of live memory for the duration
/// of the call (a process stack segment, a static data segment, or the
/// interior of a chunk already known to the registry).
pub unsafe fn scan_range(
    registry: &ChunkRegistry,
    to_collect: &[bool; GENERATIONS],
    start: usize,
    end: usize,
    worklist: &mut Vec<RecordRef>,
) {
    if start >= end {
        return;
    }

    let mut addr = start;
    while addr + WORD <= end {
        let candidate = unsafe { ptr::read_unaligned(addr as *const usize) };

        if let Some(rec) = registry.find_covering(to_collect, candidate) {
            if rec.mark() {
                worklist.push(rec);
            }
        }

        addr += WORD;
    }
}

/// Run a full mark phase: scan every root range, then drain the worklist,
/// scanning each newly-marked chunk's own interior for further pointers.
///
/// # Safety
/// Every `(start, end)` in `roots` must be a readable live memory range for
/// the duration of the call.
pub unsafe fn mark_from_roots(
    registry: &ChunkRegistry,
    to_collect: &[bool; GENERATIONS],
    roots: &[(usize, usize)],
) {
    let mut worklist = Vec::new();

    for &(start, end) in roots {
        unsafe { scan_range(registry, to_collect, start, end, &mut worklist) };
    }

    while let Some(rec) = worklist.pop() {
        unsafe { scan_range(registry, to_collect, rec.base(), rec.base() + rec.size(), &mut worklist) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChunkRegistry;

    #[test]
    fn scanning_finds_a_pointer_sitting_on_the_stack() {
        let mut registry = ChunkRegistry::new();

        let block = Box::new([0u8; 16]);
        let base = block.as_ptr() as usize;
        assert!(registry.insert(base, 16));

        // Simulate a root range containing one word: a pointer into the block.
        let root_word: usize = base + 4;
        let root_range = [root_word];
        let start = root_range.as_ptr() as usize;
        let end = start + WORD;

        let all = [true; GENERATIONS];
        unsafe { mark_from_roots(&registry, &all, &[(start, end)]) };

        let found = registry.find_covering(&all, base).unwrap();
        assert!(found.is_reachable());
    }

    #[test]
    fn unrelated_words_never_mark_anything() {
        let mut registry = ChunkRegistry::new();
        let block = Box::new([0u8; 16]);
        let base = block.as_ptr() as usize;
        registry.insert(base, 16);

        let noise: [usize; 4] = [1, 2, 3, 0xdead_beef];
        let start = noise.as_ptr() as usize;
        let end = start + noise.len() * WORD;

        let all = [true; GENERATIONS];
        unsafe { mark_from_roots(&registry, &all, &[(start, end)]) };

        let found = registry.find_covering(&all, base).unwrap();
        assert!(!found.is_reachable());
    }

    #[test]
    fn interior_pointers_into_a_chunk_reach_it() {
        let mut registry = ChunkRegistry::new();
        let block = Box::new([0u8; 64]);
        let base = block.as_ptr() as usize;
        registry.insert(base, 64);

        let interior = base + 40; // not the base address, but inside the block
        let root_range = [interior];
        let start = root_range.as_ptr() as usize;
        let end = start + WORD;

        let all = [true; GENERATIONS];
        unsafe { mark_from_roots(&registry, &all, &[(start, end)]) };

        assert!(registry.find_covering(&all, base).unwrap().is_reachable());
    }
}
