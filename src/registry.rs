//! Chunk registry: per-generation, hash-bucketed set of live chunk records.
//!
//! Records are owned by the registry through a narrow unsafe boundary — they
//! are allocated and freed with `std::alloc` directly rather than through
//! `Box`, because record allocation must be able to *fail* (return null)
//! without aborting the process the way an infallible `Box::new` would.
//! Everything above this module sees only safe, `&`/`&mut` APIs.

use std::alloc::{Layout, alloc, dealloc};
use std::cell::Cell;
use std::ptr;

use crate::record::GENERATIONS;

/// Number of buckets per generation table.
pub const HASH_TABLE_SIZE: usize = 1024;

/// Bookkeeping entry for one live chunk, heap-allocated and linked into a
/// single bucket chain. Never exposed outside this module as an owned value —
/// callers see `base`/`size`/`generation`/mark state through accessor methods.
#[repr(C)]
struct Node {
    base: usize,
    size: usize,
    reachable: Cell<bool>,
    generation: u8,
    next: *mut Node,
}

fn node_layout() -> Layout {
    Layout::new::<Node>()
}

/// Avalanche-mix a raw address down to a bucket index.
///
/// Two multiply-xor-shift rounds plus a final shift-xor (the splitmix64
/// finalizer) — deterministic and identical for the same address on every
/// call, which the registry's correctness depends on.
#[inline]
pub fn hash_addr(addr: usize) -> usize {
    let mut v = addr as u64;
    v = (v ^ (v >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    v = (v ^ (v >> 27)).wrapping_mul(0x94d049bb133111eb);
    v ^= v >> 31;
    (v % HASH_TABLE_SIZE as u64) as usize
}

/// A non-owning reference to a record, valid only for the duration of the
/// call that produced it (scanning/enumeration). Carries no lifetime because
/// the registry is always accessed through a single global lock; see
/// `crate::facade`.
#[derive(Clone, Copy)]
pub struct RecordRef {
    ptr: *const Node,
}

impl RecordRef {
    #[inline]
    pub fn base(&self) -> usize {
        unsafe { (*self.ptr).base }
    }

    #[inline]
    pub fn size(&self) -> usize {
        unsafe { (*self.ptr).size }
    }

    #[inline]
    pub fn generation(&self) -> u8 {
        unsafe { (*self.ptr).generation }
    }

    #[inline]
    pub fn is_reachable(&self) -> bool {
        unsafe { (*self.ptr).reachable.get() }
    }

    #[inline]
    pub fn covers(&self, addr: usize) -> bool {
        let base = self.base();
        addr >= base && addr < base + self.size()
    }

    /// Mark this record reachable. Idempotent — the scanner relies on this
    /// to detect whether a record is being visited for the first time.
    ///
    /// Returns `true` if this call transitioned the record from unreachable
    /// to reachable (i.e. the caller should recurse into its interior).
    #[inline]
    pub fn mark(&self) -> bool {
        unsafe {
            let node = &*self.ptr;
            if node.reachable.get() {
                false
            } else {
                node.reachable.set(true);
                true
            }
        }
    }
}

/// The chunk registry: `GENERATIONS` hash tables of `HASH_TABLE_SIZE` buckets.
pub struct ChunkRegistry {
    tables: [Vec<*mut Node>; GENERATIONS],
    bytes: [usize; GENERATIONS],
}

// SAFETY: the registry is only ever reached through `facade::Gc`'s single
// global `Mutex`; no two threads observe it concurrently.
unsafe impl Send for ChunkRegistry {}

impl ChunkRegistry {
    /// Build an empty registry: `GENERATIONS` tables of `HASH_TABLE_SIZE`
    /// empty buckets and zeroed per-generation byte counters.
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| vec![ptr::null_mut(); HASH_TABLE_SIZE]),
            bytes: [0; GENERATIONS],
        }
    }

    /// Bytes currently tracked in generation `g`.
    #[inline]
    pub fn bytes(&self, g: usize) -> usize {
        self.bytes[g]
    }

    /// Insert a new generation-0 record for `base`/`size`.
    ///
    /// Returns `false` if the internal record allocation failed — this is
    /// non-fatal: the caller's block is handed back to the user untracked
    /// rather than the process aborting.
    pub fn insert(&mut self, base: usize, size: usize) -> bool {
        self.insert_at(base, size, 0)
    }

    /// Insert a record directly into generation `generation`, bypassing the
    /// nursery. Used by `facade::realloc` to re-track a block under its
    /// original generation on a failed resize (the block never moved, so
    /// its generation shouldn't change either), and by tests that need to
    /// seed a non-nursery generation directly.
    pub fn insert_at(&mut self, base: usize, size: usize, generation: u8) -> bool {
        debug_assert!(size > 0, "zero-sized allocations must never be recorded");
        let g = generation as usize;

        let node_ptr = unsafe {
            let raw = alloc(node_layout()) as *mut Node;
            if raw.is_null() {
                return false;
            }
            ptr::write(
                raw,
                Node {
                    base,
                    size,
                    reachable: Cell::new(false),
                    generation,
                    next: ptr::null_mut(),
                },
            );
            raw
        };

        let idx = hash_addr(base);
        unsafe {
            (*node_ptr).next = self.tables[g][idx];
        }
        self.tables[g][idx] = node_ptr;
        self.bytes[g] += size;
        true
    }

    /// Look up the `(generation, size)` of the record for `base`, searching
    /// every generation, without removing it. Used by `realloc` to learn the
    /// old size before resizing while keeping the block tracked in case a
    /// retry collection runs before the resize succeeds.
    pub fn lookup(&self, base: usize) -> Option<(u8, usize)> {
        let idx = hash_addr(base);
        for g in 0..GENERATIONS {
            let mut cur = self.tables[g][idx];
            while !cur.is_null() {
                let node = unsafe { &*cur };
                if node.base == base {
                    return Some((node.generation, node.size));
                }
                cur = node.next;
            }
        }
        None
    }

    /// Remove and destroy the record for `base`, searching every generation
    /// (a tracked block may have been promoted away from generation 0).
    ///
    /// Returns the record's former `(generation, size)` if one was found.
    pub fn remove(&mut self, base: usize) -> Option<(u8, usize)> {
        let idx = hash_addr(base);
        for g in 0..GENERATIONS {
            let mut prev: *mut Node = ptr::null_mut();
            let mut cur = self.tables[g][idx];
            while !cur.is_null() {
                let node = unsafe { &*cur };
                if node.base == base {
                    let next = node.next;
                    let size = node.size;
                    let generation = node.generation;
                    unlink(&mut self.tables[g][idx], prev, cur, next);
                    self.bytes[g] -= size;
                    unsafe {
                        ptr::drop_in_place(cur);
                        dealloc(cur as *mut u8, node_layout());
                    }
                    return Some((generation, size));
                }
                prev = cur;
                cur = node.next;
            }
        }
        None
    }

    /// Find the (at most one) record in any of the selected generations whose
    /// `[base, base+size)` covers `addr`.
    ///
    /// This is the baseline lookup strategy: a full linear scan of every
    /// record in the selected generations, because an interior pointer
    /// cannot be hashed back to the base address it was derived from.
    /// `insert`/`remove` still use direct hashing on the known base — only
    /// interior-pointer lookups pay the linear cost.
    pub fn find_covering(&self, to_collect: &[bool; GENERATIONS], addr: usize) -> Option<RecordRef> {
        for g in 0..GENERATIONS {
            if !to_collect[g] {
                continue;
            }
            for &head in &self.tables[g] {
                let mut cur = head;
                while !cur.is_null() {
                    let node = unsafe { &*cur };
                    if addr >= node.base && addr < node.base + node.size {
                        return Some(RecordRef { ptr: cur });
                    }
                    cur = node.next;
                }
            }
        }
        None
    }

    /// Clear every mark bit across all generations. Called at the start of a
    /// mark phase so a record's reachability from a previous cycle can never
    /// leak into the next.
    pub fn clear_marks(&self) {
        for g in 0..GENERATIONS {
            for &head in &self.tables[g] {
                let mut cur = head;
                while !cur.is_null() {
                    let node = unsafe { &*cur };
                    node.reachable.set(false);
                    cur = node.next;
                }
            }
        }
    }

    /// Sweep generation `g`: release every unmarked record, promote every
    /// marked one to `g + 1` (clamped at `GENERATIONS - 1`) and clear its
    /// mark. `release` is called with `(base, size)` for every freed block —
    /// it is expected to hand the block back to the system allocator.
    ///
    /// Generations MUST be swept from `GENERATIONS - 1` down to `0` by the
    /// caller so a block promoted into `g + 1` during this cycle is not
    /// revisited and double-promoted.
    pub fn sweep_generation(&mut self, g: usize, mut release: impl FnMut(usize, usize)) -> usize {
        let promote = g < GENERATIONS - 1;
        let mut reclaimed = 0usize;

        for idx in 0..HASH_TABLE_SIZE {
            let mut prev: *mut Node = ptr::null_mut();
            let mut cur = self.tables[g][idx];

            while !cur.is_null() {
                let node = unsafe { &*cur };
                let next = node.next;

                if node.reachable.get() {
                    node.reachable.set(false);

                    if promote {
                        let size = node.size;
                        unlink(&mut self.tables[g][idx], prev, cur, next);
                        self.bytes[g] -= size;

                        let new_gen = g + 1;
                        unsafe {
                            (*cur).generation = new_gen as u8;
                            let new_idx = hash_addr((*cur).base);
                            (*cur).next = self.tables[new_gen][new_idx];
                            self.tables[new_gen][new_idx] = cur;
                        }
                        self.bytes[new_gen] += size;

                        cur = next;
                        continue;
                    }

                    prev = cur;
                    cur = next;
                } else {
                    let base = node.base;
                    let size = node.size;
                    unlink(&mut self.tables[g][idx], prev, cur, next);
                    self.bytes[g] -= size;
                    reclaimed += size;

                    release(base, size);
                    unsafe {
                        ptr::drop_in_place(cur);
                        dealloc(cur as *mut u8, node_layout());
                    }

                    cur = next;
                }
            }
        }

        reclaimed
    }

    /// Visit every live record, grouped by generation, for diagnostics.
    pub fn enumerate(&self, mut visitor: impl FnMut(usize, RecordRef)) {
        for g in 0..GENERATIONS {
            for &head in &self.tables[g] {
                let mut cur = head;
                while !cur.is_null() {
                    visitor(g, RecordRef { ptr: cur });
                    cur = unsafe { (*cur).next };
                }
            }
        }
    }

    /// Release every tracked block and free every record, across all
    /// generations. Used by `cleanup` (cleanup unconditionally drains, it does not run a final collection first).
    pub fn drain_all(&mut self, mut release: impl FnMut(usize, usize)) {
        for g in 0..GENERATIONS {
            for head in self.tables[g].iter_mut() {
                let mut cur = *head;
                *head = ptr::null_mut();
                while !cur.is_null() {
                    let next = unsafe { (*cur).next };
                    let (base, size) = unsafe { ((*cur).base, (*cur).size) };
                    release(base, size);
                    unsafe {
                        ptr::drop_in_place(cur);
                        dealloc(cur as *mut u8, node_layout());
                    }
                    cur = next;
                }
            }
            self.bytes[g] = 0;
        }
    }
}

impl Default for ChunkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkRegistry {
    fn drop(&mut self) {
        // Defensive: a well-behaved caller always goes through `cleanup()`
        // (facade) which calls `drain_all`, but if the registry is dropped
        // directly (e.g. in a unit test) it must not leak its own node
        // allocations even though the user blocks they describe are leaked.
        for g in 0..GENERATIONS {
            for head in self.tables[g].iter_mut() {
                let mut cur = *head;
                while !cur.is_null() {
                    let next = unsafe { (*cur).next };
                    unsafe {
                        ptr::drop_in_place(cur);
                        dealloc(cur as *mut u8, node_layout());
                    }
                    cur = next;
                }
            }
        }
    }
}

/// Unlink `cur` (whose predecessor is `prev`, possibly null for "head") from
/// `head`, replacing it with `next`.
#[inline]
fn unlink(head: &mut *mut Node, prev: *mut Node, cur: *mut Node, next: *mut Node) {
    debug_assert!(!cur.is_null());
    if prev.is_null() {
        *head = next;
    } else {
        unsafe {
            (*prev).next = next;
        }
    }
}
