//! Public allocation facade: the only surface most callers ever touch.
//!
//! Every function here is infallible at the boundary — failure shows up as
//! a null pointer or a silent no-op, never a panic or an abort.
//! Internally it's a single global, mutex-guarded collector instance; this
//! crate makes no attempt at thread safety beyond "don't corrupt memory if
//! called from two threads" — true concurrency is out of scope.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::collector::GenerationalCollector;
use crate::config::GcConfig;
use crate::registry::ChunkRegistry;
use crate::roots::{self, RootBounds};
use crate::sys_alloc;

struct GcState {
    registry: ChunkRegistry,
    collector: GenerationalCollector,
    stack_base: Option<usize>,
}

/// The collector's lifecycle: uninitialized, ready, or torn down.
///
/// Tracked as a three-way enum rather than `Option<GcState>` so that
/// "never initialized" and "cleaned up" are distinguishable states: once
/// cleanup has run, `init` must stay rejected rather than quietly behaving
/// as if this were the first call again, matching the original's
/// `g_init || g_cleanup` guard (`examples/original_source/src/gclib.c`'s
/// `gclib_init`).
enum GcLifecycle {
    Uninit,
    Ready(GcState),
    Cleaned,
}

static GC: OnceLock<Mutex<GcLifecycle>> = OnceLock::new();

fn lock() -> MutexGuard<'static, GcLifecycle> {
    GC.get_or_init(|| Mutex::new(GcLifecycle::Uninit))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize the collector with default tuning.
/// A no-op if already initialized, and permanently rejected once
/// [`cleanup`] has run — there is no re-initializing after cleanup.
pub fn init() {
    init_with_config(GcConfig::default());
}

/// Initialize the collector with an explicit configuration.
///
/// A no-op if already initialized, and permanently rejected once
/// [`cleanup`] has run.
pub fn init_with_config(config: GcConfig) {
    let mut guard = lock();
    if !matches!(*guard, GcLifecycle::Uninit) {
        return;
    }
    *guard = GcLifecycle::Ready(GcState {
        registry: ChunkRegistry::new(),
        collector: GenerationalCollector::new(config),
        stack_base: roots::capture_stack_base(),
    });
}

/// True once [`init`] has run and [`cleanup`] has not yet torn it down.
pub fn ready() -> bool {
    matches!(*lock(), GcLifecycle::Ready(_))
}

/// Release every tracked block and tear down collector state.
///
/// Does not run a final collection first: cleanup means the program is
/// exiting, not "tell me what's still reachable" — that's [`print_leaks`]'s
/// job, called beforehand if the caller wants it. A no-op unless the
/// collector is currently [`ready`] — in particular, calling `cleanup`
/// before any `init` leaves the lifecycle at `Uninit`, not `Cleaned`, so a
/// later `init` still succeeds (matching the original's `gclib_ready()`
/// guard at the top of `gclib_cleanup`). Once `cleanup` does run, the
/// lifecycle moves to `Cleaned` permanently: any later [`init`] is rejected.
pub fn cleanup() {
    let mut guard = lock();
    if !matches!(*guard, GcLifecycle::Ready(_)) {
        return;
    }
    let GcLifecycle::Ready(mut state) = std::mem::replace(&mut *guard, GcLifecycle::Cleaned) else {
        unreachable!("just checked above that the lifecycle is Ready");
    };
    state.registry.drain_all(|base, size| unsafe {
        sys_alloc::release(base as *mut u8, size);
    });
}

fn current_roots(state: &GcState, stack_top: usize) -> RootBounds {
    let stack = state
        .stack_base
        .filter(|&base| stack_top < base)
        .map(|base| (stack_top, base));
    RootBounds {
        stack,
        data: roots::data_segment_range(),
    }
}

/// Allocate `size` bytes, zero-filled if `zeroed`.
///
/// Returns null for a `size` of `0`, before [`init`], or if the block could
/// not be obtained even after a forced collection freed what it could. The
/// threshold-gated collection at the start of the call runs regardless of
/// `size` — there's no size exception, so a caller that only ever makes
/// zero-size requests must not be able to dodge it forever.
pub fn alloc(size: usize, zeroed: bool) -> *mut u8 {
    let stack_top_marker = 0u8;
    let stack_top = roots::stack_top_of(&stack_top_marker);

    let mut guard = lock();
    let GcLifecycle::Ready(state) = &mut *guard else {
        return std::ptr::null_mut();
    };

    if state.collector.should_collect(&state.registry) {
        let bounds = current_roots(state, stack_top);
        unsafe { state.collector.collect(&mut state.registry, &bounds, false) };
    }

    if size == 0 {
        return std::ptr::null_mut();
    }

    let raw = raw_alloc(zeroed, size);
    let raw = if raw.is_null() {
        // System allocator under pressure: force a collection and retry
        // once before giving up.
        let bounds = current_roots(state, stack_top);
        unsafe { state.collector.collect(&mut state.registry, &bounds, true) };
        raw_alloc(zeroed, size)
    } else {
        raw
    };

    if raw.is_null() {
        return std::ptr::null_mut();
    }

    if !state.registry.insert(raw as usize, size) {
        #[cfg(feature = "gc_logging")]
        tracing::warn!(size, "chunk registry bookkeeping allocation failed; returning an untracked block");
    }

    raw
}

fn raw_alloc(zeroed: bool, size: usize) -> *mut u8 {
    if zeroed { sys_alloc::alloc_zeroed(size) } else { sys_alloc::alloc(size) }
}

/// Resize a block previously returned by [`alloc`] or [`realloc`].
///
/// `ptr == null` behaves like [`alloc`]; `new_size == 0` behaves like
/// [`free`]. A successful resize re-registers the block in generation 0,
/// same as a fresh allocation — it is not given any credit for its
/// predecessor's age. This matches the reference implementation's
/// `table_insert`, which always links a realloc'd block into generation 0
/// rather than trying to preserve its old generation.
///
/// The threshold-gated collection at the start of the call runs regardless
/// of `new_size`, same as [`alloc`] — no size exception, so a
/// `new_size == 0` ("acts as free") call still triggers a collection before
/// it does anything else.
pub fn realloc(ptr: *mut u8, new_size: usize) -> *mut u8 {
    if ptr.is_null() {
        return alloc(new_size, false);
    }

    let stack_top_marker = 0u8;
    let stack_top = roots::stack_top_of(&stack_top_marker);

    let mut guard = lock();
    let GcLifecycle::Ready(state) = &mut *guard else {
        return std::ptr::null_mut();
    };

    if state.collector.should_collect(&state.registry) {
        let bounds = current_roots(state, stack_top);
        unsafe { state.collector.collect(&mut state.registry, &bounds, false) };
    }

    if new_size == 0 {
        if let Some((_, size)) = state.registry.remove(ptr as usize) {
            unsafe { sys_alloc::release(ptr, size) };
        }
        return std::ptr::null_mut();
    }

    let Some((_, old_size)) = state.registry.lookup(ptr as usize) else {
        return std::ptr::null_mut();
    };

    // The old block stays tracked under its current address while we
    // attempt the resize, including through a forced retry collection, so
    // a GC triggered here can't mistake it for garbage.
    let mut new_ptr = unsafe { sys_alloc::resize(ptr, old_size, new_size) };
    if new_ptr.is_null() {
        // Resize under pressure: force a collection and retry once before
        // giving up, same as a fresh `alloc`.
        let bounds = current_roots(state, stack_top);
        unsafe { state.collector.collect(&mut state.registry, &bounds, true) };
        new_ptr = unsafe { sys_alloc::resize(ptr, old_size, new_size) };
    }

    if new_ptr.is_null() {
        // realloc(3) semantics: on definitive failure the original block is
        // untouched and still owned by the caller, so it stays tracked
        // exactly as it was.
        return std::ptr::null_mut();
    }

    state.registry.remove(ptr as usize);
    if !state.registry.insert(new_ptr as usize, new_size) {
        #[cfg(feature = "gc_logging")]
        tracing::warn!(new_size, "chunk registry bookkeeping allocation failed on realloc; returning an untracked block");
    }

    new_ptr
}

/// Free a block previously returned by [`alloc`] or [`realloc`]. A no-op on
/// null or on a pointer this collector isn't tracking (double free is
/// silently ignored, not undefined behavior, at this boundary).
pub fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let mut guard = lock();
    let GcLifecycle::Ready(state) = &mut *guard else {
        return;
    };
    if let Some((_, size)) = state.registry.remove(ptr as usize) {
        unsafe { sys_alloc::release(ptr, size) };
    }
}

/// Run a collection only if some generation has crossed its byte threshold.
pub fn collect() {
    let stack_top_marker = 0u8;
    let stack_top = roots::stack_top_of(&stack_top_marker);

    let mut guard = lock();
    let GcLifecycle::Ready(state) = &mut *guard else {
        return;
    };
    if state.collector.should_collect(&state.registry) {
        let bounds = current_roots(state, stack_top);
        unsafe { state.collector.collect(&mut state.registry, &bounds, false) };
    }
}

/// Run a collection unconditionally, ignoring generation thresholds.
pub fn force_collect() {
    let stack_top_marker = 0u8;
    let stack_top = roots::stack_top_of(&stack_top_marker);

    let mut guard = lock();
    let GcLifecycle::Ready(state) = &mut *guard else {
        return;
    };
    let bounds = current_roots(state, stack_top);
    unsafe { state.collector.collect(&mut state.registry, &bounds, true) };
}

/// Write one line per currently-tracked block to `sink`, followed by a
/// totals line. Intended for leak hunting at shutdown, before [`cleanup`].
pub fn print_leaks(mut sink: impl Write) -> io::Result<()> {
    let guard = lock();
    let GcLifecycle::Ready(state) = &*guard else {
        return Ok(());
    };

    let mut total_bytes = 0usize;
    let mut total_chunks = 0usize;
    let mut write_err = None;

    state.registry.enumerate(|generation, rec| {
        total_bytes += rec.size();
        total_chunks += 1;
        if write_err.is_none() {
            if let Err(e) = writeln!(sink, "0x{:012x} {:>8} bytes  gen {}", rec.base(), rec.size(), generation) {
                write_err = Some(e);
            }
        }
    });

    if let Some(e) = write_err {
        return Err(e);
    }
    writeln!(sink, "{total_chunks} leaked chunk(s), {total_bytes} byte(s) total")
}
