//! Root discovery: process stack bounds and static data segment bounds.
//!
//! The original this collector is modeled on leaned on `__builtin_frame_address`
//! and linker symbols that only exist in a GCC/Linux/x86-64 world. Rust has no
//! builtin-frame-address equivalent, so stack bounds here come from the OS
//! directly — `pthread_getattr_np`/`pthread_attr_getstack` on Linux,
//! `pthread_get_stackaddr_np` on macOS — which is both more portable and more
//! accurate than a frame-address guess. Platforms with neither degrade to an
//! empty root range rather than guessing; conservative root discovery beyond
//! one descending stack and two contiguous data regions is out of scope.

/// The stack and static-data bounds captured for one collection cycle.
pub struct RootBounds {
    /// `(top, base)` of the process stack, `top < base` because the stack
    /// grows down. `None` if the OS-reported bound could not be captured.
    pub stack: Option<(usize, usize)>,
    /// `[start, end)` of the combined initialized-data + BSS segment.
    /// `(0, 0)` on platforms without linker-exposed segment symbols.
    pub data: (usize, usize),
}

impl RootBounds {
    /// Root ranges ready to hand to [`crate::scanner::scan_range`].
    pub fn ranges(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::with_capacity(2);
        if let Some((top, base)) = self.stack {
            out.push((top, base));
        }
        if self.data.0 < self.data.1 {
            out.push(self.data);
        }
        out
    }
}

/// Address of `local`, for use as the "current" (innermost) stack bound —
/// the top of the region actually live at a given scanning call site, taken
/// at the façade entry point so the collector's own frames are excluded.
#[inline(always)]
pub fn stack_top_of<T>(local: &T) -> usize {
    local as *const T as usize
}

/// Capture the OS-reported base of the current thread's stack, once, at
/// `init()`. Returns `None` (and, with `gc_logging`, logs once) if the
/// platform has no supported mechanism or the call fails.
pub fn capture_stack_base() -> Option<usize> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        if let Some(base) = unsafe { capture_stack_base_os() } {
            return Some(base);
        }
    }

    #[cfg(feature = "gc_logging")]
    tracing::warn!("could not capture OS-reported stack bounds; stack will not be scanned");
    None
}

#[cfg(target_os = "linux")]
unsafe fn capture_stack_base_os() -> Option<usize> {
    unsafe {
        let mut attr: libc::pthread_attr_t = std::mem::zeroed();
        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }

        let mut stackaddr: *mut libc::c_void = std::ptr::null_mut();
        let mut stacksize: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut stackaddr, &mut stacksize);
        libc::pthread_attr_destroy(&mut attr);

        if rc != 0 || stackaddr.is_null() {
            return None;
        }

        // pthread_attr_getstack reports the lowest address of the stack
        // region; the stack grows down from stackaddr + stacksize.
        Some(stackaddr as usize + stacksize)
    }
}

#[cfg(target_os = "macos")]
unsafe fn capture_stack_base_os() -> Option<usize> {
    unsafe {
        let base = libc::pthread_get_stackaddr_np(libc::pthread_self());
        if base.is_null() { None } else { Some(base as usize) }
    }
}

#[cfg(target_os = "linux")]
unsafe extern "C" {
    static __data_start: u8;
    static _end: u8;
}

/// `[start, end)` of the process's initialized-data + BSS segment.
#[cfg(target_os = "linux")]
pub fn data_segment_range() -> (usize, usize) {
    unsafe {
        let start = &raw const __data_start as usize;
        let end = &raw const _end as usize;
        (start, end)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn data_segment_range() -> (usize, usize) {
    #[cfg(feature = "gc_logging")]
    tracing::warn!("no linker-provided data segment symbols on this platform; static roots will not be scanned");
    (0, 0)
}
