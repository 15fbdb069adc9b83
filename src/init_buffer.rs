//! The init buffer: a bump-pointer arena that satisfies allocation calls
//! arriving before the user allocator singleton has been constructed.
//!
//! This can happen on the in-process-patching variant, where
//! patches are applied at an exported entry point that the host may call
//! after the process has already allocated a handful of blocks (loader
//! bookkeeping, TLS setup). The arena is append-only from whichever thread
//! first calls it until the allocator becomes ready; after that, allocation
//! calls simply forward to the Bridge and the arena is kept only so
//! `release`/`reallocate` can recognize a pointer it handed out earlier and
//! silently drop the request — the arena itself is never freed back into.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use crate::sys;

/// Default reservation: generously larger than any footprint observed before
/// an allocator finishes constructing in practice.
pub const DEFAULT_RESERVE_SIZE: usize = 4 * 1024 * 1024;

/// A simple bump allocator over a single large virtual-memory reservation.
pub struct InitBuffer {
    start: *mut u8,
    size: usize,
    cursor: AtomicUsize,
}

impl InitBuffer {
    /// Reserves a new region of `size` bytes, rounded up to a whole number of
    /// pages.
    pub fn new(size: usize) -> Option<Self> {
        let page = sys::page_size();
        let rounded = size.div_ceil(page) * page;
        let start = unsafe { sys::allocate_region(rounded)? };
        Some(Self {
            start,
            size: rounded,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Bump-allocates `size` bytes, 16-byte aligned. Returns `None` once the
    /// reservation is exhausted — callers fall back to whatever the platform
    /// would otherwise have done (direct syscall, or simply fail).
    pub fn alloc(&self, size: usize) -> Option<*mut u8> {
        if size == 0 {
            return None;
        }
        let aligned = (size + 15) & !15;
        let offset = self.cursor.fetch_add(aligned, Ordering::SeqCst);
        if offset + aligned > self.size {
            return None;
        }
        Some(unsafe { self.start.add(offset) })
    }

    /// Whether `ptr` lies within this arena's reservation — used to silently
    /// drop `release`/`reallocate` calls against init-buffer pointers instead
    /// of forwarding them to an allocator that never produced them.
    pub fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        let start = self.start as usize;
        addr >= start && addr < start + self.size
    }

    pub fn used(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

unsafe impl Send for InitBuffer {}
unsafe impl Sync for InitBuffer {}

impl Drop for InitBuffer {
    fn drop(&mut self) {
        unsafe {
            sys::free_region(self.start, self.size);
        }
    }
}

static BUFFER: OnceLock<InitBuffer> = OnceLock::new();

/// The process-wide init buffer, created lazily on first use.
pub fn buffer() -> &'static InitBuffer {
    BUFFER.get_or_init(|| {
        InitBuffer::new(DEFAULT_RESERVE_SIZE)
            .expect("failed to reserve the init buffer's virtual memory region")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_allocates_sequentially() {
        let buf = InitBuffer::new(4096).unwrap();
        let a = buf.alloc(64).unwrap();
        let b = buf.alloc(64).unwrap();
        assert_ne!(a, b);
        assert!(buf.owns(a));
        assert!(buf.owns(b));
    }

    #[test]
    fn exhausted_arena_returns_none() {
        let buf = InitBuffer::new(4096).unwrap();
        assert!(buf.alloc(4096 * 2).is_none());
    }

    #[test]
    fn owns_is_false_outside_the_reservation() {
        let buf = InitBuffer::new(4096).unwrap();
        let outside = 0x1usize as *const u8;
        assert!(!buf.owns(outside));
    }
}
