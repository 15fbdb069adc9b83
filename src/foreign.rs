//! Foreign-pointer classification.
//!
//! Only the in-process-patching variant (Windows) needs this: the
//! strong-symbol-alias and interpose-section variants install before the
//! process can have allocated anything through the system allocator, so every
//! pointer they ever see is either null or one the Bridge produced. The
//! in-process-patching variant attaches after the process may already hold
//! pointers from the original allocator, so those must be recognized and
//! handled as foreign: dropped on release, copied-but-not-freed on
//! reallocate, reported as size zero on query.
//!
//! Classification is performed fresh on every call, never cached: the same
//! address may later be reused for an owned allocation, so a stale "this was
//! foreign" verdict would be wrong.

use crate::init_buffer;
use crate::sys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Produced by the Bridge (or the init buffer, which behaves like an
    /// owned-but-unreleasable sub-case — see `release_or_drop`).
    Owned,
    /// Predates interposition, or is otherwise not recognizable as ours.
    Foreign,
}

/// Classify `ptr` for the in-process-patching variant. Owned pointers are
/// whatever the allocator's own `size_of` can account for; everything else
/// falls through to the residency probe as a last resort to avoid touching
/// unmapped memory.
pub fn classify<A: crate::contract::Allocator>(allocator: &A, ptr: *mut u8) -> Provenance {
    if ptr.is_null() {
        return Provenance::Owned;
    }
    if init_buffer::buffer().owns(ptr) {
        return Provenance::Owned;
    }
    if allocator.size_of(ptr) > 0 {
        return Provenance::Owned;
    }
    if unsafe { sys::probe_mapped(ptr) } {
        // Mapped, but the allocator doesn't recognize it: most likely a
        // pointer that predates interposition.
        tracing_unavailable_foreign();
        Provenance::Foreign
    } else {
        Provenance::Foreign
    }
}

#[cfg(feature = "tracing")]
fn tracing_unavailable_foreign() {
    tracing::trace!("classified pointer as foreign via residency probe");
}

#[cfg(not(feature = "tracing"))]
fn tracing_unavailable_foreign() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::Allocator;

    struct NullAllocator;
    unsafe impl Allocator for NullAllocator {
        fn allocate(&self, _size: usize) -> *mut u8 {
            std::ptr::null_mut()
        }
        fn release(&self, _ptr: *mut u8) {}
        fn aligned_allocate(&self, _align: usize, _size: usize) -> *mut u8 {
            std::ptr::null_mut()
        }
        fn size_of(&self, _ptr: *mut u8) -> usize {
            0
        }
        fn lock(&self) {}
        fn unlock(&self) {}
    }

    #[test]
    fn null_is_owned() {
        let a = NullAllocator;
        assert_eq!(classify(&a, std::ptr::null_mut()), Provenance::Owned);
    }

    #[test]
    fn init_buffer_pointer_is_owned() {
        let a = NullAllocator;
        let ptr = init_buffer::buffer().alloc(16).unwrap();
        assert_eq!(classify(&a, ptr), Provenance::Owned);
    }

    #[test]
    fn stack_address_unknown_to_allocator_is_foreign() {
        let a = NullAllocator;
        let on_stack = 0u64;
        let ptr = &on_stack as *const u64 as *mut u8;
        // The allocator reports size 0 for everything, and the stack address
        // is mapped but not init-buffer-owned, so it lands in `Foreign`.
        assert_eq!(classify(&a, ptr), Provenance::Foreign);
    }
}
