//! The Bridge Layer: the single point of indirection any platform
//! interceptor calls into. `Bridge` itself holds no state — it is a
//! zero-sized, generic forwarder — so storage of the actual allocator
//! singleton is the concern of [`Singleton`], not this type.

use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::contract::Allocator;
use crate::readiness::READY;

/// Zero-sized generic forwarder from the eight canonical operations to a
/// concrete `A: Allocator`. Every platform interceptor and uniform-semantics
/// wrapper goes through here; nothing else is allowed to call `A` directly.
pub struct Bridge<A: Allocator>(PhantomData<A>);

impl<A: Allocator> Bridge<A> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }

    #[inline]
    pub fn allocate(&self, allocator: &A, size: usize) -> *mut u8 {
        allocator.allocate(size)
    }

    #[inline]
    pub fn release(&self, allocator: &A, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        allocator.release(ptr)
    }

    #[inline]
    pub fn aligned_allocate(&self, allocator: &A, align: usize, size: usize) -> *mut u8 {
        allocator.aligned_allocate(align, size)
    }

    #[inline]
    pub fn usable_size(&self, allocator: &A, ptr: *mut u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        allocator.size_of(ptr)
    }

    #[inline]
    pub fn lock(&self, allocator: &A) {
        allocator.lock()
    }

    #[inline]
    pub fn unlock(&self, allocator: &A) {
        allocator.unlock()
    }

    /// `reallocate`, forwarding to a native implementation when the allocator
    /// has one, otherwise synthesizing it from `allocate`/`release`/`size_of`
    /// with the shrink-threshold rule.
    pub fn reallocate(&self, allocator: &A, ptr: *mut u8, size: usize) -> *mut u8 {
        if let Some(native) = allocator.reallocate(ptr, size) {
            return native;
        }

        if ptr.is_null() {
            return self.allocate(allocator, size);
        }
        if size == 0 {
            self.release(allocator, ptr);
            return std::ptr::null_mut();
        }

        let old_size = self.usable_size(allocator, ptr);

        // Shrink-threshold: keep the same pointer when shrinking by at most
        // half, both to avoid churn and to preserve identity for the common
        // "shrink a little" case.
        if size <= old_size && size > old_size / 2 {
            return ptr;
        }

        let new_ptr = self.allocate(allocator, size);
        if new_ptr.is_null() {
            // Allocation failed: the original pointer is still live, untouched.
            return std::ptr::null_mut();
        }

        let copy_len = old_size.min(size);
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, new_ptr, copy_len);
        }
        self.release(allocator, ptr);
        new_ptr
    }

    /// `count * size`, overflow-checked, allocated, and zeroed on success.
    pub fn zeroed_allocate_of_count(&self, allocator: &A, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return std::ptr::null_mut();
        };
        let ptr = self.allocate(allocator, total);
        if !ptr.is_null() && total > 0 {
            unsafe {
                std::ptr::write_bytes(ptr, 0, total);
            }
        }
        ptr
    }
}

impl<A: Allocator> Default for Bridge<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Storage for the process-wide allocator singleton.
///
/// Lazily constructed on first use (`get()`), via `OnceLock`, which gives the
/// same "first caller constructs, all callers observe the same address"
/// guarantee as a C++ function-local static. The value is never dropped: a
/// `'static` `OnceLock` never runs its destructor, matching "placement into a
/// static storage region, never destroyed, so that `free` calls arriving
/// during process teardown still land on a valid allocator.
pub struct Singleton<A: Allocator> {
    cell: OnceLock<A>,
    init: fn() -> A,
}

impl<A: Allocator> Singleton<A> {
    pub const fn new(init: fn() -> A) -> Self {
        Self {
            cell: OnceLock::new(),
            init,
        }
    }

    /// Returns the allocator, constructing it on the first call from any
    /// thread. Marks `allocator_ready` exactly once, as part of that first
    /// construction — never before, never more than once.
    pub fn get(&self) -> &A {
        self.cell.get_or_init(|| {
            let allocator = (self.init)();
            READY.mark_allocator_ready();
            allocator
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAllocator {
        live: AtomicUsize,
    }

    unsafe impl Allocator for CountingAllocator {
        fn allocate(&self, size: usize) -> *mut u8 {
            if size == 0 {
                return std::ptr::NonNull::dangling().as_ptr();
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            let layout = std::alloc::Layout::from_size_align(size, 8).unwrap();
            unsafe { std::alloc::alloc(layout) }
        }

        fn release(&self, ptr: *mut u8) {
            if ptr.is_null() {
                return;
            }
            self.live.fetch_sub(1, Ordering::SeqCst);
            // Deliberately leaks in this test double: layout isn't tracked.
            // Good enough for exercising Bridge control flow, not a real heap.
            let _ = ptr;
        }

        fn aligned_allocate(&self, _align: usize, size: usize) -> *mut u8 {
            self.allocate(size)
        }

        fn size_of(&self, ptr: *mut u8) -> usize {
            if ptr.is_null() {
                0
            } else {
                16
            }
        }

        fn lock(&self) {}
        fn unlock(&self) {}
    }

    #[test]
    fn reallocate_null_is_allocate() {
        let a = CountingAllocator { live: AtomicUsize::new(0) };
        let bridge = Bridge::new();
        let p = bridge.reallocate(&a, std::ptr::null_mut(), 32);
        assert!(!p.is_null());
    }

    #[test]
    fn reallocate_zero_size_releases_and_returns_null() {
        let a = CountingAllocator { live: AtomicUsize::new(0) };
        let bridge = Bridge::new();
        let p = bridge.allocate(&a, 32);
        let p2 = bridge.reallocate(&a, p, 0);
        assert!(p2.is_null());
        assert_eq!(a.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zeroed_allocate_of_count_overflow_returns_null() {
        let a = CountingAllocator { live: AtomicUsize::new(0) };
        let bridge = Bridge::new();
        let p = bridge.zeroed_allocate_of_count(&a, usize::MAX, usize::MAX);
        assert!(p.is_null());
    }

    #[test]
    fn shrink_within_half_keeps_pointer() {
        // `size_of` always reports 16 in this test double, so a shrink to
        // anything in (8, 16] keeps the same pointer.
        let a = CountingAllocator { live: AtomicUsize::new(0) };
        let bridge = Bridge::new();
        let p = bridge.allocate(&a, 16);
        let p2 = bridge.reallocate(&a, p, 12);
        assert_eq!(p, p2);
    }
}
