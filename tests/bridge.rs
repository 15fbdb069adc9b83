use alloc_scaffold::bridge::{Bridge, Singleton};

mod support;
use support::ReferenceAllocator;

#[test]
fn round_trips_a_value_through_allocate_and_release() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();

    let p = bridge.allocate(&a, std::mem::size_of::<u64>());
    assert!(!p.is_null());
    unsafe { (p as *mut u64).write(0xdead_beef_u64) };
    assert_eq!(unsafe { (p as *const u64).read() }, 0xdead_beef_u64);

    bridge.release(&a, p);
}

#[test]
fn grow_via_synthesized_reallocate_preserves_prefix() {
    // ReferenceAllocator has a native `reallocate`, but the Bridge's own
    // synthesis is exercised directly here by bypassing it.
    struct NoNativeRealloc(ReferenceAllocator);
    unsafe impl alloc_scaffold::contract::Allocator for NoNativeRealloc {
        fn allocate(&self, size: usize) -> *mut u8 {
            self.0.allocate(size)
        }
        fn release(&self, ptr: *mut u8) {
            self.0.release(ptr)
        }
        fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8 {
            self.0.aligned_allocate(align, size)
        }
        fn size_of(&self, ptr: *mut u8) -> usize {
            self.0.size_of(ptr)
        }
        fn lock(&self) {
            self.0.lock()
        }
        fn unlock(&self) {
            self.0.unlock()
        }
        // Default `reallocate` (returns `None`) is intentionally inherited.
    }

    let a = NoNativeRealloc(ReferenceAllocator::new());
    let bridge: Bridge<NoNativeRealloc> = Bridge::new();

    let p = bridge.allocate(&a, 8);
    unsafe { std::ptr::write_bytes(p, 0xAB, 8) };

    let grown = bridge.reallocate(&a, p, 64);
    assert!(!grown.is_null());
    let prefix = unsafe { std::slice::from_raw_parts(grown, 8) };
    assert!(prefix.iter().all(|&b| b == 0xAB));

    bridge.release(&a, grown);
}

#[test]
fn singleton_constructs_exactly_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static CONSTRUCTIONS: AtomicUsize = AtomicUsize::new(0);

    struct CountedAllocator(ReferenceAllocator);
    unsafe impl alloc_scaffold::contract::Allocator for CountedAllocator {
        fn allocate(&self, size: usize) -> *mut u8 {
            self.0.allocate(size)
        }
        fn release(&self, ptr: *mut u8) {
            self.0.release(ptr)
        }
        fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8 {
            self.0.aligned_allocate(align, size)
        }
        fn size_of(&self, ptr: *mut u8) -> usize {
            self.0.size_of(ptr)
        }
        fn lock(&self) {
            self.0.lock()
        }
        fn unlock(&self) {
            self.0.unlock()
        }
    }

    fn build() -> CountedAllocator {
        CONSTRUCTIONS.fetch_add(1, Ordering::SeqCst);
        CountedAllocator(ReferenceAllocator::new())
    }

    let singleton: Singleton<CountedAllocator> = Singleton::new(build);
    for _ in 0..8 {
        let _ = singleton.get();
    }
    assert_eq!(CONSTRUCTIONS.load(Ordering::SeqCst), 1);
    assert!(alloc_scaffold::readiness::READY.allocator_ready());
}
