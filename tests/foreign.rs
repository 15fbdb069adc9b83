use alloc_scaffold::bridge::Bridge;
use alloc_scaffold::foreign::{classify, Provenance};

mod support;
use support::ReferenceAllocator;

#[test]
fn null_pointer_classifies_as_owned() {
    let a = ReferenceAllocator::new();
    assert_eq!(classify(&a, std::ptr::null_mut()), Provenance::Owned);
}

#[test]
fn pointer_the_allocator_actually_produced_classifies_as_owned() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let p = bridge.allocate(&a, 32);
    assert_eq!(classify(&a, p), Provenance::Owned);
    bridge.release(&a, p);
}

#[test]
fn released_pointer_no_longer_classifies_as_owned() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let p = bridge.allocate(&a, 32);
    bridge.release(&a, p);
    // The allocator's size table no longer has an entry for `p`; whether the
    // residency probe still finds the page mapped is platform-dependent, but
    // it must never be reported `Owned` once released.
    assert_ne!(classify(&a, p), Provenance::Owned);
}

#[test]
fn a_stack_address_the_allocator_never_produced_is_foreign() {
    let a = ReferenceAllocator::new();
    let local = 0u64;
    let p = &local as *const u64 as *mut u8;
    assert_eq!(classify(&a, p), Provenance::Foreign);
}
