use std::ffi::CStr;

use alloc_scaffold::bridge::Bridge;
use alloc_scaffold::error::AlignError;
use alloc_scaffold::wrappers;

mod support;
use support::ReferenceAllocator;

#[test]
fn calloc_zeroes_the_whole_block() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let p = wrappers::zeroed_allocate(&bridge, &a, 64, 1);
    assert!(!p.is_null());
    let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
    assert!(bytes.iter().all(|&b| b == 0));
    a.release(p);
}

#[test]
fn posix_memalign_rejects_bad_alignment_without_touching_the_allocator() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let mut out = std::ptr::null_mut();
    let err = wrappers::posix_aligned(&bridge, &a, &mut out, 6, 64).unwrap_err();
    assert_eq!(err, AlignError::NotPowerOfTwo);
    assert!(out.is_null());
}

#[test]
fn aligned_alloc_result_is_actually_aligned() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let p = wrappers::c11_aligned(&bridge, &a, 256, 1024);
    assert!(!p.is_null());
    assert_eq!(p as usize % 256, 0);
    a.release(p);
}

#[test]
fn pvalloc_result_is_page_sized_and_aligned() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let page = alloc_scaffold::sys::page_size();
    let p = wrappers::pvalloc(&bridge, &a, 1, page);
    assert!(!p.is_null());
    assert_eq!(p as usize % page, 0);
    assert_eq!(a.size_of(p), page);
    a.release(p);
}

#[test]
fn strdup_then_strndup_agree_on_a_truncated_prefix() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let src = std::ffi::CString::new("scaffolding").unwrap();

    let whole = unsafe { wrappers::string_duplicate(&bridge, &a, src.as_ptr()) };
    let prefix = unsafe {
        wrappers::bounded_string_duplicate(&bridge, &a, src.as_ptr(), 5)
    };

    assert_eq!(
        unsafe { CStr::from_ptr(whole) }.to_str().unwrap(),
        "scaffolding"
    );
    assert_eq!(unsafe { CStr::from_ptr(prefix) }.to_str().unwrap(), "scaff");

    a.release(whole as *mut u8);
    a.release(prefix as *mut u8);
}

#[test]
fn reallocate_array_preserves_contents_on_growth() {
    let a = ReferenceAllocator::new();
    let bridge = Bridge::new();
    let p = bridge.allocate(&a, 4 * std::mem::size_of::<u32>());
    unsafe {
        std::slice::from_raw_parts_mut(p as *mut u32, 4).copy_from_slice(&[1, 2, 3, 4]);
    }

    let grown = wrappers::reallocate_array(&bridge, &a, p, 8, std::mem::size_of::<u32>());
    assert!(!grown.is_null());
    let contents = unsafe { std::slice::from_raw_parts(grown as *const u32, 4) };
    assert_eq!(contents, [1, 2, 3, 4]);
    a.release(grown);
}
