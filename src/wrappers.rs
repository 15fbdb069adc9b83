//! Uniform Semantics Wrappers: the platform-agnostic bodies for the
//! noisy long tail of the standard allocation surface. Each is defined once,
//! generic over `A: Allocator`, and shared by every platform interceptor so
//! behavior is identical regardless of which variant installed it.

use std::ffi::{c_char, CStr};

use crate::bridge::Bridge;
use crate::contract::Allocator;
use crate::error::AlignError;

/// `calloc`: overflow-checked `count * size`, allocated and zeroed.
pub fn zeroed_allocate<A: Allocator>(bridge: &Bridge<A>, allocator: &A, count: usize, size: usize) -> *mut u8 {
    bridge.zeroed_allocate_of_count(allocator, count, size)
}

/// Whether `reallocate(ptr, 0)` should behave like the zero-friendly platform
/// (release and return null) or the zero-hostile one (release and return a
/// fresh minimum-size allocation so callers never see a crash-on-non-null
/// assumption violated). Platforms select this at the call site; see
/// `interpose::elf`/`interpose::macho`/`interpose::windows`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroReallocPolicy {
    ReleaseAndNull,
    ReleaseAndMinimal,
}

/// `realloc`, with the platform's zero-size policy applied on top of the
/// Bridge's shrink-threshold synthesis.
///
/// Under `ReleaseAndMinimal`, repeated
/// `reallocate(p, 0)` on the same logical pointer always releases whatever
/// pointer it is handed and returns a *freshly allocated* minimum-size block —
/// it never hands back the just-freed address.
pub fn reallocate_wrapper<A: Allocator>(
    bridge: &Bridge<A>,
    allocator: &A,
    ptr: *mut u8,
    size: usize,
    policy: ZeroReallocPolicy,
) -> *mut u8 {
    if ptr.is_null() {
        return bridge.allocate(allocator, size);
    }
    if size == 0 {
        bridge.release(allocator, ptr);
        return match policy {
            ZeroReallocPolicy::ReleaseAndNull => std::ptr::null_mut(),
            ZeroReallocPolicy::ReleaseAndMinimal => bridge.allocate(allocator, 1),
        };
    }
    bridge.reallocate(allocator, ptr, size)
}

fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// `posix_memalign`: validates `align` is a power of two and a multiple of
/// pointer size, then allocates. On success writes `*out_ptr` and returns
/// `Ok(())`; on validation failure returns the specific `AlignError`.
///
/// A caller mapping this onto the real `posix_memalign` ABI translates
/// `Err(_)` to `EINVAL` and `Ok(())` with a null-payload write to `ENOMEM`.
pub fn posix_aligned<A: Allocator>(
    bridge: &Bridge<A>,
    allocator: &A,
    out_ptr: &mut *mut u8,
    align: usize,
    size: usize,
) -> Result<(), AlignError> {
    if !is_power_of_two(align) {
        return Err(AlignError::NotPowerOfTwo);
    }
    if align % std::mem::size_of::<*const ()>() != 0 {
        return Err(AlignError::NotPointerMultiple);
    }
    *out_ptr = bridge.aligned_allocate(allocator, align, size);
    Ok(())
}

/// `aligned_alloc` (C11): as `posix_aligned`, plus the additional constraint
/// that `size` be a multiple of `align`. Returns null on any violation.
pub fn c11_aligned<A: Allocator>(bridge: &Bridge<A>, allocator: &A, align: usize, size: usize) -> *mut u8 {
    if !is_power_of_two(align) || size % align != 0 {
        return std::ptr::null_mut();
    }
    bridge.aligned_allocate(allocator, align, size)
}

/// `valloc`-equivalent: a page-aligned allocation of exactly `size` bytes.
pub fn page_aligned_alloc<A: Allocator>(bridge: &Bridge<A>, allocator: &A, size: usize, page_size: usize) -> *mut u8 {
    bridge.aligned_allocate(allocator, page_size, size)
}

/// `pvalloc`-equivalent: round `size` up to a whole number of pages, then
/// allocate page-aligned.
pub fn pvalloc<A: Allocator>(bridge: &Bridge<A>, allocator: &A, size: usize, page_size: usize) -> *mut u8 {
    let rounded = round_up(size, page_size);
    bridge.aligned_allocate(allocator, page_size, rounded)
}

fn round_up(size: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return size;
    }
    let rem = size % multiple;
    if rem == 0 {
        size
    } else {
        size + (multiple - rem)
    }
}

/// `reallocarray`: overflow-checked `n * size`, then `reallocate`.
pub fn reallocate_array<A: Allocator>(
    bridge: &Bridge<A>,
    allocator: &A,
    ptr: *mut u8,
    n: usize,
    size: usize,
) -> *mut u8 {
    let Some(total) = n.checked_mul(size) else {
        return std::ptr::null_mut();
    };
    bridge.reallocate(allocator, ptr, total)
}

/// `strdup`: allocate `strlen(s) + 1` bytes and copy `s` including the
/// terminator. `s` must be a valid, null-terminated C string.
///
/// # Safety
/// `s` must point to a valid NUL-terminated C string.
pub unsafe fn string_duplicate<A: Allocator>(bridge: &Bridge<A>, allocator: &A, s: *const c_char) -> *mut c_char {
    if s.is_null() {
        return std::ptr::null_mut();
    }
    let len = unsafe { CStr::from_ptr(s) }.to_bytes().len();
    let dst = bridge.allocate(allocator, len + 1);
    if dst.is_null() {
        return std::ptr::null_mut();
    }
    unsafe {
        std::ptr::copy_nonoverlapping(s as *const u8, dst, len);
        *dst.add(len) = 0;
    }
    dst as *mut c_char
}

/// `strndup`: copy at most `n` bytes of `s`, stopping at the first NUL,
/// always null-terminating the result.
///
/// # Safety
/// `s` must point to a valid C string of at least `n` readable bytes, or be
/// shorter and NUL-terminated within those `n` bytes.
pub unsafe fn bounded_string_duplicate<A: Allocator>(
    bridge: &Bridge<A>,
    allocator: &A,
    s: *const c_char,
    n: usize,
) -> *mut c_char {
    if s.is_null() {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(s as *const u8, n) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(n);
    let dst = bridge.allocate(allocator, len + 1);
    if dst.is_null() {
        return std::ptr::null_mut();
    }
    unsafe {
        std::ptr::copy_nonoverlapping(s as *const u8, dst, len);
        *dst.add(len) = 0;
    }
    dst as *mut c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use std::alloc::{alloc, dealloc, Layout};
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct TestAllocator {
        layouts: RefCell<HashMap<usize, Layout>>,
    }

    unsafe impl Allocator for TestAllocator {
        fn allocate(&self, size: usize) -> *mut u8 {
            if size == 0 {
                return std::ptr::NonNull::dangling().as_ptr();
            }
            let layout = Layout::from_size_align(size, 8).unwrap();
            let ptr = unsafe { alloc(layout) };
            if !ptr.is_null() {
                self.layouts.borrow_mut().insert(ptr as usize, layout);
            }
            ptr
        }

        fn release(&self, ptr: *mut u8) {
            if ptr.is_null() {
                return;
            }
            if let Some(layout) = self.layouts.borrow_mut().remove(&(ptr as usize)) {
                unsafe { dealloc(ptr, layout) };
            }
        }

        fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8 {
            let layout = Layout::from_size_align(size.max(1), align).unwrap();
            let ptr = unsafe { alloc(layout) };
            if !ptr.is_null() {
                self.layouts.borrow_mut().insert(ptr as usize, layout);
            }
            ptr
        }

        fn size_of(&self, ptr: *mut u8) -> usize {
            self.layouts
                .borrow()
                .get(&(ptr as usize))
                .map(|l| l.size())
                .unwrap_or(0)
        }

        fn lock(&self) {}
        fn unlock(&self) {}
    }

    fn test_allocator() -> TestAllocator {
        TestAllocator { layouts: RefCell::new(HashMap::new()) }
    }

    #[test]
    fn zeroed_allocate_is_all_zero() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = zeroed_allocate(&bridge, &a, 10, std::mem::size_of::<i32>());
        assert!(!p.is_null());
        let bytes = unsafe { std::slice::from_raw_parts(p, 40) };
        assert!(bytes.iter().all(|&b| b == 0));
        a.release(p);
    }

    #[test]
    fn posix_aligned_rejects_non_power_of_two() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let mut out = std::ptr::null_mut();
        let err = posix_aligned(&bridge, &a, &mut out, 3, 64).unwrap_err();
        assert_eq!(err, AlignError::NotPowerOfTwo);
    }

    #[test]
    fn posix_aligned_rejects_sub_pointer_alignment() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let mut out = std::ptr::null_mut();
        // 2 is a power of two but (on any real platform) smaller than pointer size.
        let result = posix_aligned(&bridge, &a, &mut out, 2, 64);
        if std::mem::size_of::<*const ()>() > 2 {
            assert_eq!(result.unwrap_err(), AlignError::NotPointerMultiple);
        }
    }

    #[test]
    fn posix_aligned_success_is_aligned() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let mut out = std::ptr::null_mut();
        posix_aligned(&bridge, &a, &mut out, 4096, 4096).unwrap();
        assert!(!out.is_null());
        assert_eq!(out as usize % 4096, 0);
        a.release(out);
    }

    #[test]
    fn c11_aligned_rejects_size_not_multiple_of_align() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = c11_aligned(&bridge, &a, 64, 100);
        assert!(p.is_null());
    }

    #[test]
    fn c11_aligned_accepts_matching_size() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = c11_aligned(&bridge, &a, 64, 128);
        assert!(!p.is_null());
        assert_eq!(p as usize % 64, 0);
        a.release(p);
    }

    #[test]
    fn pvalloc_rounds_up_to_page() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = pvalloc(&bridge, &a, 1, 4096);
        assert!(!p.is_null());
        assert_eq!(a.size_of(p), 4096);
        a.release(p);
    }

    #[test]
    fn reallocate_array_overflow_returns_null() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = reallocate_array(&bridge, &a, std::ptr::null_mut(), usize::MAX, 2);
        assert!(p.is_null());
    }

    #[test]
    fn string_duplicate_round_trips() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let src = std::ffi::CString::new("hello").unwrap();
        let dup = unsafe { string_duplicate(&bridge, &a, src.as_ptr()) };
        assert!(!dup.is_null());
        let dup_str = unsafe { CStr::from_ptr(dup) };
        assert_eq!(dup_str.to_str().unwrap(), "hello");
        a.release(dup as *mut u8);
    }

    #[test]
    fn bounded_string_duplicate_truncates() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let src = b"hello world\0";
        let dup = unsafe { bounded_string_duplicate(&bridge, &a, src.as_ptr() as *const c_char, 5) };
        assert!(!dup.is_null());
        let dup_str = unsafe { CStr::from_ptr(dup) };
        assert_eq!(dup_str.to_str().unwrap(), "hello");
        a.release(dup as *mut u8);
    }

    #[test]
    fn bounded_string_duplicate_stops_at_nul_before_n() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let src = b"hi\0garbage";
        let dup = unsafe { bounded_string_duplicate(&bridge, &a, src.as_ptr() as *const c_char, 10) };
        let dup_str = unsafe { CStr::from_ptr(dup) };
        assert_eq!(dup_str.to_str().unwrap(), "hi");
        a.release(dup as *mut u8);
    }

    #[test]
    fn reallocate_wrapper_zero_hostile_returns_minimal_block() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = bridge.allocate(&a, 32);
        let p2 = reallocate_wrapper(&bridge, &a, p, 0, ZeroReallocPolicy::ReleaseAndMinimal);
        assert!(!p2.is_null());
        assert_ne!(p, p2);
        a.release(p2);
    }

    #[test]
    fn reallocate_wrapper_zero_friendly_returns_null() {
        let a = test_allocator();
        let bridge = Bridge::new();
        let p = bridge.allocate(&a, 32);
        let p2 = reallocate_wrapper(&bridge, &a, p, 0, ZeroReallocPolicy::ReleaseAndNull);
        assert!(p2.is_null());
    }
}
