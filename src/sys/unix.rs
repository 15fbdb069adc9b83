//! Unix syscall surface: anonymous-page mapping for the bootstrap arena, and
//! a best-effort pointer-residency probe used to classify foreign pointers on
//! the in-process-patching variant.

use libc::{c_void, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::ptr;
use std::sync::OnceLock;

/// Maps an anonymous, read-write region of at least `size` bytes.
pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = libc::mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

pub unsafe fn free_region(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut c_void, size);
}

pub unsafe fn protect_region(ptr: *mut u8, size: usize, readonly: bool) -> bool {
    let prot = if readonly { PROT_READ } else { PROT_READ | PROT_WRITE };
    libc::mprotect(ptr as *mut c_void, size, prot) == 0
}

/// The platform page size, queried once and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as usize
        } else {
            4096
        }
    })
}

/// Best-effort check of whether the page containing `ptr` is resident /
/// mapped in this process, used to approximate a protected size probe: a
/// pointer whose page is unmapped cannot be one this process's allocator
/// handed out, so it is classified foreign without needing to catch a fault.
///
/// This is necessarily approximate — a mapped page proves nothing about
/// ownership, only that dereferencing it won't fault.
pub unsafe fn probe_mapped(ptr: *const u8) -> bool {
    if ptr.is_null() {
        return false;
    }
    let page = page_size();
    let aligned = (ptr as usize) & !(page - 1);
    let mut residency: u8 = 0;
    let rc = libc::mincore(aligned as *mut c_void, page, &mut residency as *mut u8);
    rc == 0
}

/// Walks forward from `ptr` one page at a time, counting resident bytes up
/// to `max`. Stops at the first unmapped page. Used to bound a best-effort
/// copy out of a pointer this process did not allocate, where there is no
/// real size to consult.
pub unsafe fn probe_readable_len(ptr: *const u8, max: usize) -> usize {
    if ptr.is_null() || max == 0 {
        return 0;
    }
    let page = page_size();
    let start = ptr as usize;
    let mut probed = start & !(page - 1);
    let mut len = 0usize;
    while len < max {
        if !probe_mapped(probed as *const u8) {
            break;
        }
        let page_end = probed + page;
        let visible_end = page_end.min(start + max);
        len = visible_end.saturating_sub(start);
        probed = page_end;
    }
    len
}
