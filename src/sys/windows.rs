//! Windows syscall surface: page mapping for the bootstrap arena, and a
//! `VirtualQuery`-based residency probe used by the in-process-patching
//! variant's foreign-pointer classification.

use std::mem::MaybeUninit;
use std::ptr;
use std::sync::OnceLock;

use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, VirtualQuery, MEMORY_BASIC_INFORMATION, MEM_COMMIT,
    MEM_RELEASE, MEM_RESERVE, PAGE_READONLY, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
    if ptr.is_null() {
        None
    } else {
        Some(ptr as *mut u8)
    }
}

pub unsafe fn free_region(ptr: *mut u8, _size: usize) {
    // MEM_RELEASE frees the entire region reserved by VirtualAlloc. Size must be 0.
    VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
}

pub unsafe fn protect_region(ptr: *mut u8, size: usize, readonly: bool) -> bool {
    let prot = if readonly { PAGE_READONLY } else { PAGE_READWRITE };
    let mut old_prot = 0;
    VirtualProtect(ptr as *mut _, size, prot, &mut old_prot) != 0
}

/// The platform page (allocation granularity) size, queried once and cached.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| unsafe {
        let mut info = MaybeUninit::<SYSTEM_INFO>::zeroed();
        GetSystemInfo(info.as_mut_ptr());
        let info = info.assume_init();
        if info.dwPageSize > 0 {
            info.dwPageSize as usize
        } else {
            4096
        }
    })
}

/// Best-effort residency probe via `VirtualQuery`: a pointer whose containing
/// region is not `MEM_COMMIT` cannot be a live allocation this process's
/// allocator produced, so it is classified foreign.
pub unsafe fn probe_mapped(ptr: *const u8) -> bool {
    if ptr.is_null() {
        return false;
    }
    let mut info = MaybeUninit::<MEMORY_BASIC_INFORMATION>::zeroed();
    let written = VirtualQuery(
        ptr as *const _,
        info.as_mut_ptr(),
        std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
    );
    if written == 0 {
        return false;
    }
    let info = info.assume_init();
    info.State == MEM_COMMIT
}

/// Walks forward from `ptr` one `VirtualQuery` region at a time, counting
/// committed bytes up to `max`. Stops at the first region that is not
/// `MEM_COMMIT`. Used to bound a best-effort copy out of a pointer this
/// process did not allocate, where there is no real size to consult.
pub unsafe fn probe_readable_len(ptr: *const u8, max: usize) -> usize {
    if ptr.is_null() || max == 0 {
        return 0;
    }
    let start = ptr as usize;
    let mut cursor = start;
    let mut len = 0usize;
    while len < max {
        let mut info = MaybeUninit::<MEMORY_BASIC_INFORMATION>::zeroed();
        let written = VirtualQuery(
            cursor as *const _,
            info.as_mut_ptr(),
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        );
        if written == 0 {
            break;
        }
        let info = info.assume_init();
        if info.State != MEM_COMMIT {
            break;
        }
        let region_end = info.BaseAddress as usize + info.RegionSize;
        if region_end <= cursor {
            break;
        }
        let visible_end = region_end.min(start + max);
        len = visible_end.saturating_sub(start);
        cursor = region_end;
    }
    len
}
