//! Import-address-table redirection, the default sub-strategy for the
//! in-process-patching variant: rewrite each loaded module's IAT entries for
//! the CRT allocation functions so they resolve to our shims, without
//! touching the target functions themselves.
//!
//! `register::<A>` resolves and captures the real CRT entry points via
//! `GetProcAddress` before anything is patched, so every shim below can fall
//! back to the genuine implementation when the global `enabled` flag is
//! false instead of always routing through the Bridge — the same
//! enable/disable contract `disable()` restoring IAT entries implements at
//! the import-table level, mirrored here at the call level for any caller
//! that cached a direct pointer before this module ran.
//!
//! Scoped to 64-bit PE images — the only ABI this crate's own `windows-sys`
//! dependency set targets. A 32-bit companion would walk `IMAGE_THUNK_DATA32`
//! instead of `IMAGE_THUNK_DATA64`; left out since nothing in this workspace
//! produces a 32-bit build.

use std::ffi::{c_char, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use windows_sys::Win32::Foundation::{CloseHandle, HMODULE};
use windows_sys::Win32::System::Diagnostics::Debug::{
    IMAGE_DIRECTORY_ENTRY_IMPORT, IMAGE_IMPORT_DESCRIPTOR, IMAGE_NT_HEADERS64,
    IMAGE_THUNK_DATA64,
};
use windows_sys::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W,
    TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
};
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
use windows_sys::Win32::System::Memory::{
    VirtualProtect, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
};
use windows_sys::Win32::System::SystemServices::{IMAGE_DOS_HEADER, IMAGE_DOS_SIGNATURE};

use crate::scaffold::Scaffold;
use crate::wrappers;

const CRT_MODULE_NAMES: &[&str] = &[
    "ucrtbase.dll",
    "msvcrt.dll",
    "vcruntime140.dll",
    "api-ms-win-crt-heap-l1-1-0.dll",
];

/// Every symbol name this module patches in a loaded image's import table.
/// Covers the public CRT surface plus the vendor-internal base/CRT/debug
/// variants glibc-style wrappers call through on other platforms — on
/// Windows those are `_malloc_base`/`_malloc_crt`/`_malloc_dbg` and their
/// `free`/`calloc`/`realloc` counterparts, `_msize`/`_msize_dbg`, `_expand`,
/// `_recalloc`, the aligned-allocation family, both spellings of `strdup`,
/// and the MSVC-mangled C++ `operator new`/`operator delete` overloads.
const PATCHED_NAMES: &[&str] = &[
    "malloc",
    "_malloc_base",
    "_malloc_crt",
    "_malloc_dbg",
    "free",
    "_free_base",
    "_free_crt",
    "_free_dbg",
    "calloc",
    "_calloc_base",
    "_calloc_crt",
    "_calloc_dbg",
    "realloc",
    "_realloc_base",
    "_realloc_crt",
    "_realloc_dbg",
    "_msize",
    "_msize_dbg",
    "_expand",
    "_recalloc",
    "_aligned_malloc",
    "_aligned_free",
    "_aligned_realloc",
    "strdup",
    "_strdup",
    "??2@YAPEAX_K@Z",
    "??_U@YAPEAX_K@Z",
    "??3@YAXPEAX@Z",
    "??_V@YAXPEAX@Z",
];

struct PatchedSlot {
    iat_entry: *mut usize,
    original: usize,
}

unsafe impl Send for PatchedSlot {}

struct State {
    initialized: bool,
    enabled: bool,
    patches: Vec<PatchedSlot>,
}

static STATE: Mutex<State> = Mutex::new(State {
    initialized: false,
    enabled: false,
    patches: Vec::new(),
});

/// Real CRT entry points captured once at `register` time, consulted by
/// every shim when `enabled` is false. Stored as raw addresses rather than
/// typed function pointers since each slot backs several differently-named
/// but identically-shaped symbols (e.g. `_malloc_base`/`_malloc_crt`).
struct Originals {
    malloc: AtomicUsize,
    free: AtomicUsize,
    calloc: AtomicUsize,
    realloc: AtomicUsize,
    msize: AtomicUsize,
    expand: AtomicUsize,
    recalloc: AtomicUsize,
    aligned_malloc: AtomicUsize,
    aligned_free: AtomicUsize,
    aligned_realloc: AtomicUsize,
    strdup: AtomicUsize,
    operator_new: AtomicUsize,
    operator_new_array: AtomicUsize,
    operator_delete: AtomicUsize,
    operator_delete_array: AtomicUsize,
}

static ORIGINALS: Originals = Originals {
    malloc: AtomicUsize::new(0),
    free: AtomicUsize::new(0),
    calloc: AtomicUsize::new(0),
    realloc: AtomicUsize::new(0),
    msize: AtomicUsize::new(0),
    expand: AtomicUsize::new(0),
    recalloc: AtomicUsize::new(0),
    aligned_malloc: AtomicUsize::new(0),
    aligned_free: AtomicUsize::new(0),
    aligned_realloc: AtomicUsize::new(0),
    strdup: AtomicUsize::new(0),
    operator_new: AtomicUsize::new(0),
    operator_new_array: AtomicUsize::new(0),
    operator_delete: AtomicUsize::new(0),
    operator_delete_array: AtomicUsize::new(0),
};

pub fn is_initialized() -> bool {
    STATE.lock().unwrap().initialized
}

pub fn is_enabled() -> bool {
    STATE.lock().unwrap().enabled
}

/// Resolves the process's loaded CRT module and captures the real address
/// of every symbol this module can fall back to, then marks the subsystem
/// initialized. Idempotent — a second call is a no-op once `initialized` is
/// set. `enable` performs the actual IAT redirection; kept separate so a
/// caller can register during early startup and defer enabling.
pub fn register<A: Scaffold>() {
    let mut state = STATE.lock().unwrap();
    if state.initialized {
        return;
    }
    unsafe {
        capture_originals();
    }
    state.initialized = true;
}

/// # Safety
/// Must only run once, before any shim has been installed, so the addresses
/// captured are genuinely the CRT's own implementations rather than a
/// previously patched IAT entry.
unsafe fn capture_originals() {
    let Some(module) = find_crt_module() else {
        return;
    };
    let lookup = |name: &str| -> usize {
        let mut buf = [0u8; 64];
        if name.len() + 1 > buf.len() {
            return 0;
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        unsafe { GetProcAddress(module, buf.as_ptr()) }.map_or(0, |p| p as usize)
    };

    ORIGINALS.malloc.store(lookup("malloc"), Ordering::Relaxed);
    ORIGINALS.free.store(lookup("free"), Ordering::Relaxed);
    ORIGINALS.calloc.store(lookup("calloc"), Ordering::Relaxed);
    ORIGINALS.realloc.store(lookup("realloc"), Ordering::Relaxed);
    ORIGINALS.msize.store(lookup("_msize"), Ordering::Relaxed);
    ORIGINALS.expand.store(lookup("_expand"), Ordering::Relaxed);
    ORIGINALS
        .recalloc
        .store(lookup("_recalloc"), Ordering::Relaxed);
    ORIGINALS
        .aligned_malloc
        .store(lookup("_aligned_malloc"), Ordering::Relaxed);
    ORIGINALS
        .aligned_free
        .store(lookup("_aligned_free"), Ordering::Relaxed);
    ORIGINALS
        .aligned_realloc
        .store(lookup("_aligned_realloc"), Ordering::Relaxed);
    ORIGINALS.strdup.store(lookup("_strdup"), Ordering::Relaxed);
    ORIGINALS
        .operator_new
        .store(lookup("??2@YAPEAX_K@Z"), Ordering::Relaxed);
    ORIGINALS
        .operator_new_array
        .store(lookup("??_U@YAPEAX_K@Z"), Ordering::Relaxed);
    ORIGINALS
        .operator_delete
        .store(lookup("??3@YAXPEAX@Z"), Ordering::Relaxed);
    ORIGINALS
        .operator_delete_array
        .store(lookup("??_V@YAXPEAX@Z"), Ordering::Relaxed);
}

fn find_crt_module() -> Option<HMODULE> {
    for name in CRT_MODULE_NAMES {
        let mut buf = [0u8; 64];
        if name.len() + 1 > buf.len() {
            continue;
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        let handle = unsafe { GetModuleHandleA(buf.as_ptr()) };
        if handle != 0 {
            return Some(handle);
        }
    }
    None
}

/// Walks every loaded module's import table and redirects CRT allocation
/// entries to this allocator's shims. Idempotent: calling twice re-scans and
/// patches any newly loaded modules, without double-patching ones already
/// done (tracked by the `patches` list).
pub fn enable<A: Scaffold>() {
    register::<A>();

    let shims = shim_table::<A>();
    let mut new_patches = Vec::new();

    for module in loaded_modules() {
        unsafe {
            patch_module_imports(module, &shims, &mut new_patches);
        }
    }

    let mut state = STATE.lock().unwrap();
    state.patches.extend(new_patches);
    state.enabled = true;
}

/// Restores every IAT entry this module patched to its original value, and
/// clears `enabled` so any shim still reachable through a cached pointer
/// falls back to the real CRT implementation too.
pub fn disable() {
    let mut state = STATE.lock().unwrap();
    for patch in state.patches.drain(..) {
        unsafe {
            write_iat_entry(patch.iat_entry, patch.original);
        }
    }
    state.enabled = false;
}

fn shim_table<A: Scaffold>() -> Vec<(&'static str, usize)> {
    unsafe extern "C" fn shim_malloc<A: Scaffold>(size: usize) -> *mut c_void {
        if is_enabled() {
            super::malloc_impl::<A>(size)
        } else {
            unsafe { call_original1(ORIGINALS.malloc.load(Ordering::Relaxed), size) }
        }
    }
    unsafe extern "C" fn shim_free<A: Scaffold>(ptr: *mut c_void) {
        if is_enabled() {
            super::free_impl::<A>(ptr)
        } else {
            let original = ORIGINALS.free.load(Ordering::Relaxed);
            if original != 0 {
                unsafe {
                    let f: extern "C" fn(*mut c_void) = std::mem::transmute(original);
                    f(ptr);
                }
            }
        }
    }
    unsafe extern "C" fn shim_calloc<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
        if is_enabled() {
            super::calloc_impl::<A>(nmemb, size)
        } else {
            let original = ORIGINALS.calloc.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(usize, usize) -> *mut c_void =
                        std::mem::transmute(original);
                    f(nmemb, size)
                }
            }
        }
    }
    unsafe extern "C" fn shim_realloc<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
        if is_enabled() {
            super::realloc_impl::<A>(ptr, size)
        } else {
            let original = ORIGINALS.realloc.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(*mut c_void, usize) -> *mut c_void =
                        std::mem::transmute(original);
                    f(ptr, size)
                }
            }
        }
    }
    unsafe extern "C" fn shim_msize<A: Scaffold>(ptr: *mut c_void) -> usize {
        if is_enabled() {
            super::size_impl::<A>(ptr)
        } else {
            let original = ORIGINALS.msize.load(Ordering::Relaxed);
            if original == 0 {
                0
            } else {
                unsafe {
                    let f: extern "C" fn(*mut c_void) -> usize = std::mem::transmute(original);
                    f(ptr)
                }
            }
        }
    }
    // `_expand` grows an allocation in place or fails; this allocator never
    // relocates-in-place, so it always reports failure rather than
    // pretending to support a capability it does not have.
    unsafe extern "C" fn shim_expand<A: Scaffold>(
        _ptr: *mut c_void,
        _size: usize,
    ) -> *mut c_void {
        std::ptr::null_mut()
    }
    unsafe extern "C" fn shim_recalloc<A: Scaffold>(
        ptr: *mut c_void,
        nmemb: usize,
        size: usize,
    ) -> *mut c_void {
        if is_enabled() {
            recalloc_impl::<A>(ptr, nmemb, size)
        } else {
            let original = ORIGINALS.recalloc.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(*mut c_void, usize, usize) -> *mut c_void =
                        std::mem::transmute(original);
                    f(ptr, nmemb, size)
                }
            }
        }
    }
    unsafe extern "C" fn shim_aligned_malloc<A: Scaffold>(
        size: usize,
        alignment: usize,
    ) -> *mut c_void {
        if is_enabled() {
            let bridge = A::bridge();
            bridge.aligned_allocate(A::active(), alignment, size) as *mut c_void
        } else {
            let original = ORIGINALS.aligned_malloc.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(usize, usize) -> *mut c_void =
                        std::mem::transmute(original);
                    f(size, alignment)
                }
            }
        }
    }
    unsafe extern "C" fn shim_aligned_free<A: Scaffold>(ptr: *mut c_void) {
        if is_enabled() {
            super::free_impl::<A>(ptr)
        } else {
            let original = ORIGINALS.aligned_free.load(Ordering::Relaxed);
            if original != 0 {
                unsafe {
                    let f: extern "C" fn(*mut c_void) = std::mem::transmute(original);
                    f(ptr);
                }
            }
        }
    }
    unsafe extern "C" fn shim_aligned_realloc<A: Scaffold>(
        ptr: *mut c_void,
        size: usize,
        alignment: usize,
    ) -> *mut c_void {
        if is_enabled() {
            aligned_realloc_impl::<A>(ptr, size, alignment)
        } else {
            let original = ORIGINALS.aligned_realloc.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(*mut c_void, usize, usize) -> *mut c_void =
                        std::mem::transmute(original);
                    f(ptr, size, alignment)
                }
            }
        }
    }
    unsafe extern "C" fn shim_strdup<A: Scaffold>(s: *const c_char) -> *mut c_char {
        if is_enabled() {
            let bridge = A::bridge();
            unsafe { wrappers::string_duplicate(&bridge, A::active(), s) }
        } else {
            let original = ORIGINALS.strdup.load(Ordering::Relaxed);
            if original == 0 {
                std::ptr::null_mut()
            } else {
                unsafe {
                    let f: extern "C" fn(*const c_char) -> *mut c_char =
                        std::mem::transmute(original);
                    f(s)
                }
            }
        }
    }
    unsafe extern "C" fn shim_operator_new<A: Scaffold>(size: usize) -> *mut c_void {
        if is_enabled() {
            super::malloc_impl::<A>(size)
        } else {
            unsafe { call_original1(ORIGINALS.operator_new.load(Ordering::Relaxed), size) }
        }
    }
    unsafe extern "C" fn shim_operator_new_array<A: Scaffold>(size: usize) -> *mut c_void {
        if is_enabled() {
            super::malloc_impl::<A>(size)
        } else {
            unsafe {
                call_original1(ORIGINALS.operator_new_array.load(Ordering::Relaxed), size)
            }
        }
    }
    unsafe extern "C" fn shim_operator_delete<A: Scaffold>(ptr: *mut c_void) {
        if is_enabled() {
            super::free_impl::<A>(ptr)
        } else {
            let original = ORIGINALS.operator_delete.load(Ordering::Relaxed);
            if original != 0 {
                unsafe {
                    let f: extern "C" fn(*mut c_void) = std::mem::transmute(original);
                    f(ptr);
                }
            }
        }
    }
    unsafe extern "C" fn shim_operator_delete_array<A: Scaffold>(ptr: *mut c_void) {
        if is_enabled() {
            super::free_impl::<A>(ptr)
        } else {
            let original = ORIGINALS.operator_delete_array.load(Ordering::Relaxed);
            if original != 0 {
                unsafe {
                    let f: extern "C" fn(*mut c_void) = std::mem::transmute(original);
                    f(ptr);
                }
            }
        }
    }

    vec![
        ("malloc", shim_malloc::<A> as usize),
        ("_malloc_base", shim_malloc::<A> as usize),
        ("_malloc_crt", shim_malloc::<A> as usize),
        ("_malloc_dbg", shim_malloc::<A> as usize),
        ("free", shim_free::<A> as usize),
        ("_free_base", shim_free::<A> as usize),
        ("_free_crt", shim_free::<A> as usize),
        ("_free_dbg", shim_free::<A> as usize),
        ("calloc", shim_calloc::<A> as usize),
        ("_calloc_base", shim_calloc::<A> as usize),
        ("_calloc_crt", shim_calloc::<A> as usize),
        ("_calloc_dbg", shim_calloc::<A> as usize),
        ("realloc", shim_realloc::<A> as usize),
        ("_realloc_base", shim_realloc::<A> as usize),
        ("_realloc_crt", shim_realloc::<A> as usize),
        ("_realloc_dbg", shim_realloc::<A> as usize),
        ("_msize", shim_msize::<A> as usize),
        ("_msize_dbg", shim_msize::<A> as usize),
        ("_expand", shim_expand::<A> as usize),
        ("_recalloc", shim_recalloc::<A> as usize),
        ("_aligned_malloc", shim_aligned_malloc::<A> as usize),
        ("_aligned_free", shim_aligned_free::<A> as usize),
        ("_aligned_realloc", shim_aligned_realloc::<A> as usize),
        ("strdup", shim_strdup::<A> as usize),
        ("_strdup", shim_strdup::<A> as usize),
        ("??2@YAPEAX_K@Z", shim_operator_new::<A> as usize),
        ("??_U@YAPEAX_K@Z", shim_operator_new_array::<A> as usize),
        ("??3@YAXPEAX@Z", shim_operator_delete::<A> as usize),
        ("??_V@YAXPEAX@Z", shim_operator_delete_array::<A> as usize),
    ]
}

unsafe fn call_original1(original: usize, size: usize) -> *mut c_void {
    if original == 0 {
        return std::ptr::null_mut();
    }
    unsafe {
        let f: extern "C" fn(usize) -> *mut c_void = std::mem::transmute(original);
        f(size)
    }
}

fn recalloc_impl<A: Scaffold>(ptr: *mut c_void, nmemb: usize, size: usize) -> *mut c_void {
    let allocator = A::active();
    let bridge = A::bridge();
    let old_size = if ptr.is_null() {
        0
    } else {
        bridge.usable_size(allocator, ptr as *mut u8)
    };
    let new_ptr =
        wrappers::reallocate_array(&bridge, allocator, ptr as *mut u8, nmemb, size);
    if !new_ptr.is_null() {
        let new_total = nmemb.saturating_mul(size);
        if new_total > old_size {
            unsafe {
                std::ptr::write_bytes(new_ptr.add(old_size), 0, new_total - old_size);
            }
        }
    }
    new_ptr as *mut c_void
}

fn aligned_realloc_impl<A: Scaffold>(
    ptr: *mut c_void,
    size: usize,
    alignment: usize,
) -> *mut c_void {
    let allocator = A::active();
    let bridge = A::bridge();
    if size == 0 {
        bridge.release(allocator, ptr as *mut u8);
        return std::ptr::null_mut();
    }
    let new_ptr = bridge.aligned_allocate(allocator, alignment, size);
    if !new_ptr.is_null() && !ptr.is_null() {
        let old_size = bridge.usable_size(allocator, ptr as *mut u8);
        let copy_len = old_size.min(size);
        unsafe {
            std::ptr::copy_nonoverlapping(ptr as *const u8, new_ptr, copy_len);
        }
        bridge.release(allocator, ptr as *mut u8);
    }
    new_ptr as *mut c_void
}

fn loaded_modules() -> Vec<HMODULE> {
    let mut modules = Vec::new();
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, 0);
        if snapshot == windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE {
            return modules;
        }
        let mut entry: MODULEENTRY32W = std::mem::zeroed();
        entry.dwSize = std::mem::size_of::<MODULEENTRY32W>() as u32;
        if Module32FirstW(snapshot, &mut entry) != 0 {
            loop {
                modules.push(entry.hModule);
                if Module32NextW(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }
        CloseHandle(snapshot);
    }
    modules
}

/// # Safety
/// `module` must be a valid base address of a currently-mapped PE image.
unsafe fn patch_module_imports(
    module: HMODULE,
    shims: &[(&'static str, usize)],
    out: &mut Vec<PatchedSlot>,
) {
    let base = module as *const u8;

    let dos = unsafe { &*(base as *const IMAGE_DOS_HEADER) };
    if dos.e_magic != IMAGE_DOS_SIGNATURE {
        return;
    }
    let nt = unsafe { &*(base.add(dos.e_lfanew as usize) as *const IMAGE_NT_HEADERS64) };

    let import_dir =
        nt.OptionalHeader.DataDirectory[IMAGE_DIRECTORY_ENTRY_IMPORT as usize];
    if import_dir.VirtualAddress == 0 {
        return;
    }

    let mut descriptor =
        base.add(import_dir.VirtualAddress as usize) as *const IMAGE_IMPORT_DESCRIPTOR;

    loop {
        let desc = unsafe { &*descriptor };
        if desc.Name == 0 && desc.FirstThunk == 0 {
            break;
        }

        let dll_name_ptr = unsafe { base.add(desc.Name as usize) as *const i8 };
        let dll_name = unsafe { CStr::from_ptr(dll_name_ptr) }
            .to_str()
            .unwrap_or("")
            .to_ascii_lowercase();

        if CRT_MODULE_NAMES.iter().any(|n| *n == dll_name) {
            unsafe {
                patch_descriptor(base, desc, shims, out);
            }
        }

        descriptor = unsafe { descriptor.add(1) };
    }
}

/// # Safety
/// `base` and `desc` must describe a live, currently-mapped import descriptor.
unsafe fn patch_descriptor(
    base: *const u8,
    desc: &IMAGE_IMPORT_DESCRIPTOR,
    shims: &[(&'static str, usize)],
    out: &mut Vec<PatchedSlot>,
) {
    let first_thunk = desc.FirstThunk;
    let name_thunk = unsafe { desc.Anonymous.OriginalFirstThunk };
    let name_thunk = if name_thunk != 0 { name_thunk } else { first_thunk };

    let mut name_entry = base.add(name_thunk as usize) as *const IMAGE_THUNK_DATA64;
    let mut iat_entry = base.add(first_thunk as usize) as *mut usize;

    loop {
        let thunk = unsafe { &*name_entry };
        let ordinal_or_name = unsafe { thunk.u1.AddressOfData };
        if ordinal_or_name == 0 {
            break;
        }
        // High bit set means import-by-ordinal; we only match by name.
        if ordinal_or_name & (1u64 << 63) == 0 {
            let import_by_name_ptr = base.add(ordinal_or_name as usize + 2) as *const i8;
            let name = unsafe { CStr::from_ptr(import_by_name_ptr) }
                .to_str()
                .unwrap_or("");

            if PATCHED_NAMES.contains(&name) {
                if let Some((_, shim_addr)) = shims.iter().find(|(n, _)| *n == name) {
                    let original = unsafe { std::ptr::read(iat_entry) };
                    unsafe {
                        write_iat_entry(iat_entry, *shim_addr);
                    }
                    out.push(PatchedSlot {
                        iat_entry,
                        original,
                    });
                }
            }
        }

        name_entry = unsafe { name_entry.add(1) };
        iat_entry = unsafe { iat_entry.add(1) };
    }
}

/// # Safety
/// `entry` must point to a live IAT slot within a mapped, writable-after-
/// `VirtualProtect` image section.
unsafe fn write_iat_entry(entry: *mut usize, value: usize) {
    let mut old_protect = PAGE_PROTECTION_FLAGS(0);
    let size = std::mem::size_of::<usize>();
    unsafe {
        VirtualProtect(
            entry as *mut c_void,
            size,
            PAGE_EXECUTE_READWRITE,
            &mut old_protect,
        );
        std::ptr::write(entry, value);
        VirtualProtect(entry as *mut c_void, size, old_protect, &mut old_protect);
    }
}
