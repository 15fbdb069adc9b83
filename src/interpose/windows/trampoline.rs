//! Inline-hook trampoline patching, an alternate sub-strategy for the
//! in-process-patching variant: overwrite the CRT allocation functions' own
//! prologues with an absolute
//! jump into our shims, rather than rewriting import tables.
//!
//! This reaches callers the IAT-redirect strategy cannot: a module whose
//! import was already resolved and cached by the loader before we ran still
//! calls through the same function address, so patching that address
//! directly catches it too. The cost is needing a contiguous, safely
//! relocatable prologue at the target — this implementation writes a 14-byte
//! absolute-jump stub (`FF 25 00 00 00 00` + 8-byte target address) and
//! therefore requires the target function to have at least 14 bytes of
//! instructions before its first branch; it does not disassemble to verify
//! that, which real production hooking engines (Detours-style length
//! disassemblers) do and this does not attempt to reproduce.

use std::ffi::c_void;
use std::sync::Mutex;

use windows_sys::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleA, GetProcAddress};
use windows_sys::Win32::System::Memory::{VirtualProtect, PAGE_EXECUTE_READWRITE};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use crate::scaffold::Scaffold;

const STUB_LEN: usize = 14;
const CRT_MODULES: &[&str] = &["ucrtbase.dll\0", "msvcrt.dll\0"];
const PATCHED_NAMES: &[&str] = &["malloc\0", "free\0", "calloc\0", "realloc\0"];

struct Patch {
    target: *mut u8,
    original_bytes: [u8; STUB_LEN],
}

unsafe impl Send for Patch {}

static PATCHES: Mutex<Vec<Patch>> = Mutex::new(Vec::new());

pub fn is_installed() -> bool {
    !PATCHES.lock().unwrap().is_empty()
}

/// Resolves and patches each CRT allocation function this process has loaded.
/// Returns `false` without patching anything if no supported CRT module is
/// currently mapped (nothing to hook yet).
pub fn install<A: Scaffold>() -> bool {
    let shims = shim_addresses::<A>();
    let mut installed_any = false;

    for crt_module in CRT_MODULES {
        let handle = unsafe { GetModuleHandleA(crt_module.as_ptr()) };
        if handle == 0 {
            continue;
        }
        for name in PATCHED_NAMES {
            let Some(proc_addr) = unsafe { resolve(handle, name) } else {
                continue;
            };
            let Some((_, shim)) = shims
                .iter()
                .find(|(n, _)| n.trim_end_matches('\0') == name.trim_end_matches('\0'))
            else {
                continue;
            };
            unsafe {
                patch_one(proc_addr, *shim);
            }
            installed_any = true;
        }
    }

    installed_any
}

pub fn uninstall() {
    let mut patches = PATCHES.lock().unwrap();
    for patch in patches.drain(..) {
        unsafe {
            write_bytes(patch.target, &patch.original_bytes);
        }
    }
}

unsafe fn resolve(handle: windows_sys::Win32::Foundation::HMODULE, name: &str) -> Option<*mut u8> {
    let addr = unsafe { GetProcAddress(handle, name.as_ptr()) };
    addr.map(|f| f as usize as *mut u8)
}

fn shim_addresses<A: Scaffold>() -> [(&'static str, usize); 4] {
    unsafe extern "C" fn shim_malloc<A: Scaffold>(size: usize) -> *mut c_void {
        super::malloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_free<A: Scaffold>(ptr: *mut c_void) {
        super::free_impl::<A>(ptr)
    }
    unsafe extern "C" fn shim_calloc<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
        super::calloc_impl::<A>(nmemb, size)
    }
    unsafe extern "C" fn shim_realloc<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
        super::realloc_impl::<A>(ptr, size)
    }

    [
        ("malloc\0", shim_malloc::<A> as usize),
        ("free\0", shim_free::<A> as usize),
        ("calloc\0", shim_calloc::<A> as usize),
        ("realloc\0", shim_realloc::<A> as usize),
    ]
}

/// # Safety
/// `target` must point to at least `STUB_LEN` writable-after-`VirtualProtect`
/// bytes belonging to a function whose first `STUB_LEN` bytes are safe to
/// replace wholesale (see module docs on the length-disassembly gap).
unsafe fn patch_one(target: *mut u8, shim: usize) {
    let mut original_bytes = [0u8; STUB_LEN];
    unsafe {
        std::ptr::copy_nonoverlapping(target, original_bytes.as_mut_ptr(), STUB_LEN);
    }

    let mut stub = [0u8; STUB_LEN];
    stub[0] = 0xFF;
    stub[1] = 0x25;
    // bytes 2..6 stay zero: `jmp qword ptr [rip+0]` reads the address
    // immediately following the instruction.
    stub[6..14].copy_from_slice(&shim.to_le_bytes());

    unsafe {
        write_bytes(target, &stub);
    }

    PATCHES.lock().unwrap().push(Patch {
        target,
        original_bytes,
    });
}

/// # Safety
/// `target` must point to `bytes.len()` bytes that are safe to overwrite.
unsafe fn write_bytes(target: *mut u8, bytes: &[u8]) {
    let mut old_protect = 0u32;
    unsafe {
        VirtualProtect(
            target as *mut c_void,
            bytes.len(),
            PAGE_EXECUTE_READWRITE,
            &mut old_protect,
        );
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), target, bytes.len());
        VirtualProtect(target as *mut c_void, bytes.len(), old_protect, &mut old_protect);
        FlushInstructionCache(GetCurrentProcess(), target as *const c_void, bytes.len());
    }
}
