//! Variant C: in-process patching, for Windows.
//!
//! Unlike the ELF and Mach-O variants, this one attaches *after* the process
//! may already be holding pointers handed out by the CRT's own allocator —
//! there is no link-time or load-time hook point that guarantees otherwise on
//! Windows. Every entry point here therefore runs pointers through
//! `foreign::classify` before doing anything destructive with them.
//!
//! Two sub-strategies are implemented, both exposed so a deployment can pick:
//!
//! - [`early_redirect`]: walks the process's loaded modules and rewrites each
//!   one's import address table so calls to the CRT's `malloc`/`free`/...
//!   resolve to our shims instead. This is the default: it never has to
//!   reason about in-flight calls on another thread, and it
//!   sidesteps length-disassembly entirely.
//! - [`trampoline`]: patches the first bytes of the target functions
//!   themselves with an absolute jump to our shim. This works even against
//!   modules whose import table was already bound and cached, at the cost of
//!   needing a safe window to install the patch and enough prologue bytes to
//!   overwrite — both assumptions the module documents rather than proves.
//!
//! `on_dll_main` is what the `scaffold!` macro wires up as the crate's
//! `DllMain`, enabling the default strategy on process attach and feeding
//! thread attach/detach notifications to the Thread Lifecycle Controller.

use std::ffi::c_void;

use windows_sys::Win32::Foundation::{BOOL, HINSTANCE, TRUE};
use windows_sys::Win32::System::SystemServices::{
    DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH, DLL_THREAD_ATTACH, DLL_THREAD_DETACH,
};

use crate::foreign::{self, Provenance};
use crate::scaffold::Scaffold;
use crate::sys;
use crate::thread;
use crate::wrappers::{self, ZeroReallocPolicy};

pub mod early_redirect;
pub mod trampoline;

/// The crate's `DllMain`, wired up by the `scaffold!` macro.
pub fn on_dll_main<A: Scaffold>(module: HINSTANCE, reason: u32) -> BOOL {
    match reason {
        DLL_PROCESS_ATTACH => {
            let _ = module;
            early_redirect::enable::<A>();
        }
        DLL_PROCESS_DETACH => {
            early_redirect::disable();
        }
        DLL_THREAD_ATTACH => {
            thread::on_thread_start(A::active());
        }
        DLL_THREAD_DETACH => {
            thread::on_thread_exit(A::active());
        }
        _ => {}
    }
    TRUE
}

pub(super) fn malloc_impl<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.allocate(A::active(), size) as *mut c_void
}

pub(super) fn free_impl<A: Scaffold>(ptr: *mut c_void) {
    let allocator = A::active();
    let bridge = A::bridge();
    match foreign::classify(allocator, ptr as *mut u8) {
        Provenance::Owned => bridge.release(allocator, ptr as *mut u8),
        // Foreign pointers predate interposition: we never allocated them, so
        // there is nothing correct to do but leave them alone.
        Provenance::Foreign => {}
    }
}

pub(super) fn calloc_impl<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::zeroed_allocate(&bridge, A::active(), nmemb, size) as *mut c_void
}

pub(super) fn realloc_impl<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
    let allocator = A::active();
    let bridge = A::bridge();
    match foreign::classify(allocator, ptr as *mut u8) {
        Provenance::Owned => wrappers::reallocate_wrapper(
            &bridge,
            allocator,
            ptr as *mut u8,
            size,
            ZeroReallocPolicy::ReleaseAndMinimal,
        ) as *mut c_void,
        // A foreign pointer can't be resized in place or freed safely (we
        // don't know its real size), but its caller still expects its
        // contents preserved: allocate fresh and best-effort copy, bounded by
        // how many bytes past `ptr` are actually resident, then leave the
        // original block alone (it is never freed here).
        Provenance::Foreign => {
            let new_ptr = bridge.allocate(allocator, size);
            if !new_ptr.is_null() {
                let readable =
                    unsafe { sys::probe_readable_len(ptr as *const u8, size) };
                if readable > 0 {
                    unsafe {
                        std::ptr::copy_nonoverlapping(ptr as *const u8, new_ptr, readable);
                    }
                }
            }
            new_ptr as *mut c_void
        }
    }
}

pub(super) fn size_impl<A: Scaffold>(ptr: *mut c_void) -> usize {
    let allocator = A::active();
    match foreign::classify(allocator, ptr as *mut u8) {
        Provenance::Owned => allocator.size_of(ptr as *mut u8),
        Provenance::Foreign => 0,
    }
}
