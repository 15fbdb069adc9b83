//! Variant A: strong-symbol-alias interposition, for Linux and other
//! ELF/glibc-family targets.
//!
//! Defining `malloc`/`free`/... with external linkage in a shared object that
//! is `LD_PRELOAD`ed (or linked ahead of libc) is sufficient on ELF: the
//! dynamic linker's symbol resolution binds every caller, including libc's
//! own internals where they call back through the public entry points, to
//! the first definition it finds. No explicit registration step is needed —
//! only the module-constructor-time fork-safety hookup below.
//!
//! Because this variant installs before the process can have allocated
//! anything through the eventual system allocator, every pointer these
//! functions ever see was produced by this same allocator or is null — the
//! foreign-pointer problem in `foreign.rs` does not apply here.
//!
//! Alongside the public entry points, this module backs the glibc internal
//! aliases (`__libc_malloc` and friends, exported by the `scaffold!` macro)
//! that glibc's own internals call through instead of the public names, and
//! the Itanium-mangled C++ `operator new`/`operator delete` overloads, so a
//! C++ translation unit sharing this binary gets the same allocator too.

use std::ffi::{c_char, c_int, c_void};

use crate::error::AlignError;
use crate::scaffold::Scaffold;
use crate::wrappers::{self, ZeroReallocPolicy};

const EINVAL: c_int = 22;
const ENOMEM: c_int = 12;

/// Registers the fork-safety triad: before `fork()`, acquire every lock
/// the allocator holds; in both the parent and the child immediately after,
/// release them. Installed once, at module-load time, by the `scaffold!`
/// macro's generated constructor.
pub fn install_fork_guard<A: Scaffold>() {
    extern "C" fn prepare<A: Scaffold>() {
        A::active().lock();
    }
    extern "C" fn parent<A: Scaffold>() {
        A::active().unlock();
    }
    extern "C" fn child<A: Scaffold>() {
        A::active().unlock();
    }

    unsafe {
        libc::pthread_atfork(Some(prepare::<A>), Some(parent::<A>), Some(child::<A>));
    }
}

/// # Safety
/// Exported as `malloc`; the ABI contract is the standard one.
pub unsafe extern "C" fn malloc<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.allocate(A::active(), size) as *mut c_void
}

/// # Safety
/// `ptr` must be null or a pointer this bridge previously returned.
pub unsafe extern "C" fn free<A: Scaffold>(ptr: *mut c_void) {
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}

/// # Safety
/// Exported as `calloc`.
pub unsafe extern "C" fn calloc<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::zeroed_allocate(&bridge, A::active(), nmemb, size) as *mut c_void
}

/// # Safety
/// `ptr` must be null or a pointer this bridge previously returned.
pub unsafe extern "C" fn realloc<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::reallocate_wrapper(
        &bridge,
        A::active(),
        ptr as *mut u8,
        size,
        ZeroReallocPolicy::ReleaseAndNull,
    ) as *mut c_void
}

/// # Safety
/// `ptr` must be null or a pointer this bridge previously returned.
pub unsafe extern "C" fn reallocarray<A: Scaffold>(
    ptr: *mut c_void,
    nmemb: usize,
    size: usize,
) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::reallocate_array(&bridge, A::active(), ptr as *mut u8, nmemb, size) as *mut c_void
}

/// # Safety
/// `memptr` must point to a writable `*mut c_void`.
pub unsafe extern "C" fn posix_memalign<A: Scaffold>(
    memptr: *mut *mut c_void,
    alignment: usize,
    size: usize,
) -> c_int {
    let bridge = A::bridge();
    let mut out: *mut u8 = std::ptr::null_mut();
    match wrappers::posix_aligned(&bridge, A::active(), &mut out, alignment, size) {
        Ok(()) => {
            if out.is_null() {
                ENOMEM
            } else {
                unsafe { *memptr = out as *mut c_void };
                0
            }
        }
        Err(AlignError::NotPowerOfTwo | AlignError::NotPointerMultiple) => EINVAL,
        Err(AlignError::SizeNotMultipleOfAlign) => EINVAL,
    }
}

/// # Safety
/// Exported as `aligned_alloc`.
pub unsafe extern "C" fn aligned_alloc<A: Scaffold>(alignment: usize, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::c11_aligned(&bridge, A::active(), alignment, size) as *mut c_void
}

/// # Safety
/// Exported as `valloc`.
pub unsafe extern "C" fn valloc<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::page_aligned_alloc(&bridge, A::active(), size, crate::sys::page_size()) as *mut c_void
}

/// # Safety
/// Exported as `pvalloc`.
pub unsafe extern "C" fn pvalloc<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::pvalloc(&bridge, A::active(), size, crate::sys::page_size()) as *mut c_void
}

/// # Safety
/// `s` must be a valid NUL-terminated C string.
pub unsafe extern "C" fn strdup<A: Scaffold>(s: *const c_char) -> *mut c_char {
    let bridge = A::bridge();
    unsafe { wrappers::string_duplicate(&bridge, A::active(), s) }
}

/// # Safety
/// `s` must be readable for at least `n` bytes or NUL-terminated within them.
pub unsafe extern "C" fn strndup<A: Scaffold>(s: *const c_char, n: usize) -> *mut c_char {
    let bridge = A::bridge();
    unsafe { wrappers::bounded_string_duplicate(&bridge, A::active(), s, n) }
}

/// # Safety
/// Exported as `memalign`. Unlike `aligned_alloc`, glibc's `memalign` imposes
/// no constraint relating `size` to `alignment`.
pub unsafe extern "C" fn memalign<A: Scaffold>(alignment: usize, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.aligned_allocate(A::active(), alignment, size) as *mut c_void
}

/// # Safety
/// Exported as `malloc_usable_size`, the public face of the Bridge's
/// `usable_size` operation. `ptr` must be null or a pointer this bridge
/// previously returned.
pub unsafe extern "C" fn malloc_usable_size<A: Scaffold>(ptr: *mut c_void) -> usize {
    let bridge = A::bridge();
    bridge.usable_size(A::active(), ptr as *mut u8)
}

/// # Safety
/// Exported as `cfree`, the historical BSD alias for `free`.
pub unsafe extern "C" fn cfree<A: Scaffold>(ptr: *mut c_void) {
    unsafe { free::<A>(ptr) }
}

/// # Safety
/// `start_routine` and `arg` are handed unchanged to the real thread, boxed
/// together so the notification hooks can run around it.
pub unsafe extern "C" fn pthread_create<A: Scaffold>(
    thread_out: *mut libc::pthread_t,
    attr: *const libc::pthread_attr_t,
    start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> c_int {
    extern "C" fn trampoline<A: Scaffold>(raw: *mut c_void) -> *mut c_void {
        unsafe {
            crate::thread::run_trampoline(raw as *mut crate::thread::ThreadTrampolineArgs<A>)
        }
    }

    let boxed = Box::new(crate::thread::ThreadTrampolineArgs::new(
        A::active(),
        start_routine,
        arg,
    ));
    let raw = Box::into_raw(boxed) as *mut c_void;
    unsafe { libc::pthread_create(thread_out, attr, trampoline::<A>, raw) }
}

/// `operator new(size_t)`. Never returns null on the Itanium ABI in
/// principle (callers expect a `bad_alloc` throw instead); this scaffold has
/// no exception machinery to throw through, so it follows the rest of this
/// crate's contract and returns null on exhaustion like every other entry
/// point here.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator new(size_t)`.
pub unsafe extern "C" fn operator_new<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.allocate(A::active(), size) as *mut c_void
}

/// `operator new[](size_t)`.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator new[](size_t)`.
pub unsafe extern "C" fn operator_new_array<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.allocate(A::active(), size) as *mut c_void
}

/// `operator delete(void*)`.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator delete(void*)`.
pub unsafe extern "C" fn operator_delete<A: Scaffold>(ptr: *mut c_void) {
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}

/// `operator delete[](void*)`.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator delete[](void*)`.
pub unsafe extern "C" fn operator_delete_array<A: Scaffold>(ptr: *mut c_void) {
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}

/// `operator delete(void*, size_t)`, the C++14 sized-delete overload. The
/// size is advisory only: release never needs it, since the allocator tracks
/// its own sizes.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator delete(void*, size_t)`.
pub unsafe extern "C" fn operator_delete_sized<A: Scaffold>(ptr: *mut c_void, size: usize) {
    let _ = size;
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}

/// `operator delete[](void*, size_t)`.
///
/// # Safety
/// Exported under the Itanium-mangled name for `operator delete[](void*, size_t)`.
pub unsafe extern "C" fn operator_delete_array_sized<A: Scaffold>(ptr: *mut c_void, size: usize) {
    let _ = size;
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}
