//! The macro boundary: the one place a concrete allocator type is ever named.
//!
//! Every platform interceptor and wrapper function in this crate is generic
//! over `A: Allocator`; none of them own a `&'static A` themselves. This
//! trait is how they get one anyway without the crate learning the concrete
//! type: the [`scaffold!`] macro, invoked once in the downstream crate,
//! implements `Scaffold` for that crate's allocator type, backed by a
//! `Singleton` the macro also defines. Everything upstream of the macro calls
//! `A::active()` generically; only the macro's expansion says which `A`.

use crate::bridge::Bridge;
use crate::contract::Allocator;

/// Supplies process-wide access to the allocator a downstream crate has
/// bound with [`scaffold!`]. Implemented exactly once per binary.
pub trait Scaffold: Allocator + Sized {
    /// The process-wide instance, constructing it on first access.
    fn active() -> &'static Self;

    /// A fresh `Bridge` handle. Zero-sized, so "fresh" costs nothing.
    fn bridge() -> Bridge<Self> {
        Bridge::new()
    }
}

/// Binds a concrete allocator type to the scaffold: defines the process-wide
/// singleton, implements [`Scaffold`] for it, and re-exports the platform's
/// `#[no_mangle]` entry points as thin calls into the generic interceptor
/// functions.
///
/// ```ignore
/// struct MyAllocator { /* ... */ }
/// unsafe impl alloc_scaffold::contract::Allocator for MyAllocator { /* ... */ }
///
/// alloc_scaffold::scaffold!(MyAllocator, MyAllocator::new);
/// ```
///
/// After this expands, the crate that invoked it exports `malloc`, `free`,
/// and the rest of the standard allocation surface for whichever platform it
/// was built on; nothing else in the crate graph needs to know `MyAllocator`
/// exists.
#[macro_export]
macro_rules! scaffold {
    ($ty:ty, $init:expr) => {
        static __SCAFFOLD_SINGLETON: $crate::bridge::Singleton<$ty> =
            $crate::bridge::Singleton::new($init);

        impl $crate::scaffold::Scaffold for $ty {
            fn active() -> &'static Self {
                __SCAFFOLD_SINGLETON.get()
            }
        }

        // Forces the allocator singleton to construct at load time (marking
        // `allocator_ready`), then flips `hooks_ready` immediately after —
        // strictly ordered, since both happen in this one constructor body,
        // so no thread creation hook installed below this point can ever
        // observe `hooks_ready` true before `allocator_ready`.
        #[ctor::ctor]
        fn __scaffold_mark_hooks_ready() {
            let _ = <$ty as $crate::scaffold::Scaffold>::active();
            $crate::thread::mark_hooks_ready();
        }

        $crate::__scaffold_export_elf!($ty);
        $crate::__scaffold_export_macho!($ty);
        $crate::__scaffold_export_windows!($ty);
    };
}

#[doc(hidden)]
#[cfg(all(unix, not(target_os = "macos")))]
#[macro_export]
macro_rules! __scaffold_export_elf {
    ($ty:ty) => {
        #[ctor::ctor]
        fn __scaffold_install_fork_guard() {
            $crate::interpose::elf::install_fork_guard::<$ty>();
        }

        #[no_mangle]
        pub unsafe extern "C" fn malloc(size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::malloc::<$ty>(size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn free(ptr: *mut std::ffi::c_void) {
            $crate::interpose::elf::free::<$ty>(ptr)
        }

        #[no_mangle]
        pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::calloc::<$ty>(nmemb, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn realloc(
            ptr: *mut std::ffi::c_void,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::realloc::<$ty>(ptr, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn reallocarray(
            ptr: *mut std::ffi::c_void,
            nmemb: usize,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::reallocarray::<$ty>(ptr, nmemb, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn posix_memalign(
            memptr: *mut *mut std::ffi::c_void,
            alignment: usize,
            size: usize,
        ) -> std::ffi::c_int {
            $crate::interpose::elf::posix_memalign::<$ty>(memptr, alignment, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn aligned_alloc(
            alignment: usize,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::aligned_alloc::<$ty>(alignment, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn valloc(size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::valloc::<$ty>(size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn pvalloc(size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::pvalloc::<$ty>(size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn strdup(s: *const std::ffi::c_char) -> *mut std::ffi::c_char {
            $crate::interpose::elf::strdup::<$ty>(s)
        }

        #[no_mangle]
        pub unsafe extern "C" fn strndup(
            s: *const std::ffi::c_char,
            n: usize,
        ) -> *mut std::ffi::c_char {
            $crate::interpose::elf::strndup::<$ty>(s, n)
        }

        #[no_mangle]
        pub unsafe extern "C" fn memalign(alignment: usize, size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::memalign::<$ty>(alignment, size)
        }

        #[no_mangle]
        pub unsafe extern "C" fn malloc_usable_size(ptr: *mut std::ffi::c_void) -> usize {
            $crate::interpose::elf::malloc_usable_size::<$ty>(ptr)
        }

        #[no_mangle]
        pub unsafe extern "C" fn cfree(ptr: *mut std::ffi::c_void) {
            $crate::interpose::elf::cfree::<$ty>(ptr)
        }

        #[no_mangle]
        pub unsafe extern "C" fn pthread_create(
            thread: *mut libc::pthread_t,
            attr: *const libc::pthread_attr_t,
            start_routine: extern "C" fn(*mut std::ffi::c_void) -> *mut std::ffi::c_void,
            arg: *mut std::ffi::c_void,
        ) -> std::ffi::c_int {
            $crate::interpose::elf::pthread_create::<$ty>(thread, attr, start_routine, arg)
        }

        // glibc's internal entry points: its own public malloc/free/calloc/
        // realloc call through these, so they must alias the same
        // definitions rather than fall through to the real libc (which this
        // shared object is meant to replace, not merely wrap).
        #[export_name = "__libc_malloc"]
        pub unsafe extern "C" fn __scaffold_libc_malloc(size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::malloc::<$ty>(size)
        }

        #[export_name = "__libc_free"]
        pub unsafe extern "C" fn __scaffold_libc_free(ptr: *mut std::ffi::c_void) {
            $crate::interpose::elf::free::<$ty>(ptr)
        }

        #[export_name = "__libc_calloc"]
        pub unsafe extern "C" fn __scaffold_libc_calloc(
            nmemb: usize,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::calloc::<$ty>(nmemb, size)
        }

        #[export_name = "__libc_realloc"]
        pub unsafe extern "C" fn __scaffold_libc_realloc(
            ptr: *mut std::ffi::c_void,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::realloc::<$ty>(ptr, size)
        }

        #[export_name = "__libc_memalign"]
        pub unsafe extern "C" fn __scaffold_libc_memalign(
            alignment: usize,
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::memalign::<$ty>(alignment, size)
        }

        // C++ operator new/delete, exported under their Itanium-mangled
        // names so a C++ translation unit linked into the same binary picks
        // these up the same way it would the real libstdc++/libc++ symbols.
        #[export_name = "_Znwm"]
        pub unsafe extern "C" fn __scaffold_operator_new(size: usize) -> *mut std::ffi::c_void {
            $crate::interpose::elf::operator_new::<$ty>(size)
        }

        #[export_name = "_Znam"]
        pub unsafe extern "C" fn __scaffold_operator_new_array(
            size: usize,
        ) -> *mut std::ffi::c_void {
            $crate::interpose::elf::operator_new_array::<$ty>(size)
        }

        #[export_name = "_ZdlPv"]
        pub unsafe extern "C" fn __scaffold_operator_delete(ptr: *mut std::ffi::c_void) {
            $crate::interpose::elf::operator_delete::<$ty>(ptr)
        }

        #[export_name = "_ZdaPv"]
        pub unsafe extern "C" fn __scaffold_operator_delete_array(ptr: *mut std::ffi::c_void) {
            $crate::interpose::elf::operator_delete_array::<$ty>(ptr)
        }

        #[export_name = "_ZdlPvm"]
        pub unsafe extern "C" fn __scaffold_operator_delete_sized(
            ptr: *mut std::ffi::c_void,
            size: usize,
        ) {
            $crate::interpose::elf::operator_delete_sized::<$ty>(ptr, size)
        }

        #[export_name = "_ZdaPvm"]
        pub unsafe extern "C" fn __scaffold_operator_delete_array_sized(
            ptr: *mut std::ffi::c_void,
            size: usize,
        ) {
            $crate::interpose::elf::operator_delete_array_sized::<$ty>(ptr, size)
        }
    };
}

#[doc(hidden)]
#[cfg(not(all(unix, not(target_os = "macos"))))]
#[macro_export]
macro_rules! __scaffold_export_elf {
    ($ty:ty) => {};
}

#[doc(hidden)]
#[cfg(target_os = "macos")]
#[macro_export]
macro_rules! __scaffold_export_macho {
    ($ty:ty) => {
        #[ctor::ctor]
        fn __scaffold_install_interpose_table() {
            $crate::interpose::macho::install::<$ty>();
        }

        // `malloc_printf`'s real signature is variadic; Rust cannot define a
        // variadic `extern "C"` function on stable, so this accepts only the
        // format-string argument. Nothing in this crate ever calls it with
        // trailing arguments — it exists so the symbol resolves at all for a
        // caller that merely checks for its presence.
        #[no_mangle]
        pub unsafe extern "C" fn malloc_printf(_format: *const std::ffi::c_char) {}
    };
}

#[doc(hidden)]
#[cfg(not(target_os = "macos"))]
#[macro_export]
macro_rules! __scaffold_export_macho {
    ($ty:ty) => {};
}

#[doc(hidden)]
#[cfg(windows)]
#[macro_export]
macro_rules! __scaffold_export_windows {
    ($ty:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn DllMain(
            module: windows_sys::Win32::Foundation::HINSTANCE,
            reason: u32,
            _reserved: *mut std::ffi::c_void,
        ) -> windows_sys::Win32::Foundation::BOOL {
            $crate::interpose::windows::on_dll_main::<$ty>(module, reason)
        }
    };
}

#[doc(hidden)]
#[cfg(not(windows))]
#[macro_export]
macro_rules! __scaffold_export_windows {
    ($ty:ty) => {};
}
