//! Variant B: Mach-O interposition for macOS, combining the `__DATA,__interpose`
//! section mechanism with a registered `malloc_zone_t`.
//!
//! Mach-O interposition is not symbol-name based like the ELF variant: the
//! dynamic linker scans every loaded image's `__DATA,__interpose` section for
//! `(replacement, original)` function-pointer pairs and rewrites call sites
//! system-wide to go through `replacement` instead. The replacement functions
//! below are therefore deliberately *not* named `malloc`/`free`/... —
//! exporting those names directly would just create a second, competing
//! definition rather than an interposition.
//!
//! That covers every call site resolved through the public C names, but
//! macOS's allocator is also reachable through a second, parallel surface:
//! the `malloc_zone_t` a caller gets back from `malloc_default_zone()` and
//! dispatches through explicitly (`malloc_zone_malloc(zone, size)` and
//! friends), which some libraries and Instruments' own heap tooling use
//! instead of the bare C names. `install::<A>` builds a full `malloc_zone_t`
//! + `malloc_introspection_t` pair for this allocator, registers it, and
//! takes over the process's pre-existing default zone in place so both
//! surfaces land on the same Bridge.
//!
//! `install::<A>` places the interpose table in a local `static` inside a
//! generic function body, which Rust monomorphizes once per concrete `A` —
//! exactly the one-table-per-binary the mechanism needs, without this module
//! ever naming `A` at the module level. The zone and its introspection
//! struct are built the same way and leaked for the process lifetime.
//!
//! Because, like the ELF variant, this installs before the target process
//! has had a chance to allocate through anything but the original zone, every
//! pointer reaching these functions after installation was produced by this
//! same allocator or is null; `foreign.rs` is not needed here either.

use std::ffi::{c_char, c_int, c_void, CString};
use std::sync::OnceLock;

use crate::error::AlignError;
use crate::scaffold::Scaffold;
use crate::wrappers::{self, ZeroReallocPolicy};

const EINVAL: c_int = 22;
const ENOMEM: c_int = 12;

#[repr(C)]
struct Interpose {
    replacement: *const c_void,
    original: *const c_void,
}

unsafe impl Sync for Interpose {}

/// Mirrors the layout of libSystem's `malloc_statistics_t`.
#[repr(C)]
struct MallocStatisticsT {
    blocks_in_use: u32,
    size_in_use: usize,
    max_size_in_use: usize,
    size_allocated: usize,
}

type IntrospectGoodSize = unsafe extern "C" fn(*mut MallocZoneT, usize) -> usize;
type IntrospectCheck = unsafe extern "C" fn(*mut MallocZoneT) -> c_int;
type IntrospectPrint = unsafe extern "C" fn(*mut MallocZoneT, c_int);
type IntrospectLog = unsafe extern "C" fn(*mut MallocZoneT, *mut c_void);
type IntrospectLock = unsafe extern "C" fn(*mut MallocZoneT);
type IntrospectStatistics = unsafe extern "C" fn(*mut MallocZoneT, *mut MallocStatisticsT);
type IntrospectZoneLocked = unsafe extern "C" fn(*mut MallocZoneT) -> c_int;

/// A reduced but ABI-positioned `malloc_introspection_t`: the fields every
/// caller in practice actually invokes (`good_size`, `check`, `print`, `log`,
/// `force_lock`/`force_unlock`, `statistics`, `zone_locked`) are real function
/// pointers; the rarer discharge-checking and cross-task introspection
/// fields (used by a remote debugger walking another process's heap over a
/// Mach port) are left null, since nothing in this crate's single-process
/// model can serve them.
#[repr(C)]
struct MallocIntrospectionT {
    enumerator: *const c_void,
    good_size: IntrospectGoodSize,
    check: IntrospectCheck,
    print: IntrospectPrint,
    log: IntrospectLog,
    force_lock: IntrospectLock,
    force_unlock: IntrospectLock,
    statistics: IntrospectStatistics,
    zone_locked: IntrospectZoneLocked,
    enable_discharge_checking: *const c_void,
    disable_discharge_checking: *const c_void,
    discharge: *const c_void,
    enumerate_discharged_pointers: *const c_void,
    reinit_lock: *const c_void,
    print_task: *const c_void,
    task_statistics: *const c_void,
}

unsafe impl Sync for MallocIntrospectionT {}

type ZoneSize = unsafe extern "C" fn(*mut MallocZoneT, *const c_void) -> usize;
type ZoneMalloc = unsafe extern "C" fn(*mut MallocZoneT, usize) -> *mut c_void;
type ZoneCalloc = unsafe extern "C" fn(*mut MallocZoneT, usize, usize) -> *mut c_void;
type ZoneValloc = unsafe extern "C" fn(*mut MallocZoneT, usize) -> *mut c_void;
type ZoneFree = unsafe extern "C" fn(*mut MallocZoneT, *mut c_void);
type ZoneRealloc = unsafe extern "C" fn(*mut MallocZoneT, *mut c_void, usize) -> *mut c_void;
type ZoneDestroy = extern "C" fn(*mut MallocZoneT);
type ZoneBatchMalloc =
    unsafe extern "C" fn(*mut MallocZoneT, usize, *mut *mut c_void, u32) -> u32;
type ZoneBatchFree = unsafe extern "C" fn(*mut MallocZoneT, *mut *mut c_void, u32);
type ZoneMemalign = unsafe extern "C" fn(*mut MallocZoneT, usize, usize) -> *mut c_void;
type ZoneFreeDefiniteSize = unsafe extern "C" fn(*mut MallocZoneT, *mut c_void, usize);
type ZonePressureRelief = extern "C" fn(*mut MallocZoneT, usize) -> usize;
type ZoneClaimedAddress = extern "C" fn(*mut MallocZoneT, *mut c_void) -> c_int;

/// Mirrors the field order of libSystem's modern (post-10.6) `malloc_zone_t`:
/// no reserved leading fields, `size`/`malloc`/`calloc`/`valloc`/`free`/
/// `realloc`/`destroy`/`zone_name` first, then the batch and introspection
/// surface, then the fields added for `memalign`, `free_definite_size`,
/// `pressure_relief`, and `claimed_address`.
#[repr(C)]
struct MallocZoneT {
    size: ZoneSize,
    malloc: ZoneMalloc,
    calloc: ZoneCalloc,
    valloc: ZoneValloc,
    free: ZoneFree,
    realloc: ZoneRealloc,
    destroy: ZoneDestroy,
    zone_name: *const c_char,
    batch_malloc: ZoneBatchMalloc,
    batch_free: ZoneBatchFree,
    introspect: *mut MallocIntrospectionT,
    version: u32,
    memalign: ZoneMemalign,
    free_definite_size: ZoneFreeDefiniteSize,
    pressure_relief: ZonePressureRelief,
    claimed_address: ZoneClaimedAddress,
}

unsafe impl Sync for MallocZoneT {}

unsafe extern "C" {
    fn malloc(size: usize) -> *mut c_void;
    fn free(ptr: *mut c_void);
    fn calloc(nmemb: usize, size: usize) -> *mut c_void;
    fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void;
    fn valloc(size: usize) -> *mut c_void;
    fn strdup(s: *const c_char) -> *mut c_char;
    fn strndup(s: *const c_char, n: usize) -> *mut c_char;
    fn reallocarray(ptr: *mut c_void, nmemb: usize, size: usize) -> *mut c_void;
    fn posix_memalign(memptr: *mut *mut c_void, alignment: usize, size: usize) -> c_int;
    fn aligned_alloc(alignment: usize, size: usize) -> *mut c_void;
    fn pvalloc(size: usize) -> *mut c_void;
    fn memalign(alignment: usize, size: usize) -> *mut c_void;
    fn malloc_usable_size(ptr: *mut c_void) -> usize;
    fn cfree(ptr: *mut c_void);
    fn pthread_create(
        thread: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        start_routine: extern "C" fn(*mut c_void) -> *mut c_void,
        arg: *mut c_void,
    ) -> c_int;

    #[link_name = "_Znwm"]
    fn cxx_operator_new(size: usize) -> *mut c_void;
    #[link_name = "_Znam"]
    fn cxx_operator_new_array(size: usize) -> *mut c_void;
    #[link_name = "_ZdlPv"]
    fn cxx_operator_delete(ptr: *mut c_void);
    #[link_name = "_ZdaPv"]
    fn cxx_operator_delete_array(ptr: *mut c_void);
    #[link_name = "_ZdlPvm"]
    fn cxx_operator_delete_sized(ptr: *mut c_void, size: usize);
    #[link_name = "_ZdaPvm"]
    fn cxx_operator_delete_array_sized(ptr: *mut c_void, size: usize);

    fn malloc_default_zone() -> *mut MallocZoneT;
    fn malloc_default_purgeable_zone() -> *mut MallocZoneT;
    fn malloc_zone_register(zone: *mut MallocZoneT);
    fn malloc_set_zone_name(zone: *mut MallocZoneT, name: *const c_char);

    // Declared only so the interpose table can capture their real addresses
    // as `original`; this module never calls through to them itself.
    fn malloc_create_zone(start_size: usize, flags: u32) -> *mut MallocZoneT;
    fn malloc_destroy_zone(zone: *mut MallocZoneT);
    fn malloc_get_zone_name(zone: *mut MallocZoneT) -> *const c_char;
    fn malloc_get_all_zones(
        task: u32,
        reader: *const c_void,
        addresses: *mut *mut usize,
        count: *mut u32,
    ) -> c_int;
    fn malloc_zone_malloc(zone: *mut MallocZoneT, size: usize) -> *mut c_void;
    fn malloc_zone_calloc(zone: *mut MallocZoneT, nmemb: usize, size: usize) -> *mut c_void;
    fn malloc_zone_realloc(zone: *mut MallocZoneT, ptr: *mut c_void, size: usize) -> *mut c_void;
    fn malloc_zone_valloc(zone: *mut MallocZoneT, size: usize) -> *mut c_void;
    fn malloc_zone_memalign(zone: *mut MallocZoneT, alignment: usize, size: usize) -> *mut c_void;
    fn malloc_zone_free(zone: *mut MallocZoneT, ptr: *mut c_void);
    fn malloc_zone_batch_malloc(
        zone: *mut MallocZoneT,
        size: usize,
        results: *mut *mut c_void,
        num_requested: u32,
    ) -> u32;
    fn malloc_zone_batch_free(zone: *mut MallocZoneT, to_be_freed: *mut *mut c_void, num: u32);
}

/// Builds and installs this binary's interpose table and zone for allocator
/// `A`. Called once, from the `scaffold!` macro's module-constructor.
pub fn install<A: Scaffold>() {
    unsafe extern "C" fn shim_malloc<A: Scaffold>(size: usize) -> *mut c_void {
        malloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_free<A: Scaffold>(ptr: *mut c_void) {
        free_impl::<A>(ptr)
    }
    unsafe extern "C" fn shim_calloc<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
        calloc_impl::<A>(nmemb, size)
    }
    unsafe extern "C" fn shim_realloc<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
        realloc_impl::<A>(ptr, size)
    }
    unsafe extern "C" fn shim_valloc<A: Scaffold>(size: usize) -> *mut c_void {
        valloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_strdup<A: Scaffold>(s: *const c_char) -> *mut c_char {
        unsafe { strdup_impl::<A>(s) }
    }
    unsafe extern "C" fn shim_strndup<A: Scaffold>(s: *const c_char, n: usize) -> *mut c_char {
        unsafe { strndup_impl::<A>(s, n) }
    }
    unsafe extern "C" fn shim_reallocarray<A: Scaffold>(
        ptr: *mut c_void,
        nmemb: usize,
        size: usize,
    ) -> *mut c_void {
        let bridge = A::bridge();
        wrappers::reallocate_array(&bridge, A::active(), ptr as *mut u8, nmemb, size) as *mut c_void
    }
    unsafe extern "C" fn shim_posix_memalign<A: Scaffold>(
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
    unsafe extern "C" fn shim_aligned_alloc<A: Scaffold>(
        alignment: usize,
        size: usize,
    ) -> *mut c_void {
        let bridge = A::bridge();
        wrappers::c11_aligned(&bridge, A::active(), alignment, size) as *mut c_void
    }
    unsafe extern "C" fn shim_pvalloc<A: Scaffold>(size: usize) -> *mut c_void {
        let bridge = A::bridge();
        wrappers::pvalloc(&bridge, A::active(), size, crate::sys::page_size()) as *mut c_void
    }
    unsafe extern "C" fn shim_memalign<A: Scaffold>(alignment: usize, size: usize) -> *mut c_void {
        let bridge = A::bridge();
        bridge.aligned_allocate(A::active(), alignment, size) as *mut c_void
    }
    unsafe extern "C" fn shim_malloc_usable_size<A: Scaffold>(ptr: *mut c_void) -> usize {
        let bridge = A::bridge();
        bridge.usable_size(A::active(), ptr as *mut u8)
    }
    unsafe extern "C" fn shim_cfree<A: Scaffold>(ptr: *mut c_void) {
        free_impl::<A>(ptr)
    }
    unsafe extern "C" fn shim_pthread_create<A: Scaffold>(
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
        unsafe { pthread_create(thread_out, attr, trampoline::<A>, raw) }
    }
    unsafe extern "C" fn shim_operator_new<A: Scaffold>(size: usize) -> *mut c_void {
        malloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_operator_delete<A: Scaffold>(ptr: *mut c_void) {
        free_impl::<A>(ptr)
    }
    unsafe extern "C" fn shim_operator_delete_sized<A: Scaffold>(ptr: *mut c_void, size: usize) {
        let _ = size;
        free_impl::<A>(ptr)
    }

    // The explicit-zone creation/destruction surface: a caller that asks
    // libSystem for an additional zone, or to tear one down, gets routed
    // through this allocator instead. `start_size`/`flags` and the target
    // zone argument are ignored — this crate backs every zone with the same
    // Bridge rather than modeling multiple independent heaps.
    unsafe extern "C" fn shim_create_zone<A: Scaffold>(
        _start_size: usize,
        _flags: u32,
    ) -> *mut MallocZoneT {
        let zone = build_zone::<A>();
        unsafe { malloc_zone_register(zone) };
        zone
    }
    extern "C" fn shim_destroy_zone<A: Scaffold>(_zone: *mut MallocZoneT) {}
    unsafe extern "C" fn shim_get_zone_name<A: Scaffold>(zone: *mut MallocZoneT) -> *const c_char {
        if zone.is_null() {
            std::ptr::null()
        } else {
            unsafe { (*zone).zone_name }
        }
    }
    unsafe extern "C" fn shim_get_all_zones<A: Scaffold>(
        _task: u32,
        _reader: *const c_void,
        addresses: *mut *mut usize,
        count: *mut u32,
    ) -> c_int {
        // Limited to this process's own zone list — there is no cross-task
        // memory reader implemented here, so a remote debugger's reader
        // callback is never invoked.
        if let Some(&zone) = ZONE.get() {
            let slot = Box::leak(Box::new(zone));
            unsafe {
                *addresses = slot as *mut usize;
                *count = 1;
            }
        } else {
            unsafe {
                *addresses = std::ptr::null_mut();
                *count = 0;
            }
        }
        0
    }
    unsafe extern "C" fn shim_zone_malloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
    ) -> *mut c_void {
        malloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_zone_calloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        nmemb: usize,
        size: usize,
    ) -> *mut c_void {
        calloc_impl::<A>(nmemb, size)
    }
    unsafe extern "C" fn shim_zone_realloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        ptr: *mut c_void,
        size: usize,
    ) -> *mut c_void {
        realloc_impl::<A>(ptr, size)
    }
    unsafe extern "C" fn shim_zone_valloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
    ) -> *mut c_void {
        valloc_impl::<A>(size)
    }
    unsafe extern "C" fn shim_zone_memalign<A: Scaffold>(
        _zone: *mut MallocZoneT,
        alignment: usize,
        size: usize,
    ) -> *mut c_void {
        let bridge = A::bridge();
        bridge.aligned_allocate(A::active(), alignment, size) as *mut c_void
    }
    unsafe extern "C" fn shim_zone_free<A: Scaffold>(_zone: *mut MallocZoneT, ptr: *mut c_void) {
        free_impl::<A>(ptr)
    }
    unsafe extern "C" fn shim_zone_batch_malloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
        results: *mut *mut c_void,
        num_requested: u32,
    ) -> u32 {
        let mut filled = 0u32;
        for i in 0..num_requested {
            let ptr = malloc_impl::<A>(size);
            if ptr.is_null() {
                break;
            }
            unsafe { *results.add(i as usize) = ptr };
            filled += 1;
        }
        filled
    }
    unsafe extern "C" fn shim_zone_batch_free<A: Scaffold>(
        _zone: *mut MallocZoneT,
        to_be_freed: *mut *mut c_void,
        num: u32,
    ) {
        for i in 0..num {
            let ptr = unsafe { *to_be_freed.add(i as usize) };
            free_impl::<A>(ptr);
        }
    }

    // The `_malloc_fork_*` triad: libSystem-internal names some tooling
    // expects to find defined by the allocator in use. `pthread_atfork`
    // below is what actually guarantees these fire around every `fork()`;
    // these exports exist for symbol-surface completeness alongside it.
    extern "C" fn fork_prepare<A: Scaffold>() {
        A::active().lock();
    }
    extern "C" fn fork_parent<A: Scaffold>() {
        A::active().unlock();
    }
    extern "C" fn fork_child<A: Scaffold>() {
        A::active().unlock();
    }

    #[used]
    #[link_section = "__DATA,__interpose"]
    static TABLE: [Interpose; 32] = [
        Interpose {
            replacement: shim_malloc::<A> as *const c_void,
            original: malloc as *const c_void,
        },
        Interpose {
            replacement: shim_free::<A> as *const c_void,
            original: free as *const c_void,
        },
        Interpose {
            replacement: shim_calloc::<A> as *const c_void,
            original: calloc as *const c_void,
        },
        Interpose {
            replacement: shim_realloc::<A> as *const c_void,
            original: realloc as *const c_void,
        },
        Interpose {
            replacement: shim_valloc::<A> as *const c_void,
            original: valloc as *const c_void,
        },
        Interpose {
            replacement: shim_strdup::<A> as *const c_void,
            original: strdup as *const c_void,
        },
        Interpose {
            replacement: shim_strndup::<A> as *const c_void,
            original: strndup as *const c_void,
        },
        Interpose {
            replacement: shim_reallocarray::<A> as *const c_void,
            original: reallocarray as *const c_void,
        },
        Interpose {
            replacement: shim_posix_memalign::<A> as *const c_void,
            original: posix_memalign as *const c_void,
        },
        Interpose {
            replacement: shim_aligned_alloc::<A> as *const c_void,
            original: aligned_alloc as *const c_void,
        },
        Interpose {
            replacement: shim_pvalloc::<A> as *const c_void,
            original: pvalloc as *const c_void,
        },
        Interpose {
            replacement: shim_memalign::<A> as *const c_void,
            original: memalign as *const c_void,
        },
        Interpose {
            replacement: shim_malloc_usable_size::<A> as *const c_void,
            original: malloc_usable_size as *const c_void,
        },
        Interpose {
            replacement: shim_cfree::<A> as *const c_void,
            original: cfree as *const c_void,
        },
        Interpose {
            replacement: shim_pthread_create::<A> as *const c_void,
            original: pthread_create as *const c_void,
        },
        Interpose {
            replacement: shim_operator_new::<A> as *const c_void,
            original: cxx_operator_new as *const c_void,
        },
        Interpose {
            replacement: shim_operator_new::<A> as *const c_void,
            original: cxx_operator_new_array as *const c_void,
        },
        Interpose {
            replacement: shim_operator_delete::<A> as *const c_void,
            original: cxx_operator_delete as *const c_void,
        },
        Interpose {
            replacement: shim_operator_delete::<A> as *const c_void,
            original: cxx_operator_delete_array as *const c_void,
        },
        Interpose {
            replacement: shim_operator_delete_sized::<A> as *const c_void,
            original: cxx_operator_delete_sized as *const c_void,
        },
        Interpose {
            replacement: shim_operator_delete_sized::<A> as *const c_void,
            original: cxx_operator_delete_array_sized as *const c_void,
        },
        Interpose {
            replacement: shim_create_zone::<A> as *const c_void,
            original: malloc_create_zone as *const c_void,
        },
        Interpose {
            replacement: shim_destroy_zone::<A> as *const c_void,
            original: malloc_destroy_zone as *const c_void,
        },
        Interpose {
            replacement: shim_get_zone_name::<A> as *const c_void,
            original: malloc_get_zone_name as *const c_void,
        },
        Interpose {
            replacement: shim_get_all_zones::<A> as *const c_void,
            original: malloc_get_all_zones as *const c_void,
        },
        Interpose {
            replacement: shim_zone_malloc::<A> as *const c_void,
            original: malloc_zone_malloc as *const c_void,
        },
        Interpose {
            replacement: shim_zone_calloc::<A> as *const c_void,
            original: malloc_zone_calloc as *const c_void,
        },
        Interpose {
            replacement: shim_zone_realloc::<A> as *const c_void,
            original: malloc_zone_realloc as *const c_void,
        },
        Interpose {
            replacement: shim_zone_valloc::<A> as *const c_void,
            original: malloc_zone_valloc as *const c_void,
        },
        Interpose {
            replacement: shim_zone_memalign::<A> as *const c_void,
            original: malloc_zone_memalign as *const c_void,
        },
        Interpose {
            replacement: shim_zone_free::<A> as *const c_void,
            original: malloc_zone_free as *const c_void,
        },
        Interpose {
            replacement: shim_zone_batch_malloc::<A> as *const c_void,
            original: malloc_zone_batch_malloc as *const c_void,
        },
        Interpose {
            replacement: shim_zone_batch_free::<A> as *const c_void,
            original: malloc_zone_batch_free as *const c_void,
        },
    ];

    // Touching the static keeps it from being considered dead code by
    // anything upstream of the linker's section-based discovery; dyld reads
    // the section by name, not through this reference.
    std::hint::black_box(&TABLE);
    // Force the allocator to construct now rather than on the first
    // intercepted call, matching the ELF variant's readiness ordering.
    let _ = A::active();

    unsafe {
        libc::pthread_atfork(
            Some(fork_prepare::<A>),
            Some(fork_parent::<A>),
            Some(fork_child::<A>),
        );
    }

    install_zone::<A>();
}

static ZONE: OnceLock<usize> = OnceLock::new();

/// Builds a full `malloc_zone_t`, registers it with libSystem, then takes
/// over the process's pre-existing default and default-purgeable zones in
/// place: `malloc_default_zone`/`malloc_default_purgeable_zone` return
/// writable memory libSystem itself allocated at process start, so this
/// crate `mprotect`s the page containing each and overwrites its dispatch
/// pointers to this allocator's — the same technique allocator-override
/// libraries have used on macOS for lack of any public "set default zone"
/// API. Each page is left writable afterward rather than restored to its
/// original protection, since there is no portable way to query what that
/// was without tracking it separately.
fn install_zone<A: Scaffold>() {
    let zone_ptr = build_zone::<A>();
    let _ = ZONE.set(zone_ptr as usize);

    unsafe {
        let name = (*zone_ptr).zone_name;
        malloc_zone_register(zone_ptr);
        malloc_set_zone_name(zone_ptr, name);
        takeover_default_zone(zone_ptr, malloc_default_zone());
        takeover_default_zone(zone_ptr, malloc_default_purgeable_zone());
    }
}

/// Builds one full `malloc_zone_t` + introspection pair backed by `A`, leaked
/// for the process lifetime. Used both for this allocator's own registered
/// zone and for every zone a caller requests via an interposed
/// `malloc_create_zone`.
fn build_zone<A: Scaffold>() -> *mut MallocZoneT {
    unsafe extern "C" fn zone_size<A: Scaffold>(
        _zone: *mut MallocZoneT,
        ptr: *const c_void,
    ) -> usize {
        A::active().size_of(ptr as *mut u8)
    }
    unsafe extern "C" fn zone_malloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
    ) -> *mut c_void {
        malloc_impl::<A>(size)
    }
    unsafe extern "C" fn zone_calloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        nmemb: usize,
        size: usize,
    ) -> *mut c_void {
        calloc_impl::<A>(nmemb, size)
    }
    unsafe extern "C" fn zone_valloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
    ) -> *mut c_void {
        valloc_impl::<A>(size)
    }
    unsafe extern "C" fn zone_free<A: Scaffold>(_zone: *mut MallocZoneT, ptr: *mut c_void) {
        free_impl::<A>(ptr)
    }
    unsafe extern "C" fn zone_realloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        ptr: *mut c_void,
        size: usize,
    ) -> *mut c_void {
        realloc_impl::<A>(ptr, size)
    }
    extern "C" fn zone_destroy<A: Scaffold>(_zone: *mut MallocZoneT) {
        // This crate's zone is meant to live for the process's whole
        // lifetime; tearing it down mid-process would leave every live
        // allocation dangling, so destroy requests against it are ignored.
    }
    unsafe extern "C" fn zone_batch_malloc<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
        results: *mut *mut c_void,
        num_requested: u32,
    ) -> u32 {
        let mut filled = 0u32;
        for i in 0..num_requested {
            let ptr = malloc_impl::<A>(size);
            if ptr.is_null() {
                break;
            }
            unsafe { *results.add(i as usize) = ptr };
            filled += 1;
        }
        filled
    }
    unsafe extern "C" fn zone_batch_free<A: Scaffold>(
        _zone: *mut MallocZoneT,
        to_be_freed: *mut *mut c_void,
        num: u32,
    ) {
        for i in 0..num {
            let ptr = unsafe { *to_be_freed.add(i as usize) };
            free_impl::<A>(ptr);
        }
    }
    unsafe extern "C" fn zone_memalign<A: Scaffold>(
        _zone: *mut MallocZoneT,
        alignment: usize,
        size: usize,
    ) -> *mut c_void {
        let bridge = A::bridge();
        bridge.aligned_allocate(A::active(), alignment, size) as *mut c_void
    }
    unsafe extern "C" fn zone_free_definite_size<A: Scaffold>(
        _zone: *mut MallocZoneT,
        ptr: *mut c_void,
        size: usize,
    ) {
        let _ = size;
        free_impl::<A>(ptr)
    }
    extern "C" fn zone_pressure_relief<A: Scaffold>(
        _zone: *mut MallocZoneT,
        _goal: usize,
    ) -> usize {
        // Nothing is proactively reclaimed ahead of the next allocation
        // request, so no bytes are ever reported freed here.
        0
    }
    extern "C" fn zone_claimed_address<A: Scaffold>(
        _zone: *mut MallocZoneT,
        ptr: *mut c_void,
    ) -> c_int {
        // Every non-null pointer this zone is asked about after
        // installation was produced by this same allocator.
        c_int::from(!ptr.is_null())
    }

    unsafe extern "C" fn introspect_good_size<A: Scaffold>(
        _zone: *mut MallocZoneT,
        size: usize,
    ) -> usize {
        // No internal size-class rounding is reported; the requested size
        // is already what this allocator will hand back.
        size
    }
    extern "C" fn introspect_check<A: Scaffold>(_zone: *mut MallocZoneT) -> c_int {
        1
    }
    extern "C" fn introspect_print<A: Scaffold>(_zone: *mut MallocZoneT, _verbose: c_int) {}
    extern "C" fn introspect_log<A: Scaffold>(_zone: *mut MallocZoneT, _address: *mut c_void) {}
    extern "C" fn introspect_force_lock<A: Scaffold>(_zone: *mut MallocZoneT) {
        A::active().lock();
    }
    extern "C" fn introspect_force_unlock<A: Scaffold>(_zone: *mut MallocZoneT) {
        A::active().unlock();
    }
    unsafe extern "C" fn introspect_statistics<A: Scaffold>(
        _zone: *mut MallocZoneT,
        stats: *mut MallocStatisticsT,
    ) {
        // This allocator does not track zone-wide usage counters; reporting
        // zero is honest rather than fabricating plausible-looking numbers.
        unsafe {
            (*stats).blocks_in_use = 0;
            (*stats).size_in_use = 0;
            (*stats).max_size_in_use = 0;
            (*stats).size_allocated = 0;
        }
    }
    extern "C" fn introspect_zone_locked<A: Scaffold>(_zone: *mut MallocZoneT) -> c_int {
        0
    }

    let introspection = Box::leak(Box::new(MallocIntrospectionT {
        enumerator: std::ptr::null(),
        good_size: introspect_good_size::<A>,
        check: introspect_check::<A>,
        print: introspect_print::<A>,
        log: introspect_log::<A>,
        force_lock: introspect_force_lock::<A>,
        force_unlock: introspect_force_unlock::<A>,
        statistics: introspect_statistics::<A>,
        zone_locked: introspect_zone_locked::<A>,
        enable_discharge_checking: std::ptr::null(),
        disable_discharge_checking: std::ptr::null(),
        discharge: std::ptr::null(),
        enumerate_discharged_pointers: std::ptr::null(),
        reinit_lock: std::ptr::null(),
        print_task: std::ptr::null(),
        task_statistics: std::ptr::null(),
    }));

    let name = CString::new("alloc-scaffold").unwrap_or_default();
    let name_ptr = name.as_ptr();
    std::mem::forget(name);

    let zone = Box::leak(Box::new(MallocZoneT {
        size: zone_size::<A>,
        malloc: zone_malloc::<A>,
        calloc: zone_calloc::<A>,
        valloc: zone_valloc::<A>,
        free: zone_free::<A>,
        realloc: zone_realloc::<A>,
        destroy: zone_destroy::<A>,
        zone_name: name_ptr,
        batch_malloc: zone_batch_malloc::<A>,
        batch_free: zone_batch_free::<A>,
        introspect: introspection as *mut MallocIntrospectionT,
        version: 10,
        memalign: zone_memalign::<A>,
        free_definite_size: zone_free_definite_size::<A>,
        pressure_relief: zone_pressure_relief::<A>,
        claimed_address: zone_claimed_address::<A>,
    }));

    zone as *mut MallocZoneT
}

/// Overwrites the dispatch pointers of an existing zone in place, so
/// `malloc_zone_malloc(malloc_default_zone(), n)` and similar explicit-zone
/// calls land on this allocator even without going through the
/// `__DATA,__interpose` table. Called once for the default zone and once for
/// the default purgeable zone, so both of libSystem's two pre-existing zones
/// end up dispatching here.
unsafe fn takeover_default_zone(replacement: *mut MallocZoneT, default: *mut MallocZoneT) {
    if default.is_null() || default == replacement {
        return;
    }
    let page = crate::sys::page_size();
    let base = (default as usize) & !(page - 1);
    let span = (default as usize + std::mem::size_of::<MallocZoneT>()) - base;
    let pages = span.div_ceil(page) * page;
    unsafe {
        libc::mprotect(base as *mut c_void, pages, libc::PROT_READ | libc::PROT_WRITE);
        let src = &*replacement;
        let dst = &mut *default;
        dst.malloc = src.malloc;
        dst.calloc = src.calloc;
        dst.valloc = src.valloc;
        dst.free = src.free;
        dst.realloc = src.realloc;
        dst.destroy = src.destroy;
        dst.batch_malloc = src.batch_malloc;
        dst.batch_free = src.batch_free;
        dst.introspect = src.introspect;
        dst.memalign = src.memalign;
        dst.free_definite_size = src.free_definite_size;
        dst.pressure_relief = src.pressure_relief;
        dst.claimed_address = src.claimed_address;
        dst.size = src.size;
    }
}

fn malloc_impl<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    bridge.allocate(A::active(), size) as *mut c_void
}

fn free_impl<A: Scaffold>(ptr: *mut c_void) {
    let bridge = A::bridge();
    bridge.release(A::active(), ptr as *mut u8);
}

fn calloc_impl<A: Scaffold>(nmemb: usize, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::zeroed_allocate(&bridge, A::active(), nmemb, size) as *mut c_void
}

fn realloc_impl<A: Scaffold>(ptr: *mut c_void, size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::reallocate_wrapper(
        &bridge,
        A::active(),
        ptr as *mut u8,
        size,
        ZeroReallocPolicy::ReleaseAndNull,
    ) as *mut c_void
}

fn valloc_impl<A: Scaffold>(size: usize) -> *mut c_void {
    let bridge = A::bridge();
    wrappers::page_aligned_alloc(&bridge, A::active(), size, crate::sys::page_size()) as *mut c_void
}

/// # Safety
/// `s` must be a valid NUL-terminated C string.
unsafe fn strdup_impl<A: Scaffold>(s: *const c_char) -> *mut c_char {
    let bridge = A::bridge();
    unsafe { wrappers::string_duplicate(&bridge, A::active(), s) }
}

/// # Safety
/// `s` must be readable for at least `n` bytes or NUL-terminated within them.
unsafe fn strndup_impl<A: Scaffold>(s: *const c_char, n: usize) -> *mut c_char {
    let bridge = A::bridge();
    unsafe { wrappers::bounded_string_duplicate(&bridge, A::active(), s, n) }
}
