//! The Allocator Contract: the fixed, small surface a user allocator
//! must implement to be plugged into the scaffold. No other module in this
//! crate is allowed to name a concrete implementor of this trait — every
//! other component is generic over `A: Allocator`, bound to a concrete type
//! only by the [`crate::scaffold!`] macro in the consuming crate.
//!
//! Optional operations (`reallocate`, `thread_start`, `thread_exit`) are
//! detected at compile time via default trait-method overrides rather than a
//! runtime capability probe: an allocator that does not override `reallocate`
//! gets the Bridge's synthesized fallback for free, and the call site never
//! branches on "does this allocator support X."

/// The operations a user allocator must provide to back the scaffold.
///
/// # Safety
///
/// Implementors must uphold:
/// - `allocate`/`aligned_allocate` return either null or an address usable for
///   at least the requested size, with `size_of` at that address reporting no
///   less than what was requested.
/// - `release` accepts only null or a pointer previously returned by this same
///   allocator and not yet released.
/// - `lock`/`unlock` form an outermost barrier: after `lock` returns, no other
///   thread holds any lock internal to the allocator, until the matching
///   `unlock`.
pub unsafe trait Allocator: Sync + 'static {
    /// Allocate at least `size` bytes. Returns null on exhaustion.
    fn allocate(&self, size: usize) -> *mut u8;

    /// Release a pointer. `ptr` is either null (no-op) or a live allocation
    /// previously returned by this allocator.
    fn release(&self, ptr: *mut u8);

    /// Allocate at least `size` bytes aligned to `align`, a power of two.
    fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8;

    /// Usable byte count at `ptr`. Must be `0` for a null pointer, and never
    /// less than the size requested when `ptr` was allocated.
    fn size_of(&self, ptr: *mut u8) -> usize;

    /// Outermost fork-safety barrier: acquire all allocator-internal locks.
    fn lock(&self);

    /// Release the locks acquired by `lock`.
    fn unlock(&self);

    /// Native resize, if the allocator has one. Returning `None` tells the
    /// Bridge to synthesize `reallocate` out of `allocate`/`release`/`size_of`.
    fn reallocate(&self, ptr: *mut u8, size: usize) -> Option<*mut u8> {
        let _ = (ptr, size);
        None
    }

    /// Whether this allocator overrides `thread_start`/`thread_exit`. Checked
    /// at compile time by the Thread Lifecycle Controller so a allocator that
    /// doesn't care about threads costs nothing on the creation/exit path.
    const HAS_THREAD_HOOKS: bool = false;

    /// Called on a newly created thread, before the user's start routine runs.
    fn thread_start(&self) {}

    /// Called as a thread is about to exit, after the user's start routine
    /// returns (by any means — see `thread` module for cancellation handling).
    fn thread_exit(&self) {}
}
