//! A minimal reference allocator for exercising the scaffolding in
//! integration tests. Backed by `std::alloc::System` with a layout table so
//! `release`/`size_of`/`reallocate` can be implemented correctly; not a
//! production heap, just something real enough that the Bridge and wrapper
//! tests are exercising genuine memory rather than bookkeeping-only doubles.

use std::alloc::{alloc, dealloc, realloc, Layout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use alloc_scaffold::contract::Allocator;

pub struct ReferenceAllocator {
    layouts: Mutex<HashMap<usize, Layout>>,
    // Separate from `layouts`: `lock`/`unlock` model the fork-safety barrier,
    // not per-call bookkeeping, so they get their own flag rather than
    // holding the layout table's mutex across the call.
    fork_guard_held: AtomicBool,
}

impl ReferenceAllocator {
    pub fn new() -> Self {
        Self {
            layouts: Mutex::new(HashMap::new()),
            fork_guard_held: AtomicBool::new(false),
        }
    }
}

impl Default for ReferenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Allocator for ReferenceAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return std::ptr::NonNull::dangling().as_ptr();
        }
        let layout = match Layout::from_size_align(size, 8) {
            Ok(l) => l,
            Err(_) => return std::ptr::null_mut(),
        };
        let ptr = unsafe { alloc(layout) };
        if !ptr.is_null() {
            self.layouts.lock().unwrap().insert(ptr as usize, layout);
        }
        ptr
    }

    fn release(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if let Some(layout) = self.layouts.lock().unwrap().remove(&(ptr as usize)) {
            unsafe { dealloc(ptr, layout) };
        }
    }

    fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8 {
        let layout = match Layout::from_size_align(size.max(1), align) {
            Ok(l) => l,
            Err(_) => return std::ptr::null_mut(),
        };
        let ptr = unsafe { alloc(layout) };
        if !ptr.is_null() {
            self.layouts.lock().unwrap().insert(ptr as usize, layout);
        }
        ptr
    }

    fn size_of(&self, ptr: *mut u8) -> usize {
        if ptr.is_null() {
            return 0;
        }
        self.layouts
            .lock()
            .unwrap()
            .get(&(ptr as usize))
            .map(|l| l.size())
            .unwrap_or(0)
    }

    fn lock(&self) {
        while self
            .fork_guard_held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.fork_guard_held.store(false, Ordering::Release);
    }

    fn reallocate(&self, ptr: *mut u8, size: usize) -> Option<*mut u8> {
        if ptr.is_null() || size == 0 {
            return None;
        }
        let mut layouts = self.layouts.lock().unwrap();
        let old_layout = *layouts.get(&(ptr as usize))?;
        let new_ptr = unsafe { realloc(ptr, old_layout, size) };
        if !new_ptr.is_null() {
            layouts.remove(&(ptr as usize));
            layouts.insert(
                new_ptr as usize,
                Layout::from_size_align(size, old_layout.align()).ok()?,
            );
        }
        Some(new_ptr)
    }
}
