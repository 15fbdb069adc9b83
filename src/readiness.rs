//! Monotonic readiness flags gating allocator use and thread-hook activation.
//!
//! Two booleans, never reset: `allocator_ready` flips once the user allocator's
//! singleton has been constructed; `hooks_ready` flips only after that, once the
//! thread-lifecycle controller's own initializer has run. Readers use acquire
//! loads so that observing `true` makes every write preceding the matching
//! release store visible.

use std::sync::atomic::{AtomicBool, Ordering};

/// Two independent, one-way latches.
pub struct Readiness {
    allocator_ready: AtomicBool,
    hooks_ready: AtomicBool,
}

impl Readiness {
    pub const fn new() -> Self {
        Self {
            allocator_ready: AtomicBool::new(false),
            hooks_ready: AtomicBool::new(false),
        }
    }

    /// Called exactly once, by the allocator singleton's own construction path.
    pub fn mark_allocator_ready(&self) {
        self.allocator_ready.store(true, Ordering::Release);
    }

    /// Called by the thread-lifecycle controller's deferred initializer, which
    /// must itself force allocator construction first (see `thread::install`)
    /// so this can never observably run before `mark_allocator_ready`.
    pub fn mark_hooks_ready(&self) {
        self.hooks_ready.store(true, Ordering::Release);
    }

    pub fn allocator_ready(&self) -> bool {
        self.allocator_ready.load(Ordering::Acquire)
    }

    pub fn hooks_ready(&self) -> bool {
        self.hooks_ready.load(Ordering::Acquire)
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide readiness state. There is exactly one allocator per process,
/// so this is a plain global rather than something threaded through generics.
pub static READY: Readiness = Readiness::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let r = Readiness::new();
        assert!(!r.allocator_ready());
        assert!(!r.hooks_ready());
    }

    #[test]
    fn hooks_ready_implies_allocator_ready_was_set_first() {
        let r = Readiness::new();
        r.mark_allocator_ready();
        assert!(r.allocator_ready());
        assert!(!r.hooks_ready());
        r.mark_hooks_ready();
        assert!(r.hooks_ready());
    }

    #[test]
    fn never_transitions_back() {
        let r = Readiness::new();
        r.mark_allocator_ready();
        r.mark_hooks_ready();
        assert!(r.allocator_ready());
        assert!(r.hooks_ready());
    }
}
