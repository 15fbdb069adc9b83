//! # `alloc-scaffold`
//!
//! Scaffolding that lets a user-supplied memory allocator transparently
//! replace a process's system allocator. Every call the process (and its
//! dependencies) makes to the standard allocation entry points — `malloc`,
//! `free`, `calloc`, `realloc`, aligned and page-aligned variants, string
//! duplication helpers, and platform-specific zone/heap registration — is
//! diverted through a small, fixed bridge interface ([`contract::Allocator`])
//! that the user's allocator implements.
//!
//! The allocator itself is out of scope: this crate is the interposition
//! bridge and the platform-specific machinery that makes wiring an allocator
//! into a process's allocation surface safe, not an allocator.
//!
//! ## Usage
//!
//! ```ignore
//! struct MyAllocator { /* ... */ }
//!
//! unsafe impl alloc_scaffold::contract::Allocator for MyAllocator {
//!     fn allocate(&self, size: usize) -> *mut u8 { /* ... */ }
//!     fn release(&self, ptr: *mut u8) { /* ... */ }
//!     fn aligned_allocate(&self, align: usize, size: usize) -> *mut u8 { /* ... */ }
//!     fn size_of(&self, ptr: *mut u8) -> usize { /* ... */ }
//!     fn lock(&self) { /* ... */ }
//!     fn unlock(&self) { /* ... */ }
//! }
//!
//! alloc_scaffold::scaffold!(MyAllocator, MyAllocator::new);
//! ```
//!
//! The `scaffold!` invocation is the only place a concrete allocator type is
//! ever named: everything above it in this crate is generic over
//! `A: contract::Allocator`.
//!
//! ## Architecture
//!
//! Five cooperating components, leaves first:
//!
//! 1. [`contract`] — the fixed surface a user allocator implements.
//! 2. [`bridge`] — the single indirection every platform interceptor and
//!    wrapper calls into.
//! 3. [`wrappers`] — cross-platform behavior for the noisier parts of the
//!    standard allocation surface (`calloc`, `posix_memalign`, `strdup`, ...).
//! 4. [`interpose`] — the three platform-specific interception mechanisms.
//! 5. [`thread`] — thread creation/exit notification for thread-aware
//!    allocators, gated by a two-phase readiness handshake ([`readiness`]).
//!
//! [`sys`] and [`init_buffer`] are shared substrate the scaffold itself needs
//! regardless of which allocator is attached; [`foreign`] is used only by the
//! Windows in-process-patching variant, which is the only one that can
//! observe a pointer predating interposition.

#![warn(clippy::all)]
#![allow(clippy::missing_safety_doc)]

pub mod bridge;
pub mod contract;
pub mod error;
pub mod foreign;
pub mod init_buffer;
pub mod interpose;
pub mod readiness;
pub mod scaffold;
pub mod sys;
pub mod thread;
pub mod wrappers;
