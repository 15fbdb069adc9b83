//! Platform Interceptor: three realizations of "capture every standard
//! allocation entry point and route it through the Bridge Layer."
//!
//! Every function below is generic over `A: Allocator` and takes the
//! `&'static A` it should forward to as an explicit argument rather than
//! reaching for a module-level global — the `scaffold!` macro is the only
//! place that knows the concrete `A` and the only place a `'static` reference
//! to it exists, so these functions stay ignorant of where that reference
//! came from. This is what keeps the interceptor code itself written once.

#[cfg(all(unix, not(target_os = "macos")))]
pub mod elf;

#[cfg(target_os = "macos")]
pub mod macho;

#[cfg(windows)]
pub mod windows;
