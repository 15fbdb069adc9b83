//! Thin syscall wrappers shared by the init buffer and the foreign-pointer
//! probe. Kept separate from the allocator contract: nothing here is part of
//! the Bridge — it is the substrate the scaffold itself needs before (or
//! regardless of) an allocator being attached.

#[cfg(unix)]
pub mod unix;
#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
pub mod windows;
#[cfg(windows)]
pub use windows::*;
