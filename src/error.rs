//! Error taxonomy for the scaffold.
//!
//! Nothing in this crate panics or unwinds across the bridge: allocation
//! failure is a null return, and the two argument-validation wrappers
//! (`posix_aligned`, `c11_aligned`) return one of these instead of a string or
//! a `Box<dyn Error>` so that callers at the C ABI boundary can map them
//! directly onto `EINVAL`/`errno` without allocating.

use std::fmt;

/// Why an alignment/size request was rejected before ever reaching the
/// allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignError {
    /// `align` was not a power of two.
    NotPowerOfTwo,
    /// `align` was a power of two but not a multiple of `size_of::<*const ()>()`.
    NotPointerMultiple,
    /// `size` was not a multiple of `align` (the `aligned_alloc`/C11 rule).
    SizeNotMultipleOfAlign,
}

impl fmt::Display for AlignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPowerOfTwo => write!(f, "alignment is not a power of two"),
            Self::NotPointerMultiple => write!(f, "alignment is not a multiple of pointer size"),
            Self::SizeNotMultipleOfAlign => write!(f, "size is not a multiple of alignment"),
        }
    }
}

impl std::error::Error for AlignError {}
