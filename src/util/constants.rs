//! Word and address sizes for the platform the collector runs on.

use static_assertions::const_assert_eq;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word. The conservative scans read one word at a
/// time: any word whose bit pattern equals a managed base address keeps that
/// allocation alive.
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;

// Addresses must fit in a machine word. This is a platform precondition of
// the conservative tracer, not merely an optimization.
const_assert_eq!(BYTES_IN_ADDRESS, std::mem::size_of::<usize>());
const_assert_eq!(BYTES_IN_WORD, std::mem::size_of::<*const ()>());
