//! The system allocator underneath the collector.
//!
//! Every managed block's storage comes from (and goes back to) the functions
//! in this module. They are thin `Address`-typed wrappers over the selected
//! malloc library; see [`library`] for how a library is chosen. The collector
//! assumes these functions are reentrant with respect to itself on the
//! calling thread and makes no cross-thread assumption.

/// Malloc provided by libraries
pub(crate) mod library;

use crate::util::Address;

/// Allocate memory. Similar to libc's malloc. Returns [`Address::ZERO`] when
/// the library allocator fails.
pub fn malloc(size: usize) -> Address {
    Address::from_mut_ptr(unsafe { self::library::malloc(size) })
}

/// Allocate memory and initialize the bytes in the allocated memory to zero.
/// Similar to libc's calloc. The library performs its own `num * size`
/// overflow check and fails the allocation on overflow.
pub fn calloc(num: usize, size: usize) -> Address {
    Address::from_mut_ptr(unsafe { self::library::calloc(num, size) })
}

/// Reallocate the given area of memory. Similar to libc's realloc. On
/// failure the original area is left untouched and [`Address::ZERO`] is
/// returned.
pub fn realloc(addr: Address, size: usize) -> Address {
    Address::from_mut_ptr(unsafe { self::library::realloc(addr.to_mut_ptr(), size) })
}

/// Free memory that was returned from the other functions in this module.
pub fn free(addr: Address) {
    unsafe { self::library::free(addr.to_mut_ptr()) }
}
