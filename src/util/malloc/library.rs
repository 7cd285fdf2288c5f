// Export one of the malloc libraries.

#[cfg(feature = "malloc_jemalloc")]
pub use self::jemalloc::*;
#[cfg(not(any(feature = "malloc_jemalloc", feature = "malloc_mimalloc")))]
pub use self::libc_malloc::*;
#[cfg(feature = "malloc_mimalloc")]
pub use self::mimalloc::*;

// Different malloc libraries

#[cfg(feature = "malloc_jemalloc")]
mod jemalloc {
    // ANSI C
    pub use jemalloc_sys::{calloc, free, malloc, realloc};
}

#[cfg(feature = "malloc_mimalloc")]
mod mimalloc {
    // ANSI C
    pub use mimalloc_sys::{
        mi_calloc as calloc, mi_free as free, mi_malloc as malloc, mi_realloc as realloc,
    };
}

/// If no malloc lib is specified, use the libc implementation
#[cfg(not(any(feature = "malloc_jemalloc", feature = "malloc_mimalloc")))]
mod libc_malloc {
    // ANSI C
    pub use libc::{calloc, free, malloc, realloc};
}
