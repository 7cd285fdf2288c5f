//! tlgc is a conservative, thread-local, stop-the-world mark-and-sweep
//! garbage collector that sits on top of a malloc-style system allocator.
//! Application code allocates through the collector instead of calling the
//! system allocator directly; the collector keeps a record for every block
//! it has vended and periodically scans the thread's live memory for byte
//! patterns that look like pointers into those blocks. Blocks no byte
//! pattern reaches are reclaimed, running their finalizers.
//!
//! Logically, this crate includes these major parts:
//! * [The collector context](crate::Collector): per-thread state, the run
//!   controller, and the sweep phase.
//! * The allocation façade: `malloc`/`calloc`/`realloc`/`free`/`strdup`
//!   analogues as methods on the context, wired to the automatic collection
//!   trigger.
//! * [The allocation index](crate::index::AllocationIndex): an open,
//!   separately chained hash table from managed base addresses to
//!   [allocation records](crate::index::AllocationRecord), with prime
//!   capacities and load-factor driven rehashing.
//! * The conservative tracer: root discovery over the stack, the
//!   callee-saved registers and the rooted records, and byte-granular
//!   marking of everything transitively reachable.
//! * [Utilities](crate::util): the `Address` type, the system-allocator
//!   shim, prime sizing, tuning options, and the built-in logger.
//!
//! The collector is single-mutator and single-collector within its one
//! thread. Platform preconditions: a downward-growing stack and addresses
//! that fit in a machine word.

#[macro_use]
extern crate log;

mod alloc;
mod collector;
pub mod index;
mod trace;
pub mod util;

pub use crate::collector::Collector;
pub use crate::index::{AllocationRecord, Finalizer, Tag};
pub use crate::util::address::Address;
pub use crate::util::options::Options;
