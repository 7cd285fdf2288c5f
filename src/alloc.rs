//! The allocation façade: malloc-style entry points that wrap the system
//! allocator and keep the allocation index in step.
//!
//! Every path follows the same shape: run the automatic trigger, call the
//! system allocator, record the result. A failed system allocation forces
//! one collection cycle and one retry; if the retry also fails the call
//! returns [`Address::ZERO`] and the caller sees the conventional null
//! result. No error is ever propagated beyond that.

use std::ffi::CStr;

use crate::collector::Collector;
use crate::index::{Finalizer, Tag};
use crate::util::{malloc, Address};

impl Collector {
    /// Allocate `size` bytes of managed memory. Returns the base address of
    /// the block, or [`Address::ZERO`] if the system allocator fails twice.
    pub fn alloc(&mut self, size: usize) -> Address {
        self.alloc_opt(size, None)
    }

    /// As [`alloc`](Self::alloc), with a finalizer to run when the block is
    /// reclaimed.
    pub fn alloc_opt(&mut self, size: usize, finalizer: Option<Finalizer>) -> Address {
        self.collect_if_due();
        let mut ptr = malloc::malloc(size);
        if ptr.is_zero() {
            self.collect();
            ptr = malloc::malloc(size);
        }
        if ptr.is_zero() {
            warn!("system allocator failed twice for {} bytes", size);
            return Address::ZERO;
        }
        trace!("alloc {} ({} bytes)", ptr, size);
        self.index.put(ptr, size, finalizer);
        ptr
    }

    /// As [`alloc_opt`](Self::alloc_opt), but the block is tagged as a root:
    /// it survives every cycle even when nothing on the stack references it,
    /// until the tag is cleared or the block is freed.
    pub fn alloc_static(&mut self, size: usize, finalizer: Option<Finalizer>) -> Address {
        let ptr = self.alloc_opt(size, finalizer);
        if !ptr.is_zero() {
            self.make_static(ptr);
        }
        ptr
    }

    /// Allocate a zero-filled block of `count * size` bytes.
    pub fn calloc(&mut self, count: usize, size: usize) -> Address {
        self.calloc_opt(count, size, None)
    }

    /// As [`calloc`](Self::calloc), with a finalizer.
    pub fn calloc_opt(
        &mut self,
        count: usize,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Address {
        self.collect_if_due();
        let mut ptr = malloc::calloc(count, size);
        if ptr.is_zero() {
            self.collect();
            ptr = malloc::calloc(count, size);
        }
        if ptr.is_zero() {
            warn!("system allocator failed twice for {}x{} bytes", count, size);
            return Address::ZERO;
        }
        // The library calloc succeeded, so the product cannot have
        // overflowed.
        let total = count * size;
        trace!("calloc {} ({} bytes)", ptr, total);
        self.index.put(ptr, total, finalizer);
        ptr
    }

    /// Resize the managed block at `ptr` to `new_size` bytes.
    ///
    /// A null `ptr` allocates a fresh block. A non-null `ptr` the collector
    /// does not manage returns [`Address::ZERO`] and leaves the caller
    /// responsible for `ptr`. Otherwise the block is resized through the
    /// system allocator; if the block moves, the record follows it and keeps
    /// its tag (a root stays a root across relocation) and finalizer. On
    /// system-allocator failure the original block and record are untouched.
    pub fn realloc(&mut self, ptr: Address, new_size: usize) -> Address {
        if ptr.is_zero() {
            return self.alloc(new_size);
        }
        let (tag, finalizer) = match self.index.get(ptr) {
            Some(record) => (record.tag, record.finalizer),
            None => return Address::ZERO,
        };

        self.collect_if_due();
        let new_ptr = malloc::realloc(ptr, new_size);
        if new_ptr.is_zero() {
            return Address::ZERO;
        }

        if new_ptr == ptr {
            self.index.put(ptr, new_size, finalizer);
        } else {
            trace!("realloc moved {} -> {}", ptr, new_ptr);
            self.index.remove(ptr, false);
            let record = self.index.put(new_ptr, new_size, finalizer);
            record.tag = tag;
        }
        new_ptr
    }

    /// Finalize and free the managed block at `ptr`. Unknown pointers are
    /// ignored, which also makes a double free of the same managed pointer a
    /// no-op. A root tag does not protect a block from an explicit free.
    pub fn free(&mut self, ptr: Address) {
        if let Some(record) = self.index.remove(ptr, true) {
            trace!("free {} ({} bytes)", record.ptr, record.size);
            malloc::free(record.ptr);
        }
    }

    /// Copy the C string `s`, terminator included, into a fresh managed
    /// block of `strlen(s) + 1` bytes.
    pub fn strdup(&mut self, s: &CStr) -> Address {
        let bytes = s.to_bytes_with_nul();
        let ptr = self.alloc(bytes.len());
        if !ptr.is_zero() {
            unsafe {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.to_mut_ptr::<u8>(), bytes.len());
            }
        }
        ptr
    }

    /// Tag the managed block at `ptr` as a root. A no-op on pointers the
    /// collector does not manage.
    pub fn make_static(&mut self, ptr: Address) {
        if let Some(record) = self.index.get_mut(ptr) {
            record.tag.set(Tag::ROOT);
        }
    }
}
