//! The conservative tracer: root discovery and byte-granular marking.
//!
//! A managed block is reachable iff a machine word anywhere in the live
//! stack region, in a callee-saved register, or inside another reachable
//! managed block has a bit pattern equal to the block's base address, or the
//! block is tagged [`Tag::ROOT`]. No alignment is assumed for candidate
//! words: the scans read a full word at *every byte offset* of their range,
//! because nothing guarantees that a stack- or heap-resident pointer sits on
//! a word boundary.

use std::sync::atomic::{compiler_fence, Ordering};

use crate::collector::Collector;
use crate::index::Tag;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::{registers, Address};

/// The stack scan is only ever called through a volatile load of this
/// pointer. The compiler cannot see the call target, so it can neither
/// inline [`Collector::mark_stack`] into [`Collector::mark`] nor sink the
/// register capture below the scan.
static MARK_STACK: fn(&mut Collector) = Collector::mark_stack;

impl Collector {
    /// Run the full mark phase: trace from the rooted records, then
    /// materialize the callee-saved registers into this frame and scan the
    /// stack.
    ///
    /// The ordering that matters is "registers are in stack memory before
    /// the scan reads any byte". It is enforced three ways: the register
    /// file is a local of this frame (inside the scanned range), the scan is
    /// called through the opaque [`MARK_STACK`] pointer, and compiler fences
    /// bracket the call. `black_box` keeps the file alive until the scan has
    /// returned.
    pub fn mark(&mut self) {
        self.mark_roots();

        let register_file = registers::capture();
        std::hint::black_box(&register_file);
        compiler_fence(Ordering::SeqCst);
        let scan = unsafe { std::ptr::read_volatile(&MARK_STACK) };
        scan(self);
        compiler_fence(Ordering::SeqCst);
        std::hint::black_box(&register_file);
    }

    /// Trace every [`Tag::ROOT`]-tagged record as a root.
    pub fn mark_roots(&mut self) {
        let roots: Vec<Address> = self
            .index
            .iter()
            .filter(|record| record.is_root())
            .map(|record| record.ptr)
            .collect();
        trace!("marking from {} rooted records", roots.len());
        for root in roots {
            self.mark_alloc(root);
        }
    }

    /// Scan the stack between the current top of stack and the
    /// bottom-of-stack sentinel for candidate pointers.
    ///
    /// The top of stack is the address of a local in this very function, so
    /// the scanned range covers every frame between here and the sentinel,
    /// including the spilled register file in [`mark`](Self::mark)'s frame.
    /// The range is normalized low-to-high and the word read at the last
    /// byte offset may straddle the sentinel into its (live) frame.
    #[inline(never)]
    pub fn mark_stack(&mut self) {
        let top_of_stack: usize = 0;
        let tos = Address::from_ref(&top_of_stack);
        let bos = self.bos;
        let (low, high) = if tos <= bos { (tos, bos) } else { (bos, tos) };
        trace!("scanning stack {}..{} ({} bytes)", low, high, high - low);

        let mut cursor = low;
        while cursor < high {
            let word = unsafe { cursor.load_word_unaligned() };
            self.mark_alloc(unsafe { Address::from_usize(word) });
            cursor += 1;
        }
    }

    /// Mark the record for `candidate`, if there is one, and everything
    /// transitively reachable from its block.
    ///
    /// An already-marked record is skipped; that check is what terminates
    /// tracing on cyclic object graphs. Tracing is driven by an explicit
    /// work stack rather than recursion so an adversarial pointer graph
    /// cannot overflow the machine stack; the visible semantics are the same
    /// depth-first walk.
    pub(crate) fn mark_alloc(&mut self, candidate: Address) {
        let mut worklist = std::mem::take(&mut self.worklist);
        debug_assert!(worklist.is_empty());

        if let Some(record) = self.index.get_mut(candidate) {
            if !record.is_marked() {
                record.tag.set(Tag::MARK);
                worklist.push((record.ptr, record.size));
            }
        }

        while let Some((base, size)) = worklist.pop() {
            if size < BYTES_IN_WORD {
                continue;
            }
            // Word reads at every byte offset at which a whole word still
            // fits inside the block.
            for offset in 0..=(size - BYTES_IN_WORD) {
                let word = unsafe { (base + offset).load_word_unaligned() };
                let next = unsafe { Address::from_usize(word) };
                if let Some(record) = self.index.get_mut(next) {
                    if !record.is_marked() {
                        record.tag.set(Tag::MARK);
                        worklist.push((record.ptr, record.size));
                    }
                }
            }
        }

        self.worklist = worklist;
    }
}
