//! The collector context: per-thread state, the run controller, and the
//! sweeper.

use std::marker::PhantomData;

use crate::index::{AllocationIndex, Tag};
use crate::util::options::Options;
use crate::util::{logger, malloc, Address};

/// A conservative, thread-local, stop-the-world mark-and-sweep collector.
///
/// A `Collector` owns the storage of every block it has vended and the
/// metadata index describing them. The application holds borrowed raw
/// pointers into managed blocks; such a pointer stays valid exactly as long
/// as some root (a stack word, a register, or a [`Tag::ROOT`]-tagged block)
/// transitively reaches the block at each collection cycle.
///
/// The type is deliberately `!Send` and `!Sync`: one context belongs to one
/// thread, and the stack it scans is that thread's stack. Scanning assumes a
/// downward-growing stack and word-sized addresses; both are platform
/// preconditions.
pub struct Collector {
    pub(crate) index: AllocationIndex,
    /// When set, the automatic trigger inside allocation calls is disabled.
    /// Explicit [`collect`](Self::collect) and [`free`](Self::free) still
    /// operate.
    pub(crate) paused: bool,
    /// Bottom-of-stack sentinel: the highest stack address the scan
    /// considers. Must point into an ancestor frame that is still live
    /// whenever a collection can run.
    pub(crate) bos: Address,
    /// Reusable mark-phase work stack of `(base, size)` pairs.
    pub(crate) worklist: Vec<(Address, usize)>,
    /// One context per thread; the raw pointer keeps the type out of `Send`
    /// and `Sync`.
    _thread_local: PhantomData<*mut ()>,
}

impl Collector {
    /// Start a collector with default tuning (overridable through `TLGC_*`
    /// environment variables; see [`Options`]).
    ///
    /// `bos` must point into the caller's own stack frame, or a frame above
    /// it that outlives the collector:
    ///
    /// ```ignore
    /// let stack_base: usize = 0;
    /// let mut gc = Collector::new(Address::from_ref(&stack_base));
    /// ```
    pub fn new(bos: Address) -> Self {
        Self::with_options(bos, Options::new())
    }

    /// Start a collector with explicit tuning.
    pub fn with_options(bos: Address, options: Options) -> Self {
        logger::try_init();
        let index = AllocationIndex::new(
            options.min_capacity,
            options.capacity,
            options.sweep_factor,
            options.downsize_factor,
            options.upsize_factor,
        );
        info!(
            "started collector: {} buckets, sweep limit {}, bos {}",
            index.capacity(),
            index.sweep_limit(),
            bos
        );
        Collector {
            index,
            paused: false,
            bos,
            worklist: Vec::new(),
            _thread_local: PhantomData,
        }
    }

    /// Read-only view of the allocation index.
    pub fn index(&self) -> &AllocationIndex {
        &self.index
    }

    /// Is the automatic trigger disabled?
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Disable the automatic collection trigger. Allocation keeps working;
    /// nothing is reclaimed until [`resume`](Self::resume) or an explicit
    /// [`collect`](Self::collect).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Re-enable the automatic collection trigger.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Run one full mark-and-sweep cycle and return the number of bytes
    /// reclaimed. This bypasses the pause flag and the load watermark.
    pub fn collect(&mut self) -> usize {
        trace!("collection cycle: {} records", self.index.len());
        self.mark();
        let reclaimed = self.sweep();
        debug!(
            "collection cycle reclaimed {} bytes, {} records survive",
            reclaimed,
            self.index.len()
        );
        reclaimed
    }

    /// Reclaim every unreached block.
    ///
    /// Every record with both [`Tag::MARK`] and [`Tag::ROOT`] clear is
    /// removed from the index, finalized, and its block returned to the
    /// system allocator. Every marked survivor has its `MARK` bit cleared
    /// again (`ROOT` is preserved), so no mark state leaks into the next
    /// cycle. Returns the number of bytes reclaimed.
    ///
    /// Callers normally want [`collect`](Self::collect); sweeping without a
    /// preceding [`mark`](Self::mark) reclaims everything that is not a
    /// root, which is exactly what shutdown does.
    pub fn sweep(&mut self) -> usize {
        let mut victims = Vec::new();
        for record in self.index.iter_mut() {
            if record.is_marked() {
                record.tag.clear(Tag::MARK);
            } else if !record.is_root() {
                victims.push(record.ptr);
            }
        }

        let mut reclaimed = 0;
        for ptr in victims {
            if let Some(record) = self.index.remove(ptr, true) {
                trace!("sweeping {} ({} bytes)", record.ptr, record.size);
                malloc::free(record.ptr);
                reclaimed += record.size;
            }
        }
        self.index.recompute_sweep_limit();
        reclaimed
    }

    /// Clear the [`Tag::ROOT`] tag on every record. After this, a sweep with
    /// no preceding mark reclaims every remaining block; shutdown relies on
    /// that.
    pub fn unroot_all(&mut self) {
        for record in self.index.iter_mut() {
            record.tag.clear(Tag::ROOT);
        }
    }

    /// Shut the collector down: drop every root tag, sweep everything that
    /// remains (finalizers run), and return the total bytes reclaimed.
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    /// The automatic trigger: called from the allocation paths before each
    /// system-allocator call.
    pub(crate) fn collect_if_due(&mut self) {
        if !self.paused && self.index.len() >= self.index.sweep_limit() {
            trace!(
                "load watermark reached ({} records >= limit {})",
                self.index.len(),
                self.index.sweep_limit()
            );
            self.collect();
        }
    }

    fn shutdown(&mut self) -> usize {
        self.unroot_all();
        let reclaimed = self.sweep();
        debug!("collector shut down, {} bytes reclaimed", reclaimed);
        reclaimed
    }
}

/// Dropping a collector reclaims every remaining managed block, finalizers
/// included, exactly like [`Collector::stop`].
impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}
