//! End-to-end collector scenarios.
//!
//! Conservative stack scanning needs care in tests:
//!
//! * Every test captures its bottom-of-stack sentinel in the test function
//!   and runs its body in an `#[inline(never)]` inner function, so every
//!   pointer-holding local is guaranteed to live below the sentinel.
//! * A pointer that must be *found* is pinned into stack memory with
//!   `std::hint::black_box(&local)` before the scan.
//! * A pointer that must *not* be found is confined to a helper function's
//!   frame, and the dead stack region is overwritten with
//!   [`clobber_stack`] before the scan; without that, stale spill slots
//!   conservatively keep the block alive.

use std::ffi::CStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use tlgc::util::constants::BYTES_IN_ADDRESS;
use tlgc::{Address, Collector, Options};

/// Overwrite the stack region left behind by returned helper frames so no
/// stale copy of a managed pointer survives into the next scan.
#[inline(never)]
fn clobber_stack() {
    let mut spoil = [0usize; 8192];
    for slot in spoil.iter_mut() {
        unsafe { std::ptr::write_volatile(slot, 0) };
    }
    std::hint::black_box(&spoil);
}

fn marked(gc: &Collector) -> usize {
    gc.index().iter().filter(|r| r.is_marked()).count()
}

fn small_options() -> Options {
    let mut options = Options::new_no_env_vars();
    options.capacity = 8;
    options.min_capacity = 8;
    options
}

// A calloc'd array of 16 pointers, each slot filled with a finalized int
// block holding 42, all reachable from one stack local.
#[test]
fn stack_rooted_graph_is_fully_marked() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        static HITS: AtomicUsize = AtomicUsize::new(0);
        fn dtor(_ptr: Address) {
            HITS.fetch_add(1, Ordering::SeqCst);
        }

        let outer = gc.calloc(16, BYTES_IN_ADDRESS);
        assert!(!outer.is_zero());
        for i in 0..16usize {
            let child = gc.alloc_opt(std::mem::size_of::<u32>(), Some(dtor));
            assert!(!child.is_zero());
            unsafe {
                child.store::<u32>(42);
                (outer + i * BYTES_IN_ADDRESS).store::<usize>(child.as_usize());
            }
        }
        assert_eq!(gc.index().len(), 17);

        std::hint::black_box(&outer);
        gc.mark();
        assert_eq!(marked(gc), 17);

        // Everything is reachable, so the sweep only clears mark bits.
        assert_eq!(gc.sweep(), 0);
        assert_eq!(gc.index().len(), 17);
        assert_eq!(marked(gc), 0);
        assert_eq!(HITS.load(Ordering::SeqCst), 0);
        for i in 0..16usize {
            let child = unsafe { (outer + i * BYTES_IN_ADDRESS).load::<usize>() };
            assert_eq!(unsafe { Address::from_usize(child).load::<u32>() }, 42);
        }
        std::hint::black_box(&outer);
    }
}

// The same graph with the stack reference gone: nothing is marked, the
// sweep reclaims every byte, and the finalizer runs once per int block.
#[test]
fn unreachable_graph_is_reclaimed_with_finalizers() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        build_graph(gc);
        assert_eq!(gc.index().len(), 17);

        clobber_stack();
        gc.mark();
        assert_eq!(marked(gc), 0);

        let reclaimed = gc.sweep();
        assert_eq!(
            reclaimed,
            16 * std::mem::size_of::<u32>() + 16 * BYTES_IN_ADDRESS
        );
        assert_eq!(gc.index().len(), 0);
        assert_eq!(HITS.load(Ordering::SeqCst), 16);
    }

    #[inline(never)]
    fn build_graph(gc: &mut Collector) {
        let outer = gc.calloc(16, BYTES_IN_ADDRESS);
        for i in 0..16usize {
            let child = gc.alloc_opt(std::mem::size_of::<u32>(), Some(dtor));
            unsafe {
                child.store::<u32>(42);
                (outer + i * BYTES_IN_ADDRESS).store::<usize>(child.as_usize());
            }
        }
        std::hint::black_box(&outer);
    }
}

// Paused allocation with no stack reference marks nothing; after resuming,
// a stack-referenced array marks itself and its children, and nulling a
// slot drops exactly that child from the next scan.
#[test]
fn stack_scan_tracks_slot_updates() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    gc.pause();
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        alloc_unreferenced_array(gc);
        clobber_stack();
        gc.mark_stack();
        assert_eq!(marked(gc), 0);
        // The unreferenced array is garbage; drain it so later counts are
        // about this part of the test only.
        assert_eq!(gc.sweep(), 2 * BYTES_IN_ADDRESS);

        gc.resume();
        let outer = gc.calloc(2, BYTES_IN_ADDRESS);
        fill_slots(gc, outer);
        clobber_stack();
        std::hint::black_box(&outer);
        gc.mark_stack();
        assert_eq!(marked(gc), 3);
        assert_eq!(gc.sweep(), 0);

        // Null out slot 1: its int block is now unreachable.
        unsafe { (outer + BYTES_IN_ADDRESS).store::<usize>(0) };
        clobber_stack();
        std::hint::black_box(&outer);
        gc.mark_stack();
        assert_eq!(marked(gc), 2);
        assert!(gc.index().get(outer).unwrap().is_marked());
        let slot0 = unsafe { outer.load::<usize>() };
        assert!(gc
            .index()
            .get(unsafe { Address::from_usize(slot0) })
            .unwrap()
            .is_marked());
        assert_eq!(gc.sweep(), std::mem::size_of::<u32>());
        std::hint::black_box(&outer);
    }

    #[inline(never)]
    fn alloc_unreferenced_array(gc: &mut Collector) {
        let array = gc.calloc(2, BYTES_IN_ADDRESS);
        std::hint::black_box(&array);
    }

    #[inline(never)]
    fn fill_slots(gc: &mut Collector, outer: Address) {
        for i in 0..2usize {
            let child = gc.alloc(std::mem::size_of::<u32>());
            unsafe {
                child.store::<u32>(7);
                (outer + i * BYTES_IN_ADDRESS).store::<usize>(child.as_usize());
            }
        }
    }
}

// Root-tagged blocks survive collection with no stack references at all;
// once unrooted they are swept, finalizers included.
#[test]
fn rooted_blocks_survive_until_unrooted() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        alloc_static_blocks(gc);
        clobber_stack();

        assert_eq!(gc.collect(), 0);
        assert_eq!(gc.index().len(), 256);

        gc.unroot_all();
        assert_eq!(gc.sweep(), 256 * 512);
        assert_eq!(gc.index().len(), 0);
        assert_eq!(HITS.load(Ordering::SeqCst), 256);
    }

    #[inline(never)]
    fn alloc_static_blocks(gc: &mut Collector) {
        for _ in 0..256 {
            let block = gc.alloc_static(512, Some(dtor));
            assert!(!block.is_zero());
        }
    }
}

// strdup copies the bytes and the terminator; the copy is ordinary managed
// memory and gets reclaimed once unreferenced.
#[test]
fn strdup_copies_and_is_collected() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        duplicate_and_check(gc);
        clobber_stack();
        assert_eq!(gc.collect(), 17);
        assert_eq!(gc.index().len(), 0);
    }

    #[inline(never)]
    fn duplicate_and_check(gc: &mut Collector) {
        let original = CStr::from_bytes_with_nul(b"This is a string\0").unwrap();
        let copy = gc.strdup(original);
        assert!(!copy.is_zero());
        assert_eq!(gc.index().get(copy).unwrap().size, 17);
        let copied = unsafe { CStr::from_ptr(copy.to_ptr()) };
        assert_eq!(copied, original);
        std::hint::black_box(&copy);
    }
}

// Garbage created while paused is reclaimed by an explicit mark+sweep after
// the creating frames have returned.
#[test]
fn paused_garbage_is_reclaimed_by_an_explicit_cycle() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        gc.pause();
        alloc_garbage(gc);
        gc.resume();
        clobber_stack();

        gc.mark_roots();
        gc.mark_stack();
        assert_eq!(gc.sweep(), 32 * 8);
        assert_eq!(gc.index().len(), 0);
    }

    #[inline(never)]
    fn alloc_garbage(gc: &mut Collector) {
        for _ in 0..32 {
            gc.alloc(8);
        }
    }
}

#[test]
fn realloc_null_allocates_fresh() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    let block = gc.realloc(Address::ZERO, 42);
    assert!(!block.is_zero());
    assert_eq!(gc.index().get(block).unwrap().size, 42);
    assert_eq!(gc.index().len(), 1);
}

#[test]
fn realloc_unmanaged_pointer_fails() {
    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    let unmanaged: usize = 7;
    let result = gc.realloc(Address::from_ref(&unmanaged), 64);
    assert!(result.is_zero());
    assert_eq!(gc.index().len(), 0);
}

#[test]
fn realloc_preserves_contents_tag_and_finalizer() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    gc.pause();

    let block = gc.alloc_opt(16, Some(dtor));
    gc.make_static(block);
    unsafe { block.store::<u64>(0x0123_4567_89ab_cdef) };

    // Growing far past the original size forces most allocators to move the
    // block, but the contract holds either way.
    let grown = gc.realloc(block, 1 << 20);
    assert!(!grown.is_zero());
    assert_eq!(unsafe { grown.load::<u64>() }, 0x0123_4567_89ab_cdef);
    let record = gc.index().get(grown).unwrap();
    assert_eq!(record.size, 1 << 20);
    assert!(record.is_root());
    assert!(record.finalizer.is_some());
    if grown != block {
        assert!(gc.index().get(block).is_none());
    }
    assert_eq!(gc.index().len(), 1);
    // Relocation must not finalize the old block.
    assert_eq!(HITS.load(Ordering::SeqCst), 0);

    // In-place metadata update on shrink.
    let shrunk = gc.realloc(grown, 8);
    assert!(!shrunk.is_zero());
    assert_eq!(gc.index().get(shrunk).unwrap().size, 8);
    assert_eq!(gc.index().len(), 1);
}

#[test]
fn free_finalizes_once_and_tolerates_strangers() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());

    let block = gc.alloc_opt(64, Some(dtor));
    gc.free(block);
    assert_eq!(HITS.load(Ordering::SeqCst), 1);
    assert_eq!(gc.index().len(), 0);

    // Double free: the record is gone, so this is a no-op.
    gc.free(block);
    assert_eq!(HITS.load(Ordering::SeqCst), 1);

    // Unknown pointers are ignored.
    let stranger: usize = 0;
    gc.free(Address::from_ref(&stranger));

    // A root tag does not protect a block from an explicit free.
    let rooted = gc.alloc_static(32, Some(dtor));
    gc.free(rooted);
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
    assert_eq!(gc.index().len(), 0);
}

#[test]
fn stop_sweeps_everything_and_reports_bytes() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
    gc.pause();
    gc.alloc(100);
    gc.alloc_opt(28, Some(dtor));
    gc.alloc_static(72, Some(dtor));

    // Shutdown ignores reachability and root tags.
    assert_eq!(gc.stop(), 200);
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
}

#[test]
fn drop_behaves_like_stop() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    {
        let mut gc = Collector::with_options(Address::from_ref(&bos), Options::new_no_env_vars());
        gc.pause();
        gc.alloc_opt(8, Some(dtor));
        gc.alloc_static(8, Some(dtor));
    }
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
}

// The load watermark fires inside an allocation call and reclaims garbage
// without any explicit collect.
#[test]
fn automatic_trigger_reclaims_garbage() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), small_options());
    // capacity 11, sweep factor 0.5: the trigger arms at 5 records.
    assert_eq!(gc.index().sweep_limit(), 5);
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        alloc_garbage(gc);
        assert_eq!(gc.index().len(), 5);
        clobber_stack();
        let survivor = trigger_allocation(gc);
        // Conservative scanning may retain the odd stale straggler; the
        // trigger still has to have reclaimed most of the garbage.
        assert!(HITS.load(Ordering::SeqCst) >= 3);
        assert!(gc.index().len() < 6);
        assert!(gc.index().get(survivor).is_some());
        std::hint::black_box(&survivor);
    }

    #[inline(never)]
    fn alloc_garbage(gc: &mut Collector) {
        for _ in 0..5 {
            gc.alloc_opt(16, Some(dtor));
        }
    }

    #[inline(never)]
    fn trigger_allocation(gc: &mut Collector) -> Address {
        gc.alloc(16)
    }
}

#[test]
fn paused_collector_never_triggers() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    fn dtor(_ptr: Address) {
        HITS.fetch_add(1, Ordering::SeqCst);
    }

    let bos: usize = 0;
    let mut gc = Collector::with_options(Address::from_ref(&bos), small_options());
    gc.pause();
    body(&mut gc);

    #[inline(never)]
    fn body(gc: &mut Collector) {
        for _ in 0..32 {
            gc.alloc_opt(16, Some(dtor));
        }
        assert_eq!(gc.index().len(), 32);
        assert_eq!(HITS.load(Ordering::SeqCst), 0);
    }
}
