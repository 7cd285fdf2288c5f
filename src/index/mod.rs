//! The allocation index: an open hash table from managed base addresses to
//! allocation records.
//!
//! Buckets chain separately, with insertion at the chain head. Chains are
//! built from arena slot indices instead of owning pointers: every record
//! lives in a stable slot of the record arena, and a rehash only rewrites
//! bucket heads and `next` links. The bucket count is always prime and the
//! table rehashes when its load factor crosses the configured thresholds.
//!
//! The index tracks metadata only. It never allocates or frees managed
//! blocks itself; removal hands the record back to the caller, who owns the
//! block's storage. That split keeps the index safe to tear down with stale
//! base addresses still in it.

pub mod record;

use crate::util::prime::next_prime;
use crate::util::Address;

pub use self::record::{AllocationRecord, Finalizer, Tag};

#[cfg(target_pointer_width = "64")]
const HASH_MULTIPLIER: usize = 0x9e37_79b9_7f4a_7c15;
#[cfg(target_pointer_width = "32")]
const HASH_MULTIPLIER: usize = 0x9e37_79b9;

/// Fibonacci multiplicative mix of a base address. Distribution is all that
/// matters here; the bucket is taken modulo the (prime) capacity.
fn hash(ptr: Address) -> usize {
    ptr.as_usize().wrapping_mul(HASH_MULTIPLIER)
}

/// The hash table mapping each managed base address to its record.
pub struct AllocationIndex {
    /// Head arena slot of each bucket chain; `None` for an empty bucket.
    buckets: Vec<Option<usize>>,
    /// Record arena. Chains index into this; slots survive rehashes.
    records: Vec<Option<AllocationRecord>>,
    /// Recycled arena slots.
    free: Vec<usize>,
    /// Number of live records.
    len: usize,
    /// Floor on the bucket count. Prime.
    min_capacity: usize,
    /// Automatic-sweep trigger multiplier; see [`sweep_limit`](Self::sweep_limit).
    sweep_factor: f64,
    /// Record count at which the next allocation triggers a cycle.
    sweep_limit: usize,
    /// Load factor below which the table shrinks.
    downsize_factor: f64,
    /// Load factor above which the table grows.
    upsize_factor: f64,
}

impl AllocationIndex {
    /// Create an index. Both capacities are raised to the next prime, and
    /// the initial bucket count is the larger of the two primes, so the
    /// table never starts below its own floor.
    pub fn new(
        min_capacity: usize,
        capacity: usize,
        sweep_factor: f64,
        downsize_factor: f64,
        upsize_factor: f64,
    ) -> Self {
        let min_capacity = next_prime(min_capacity);
        let capacity = std::cmp::max(next_prime(capacity), min_capacity);
        let mut index = AllocationIndex {
            buckets: vec![None; capacity],
            records: Vec::new(),
            free: Vec::new(),
            len: 0,
            min_capacity,
            sweep_factor,
            sweep_limit: 0,
            downsize_factor,
            upsize_factor,
        };
        index.recompute_sweep_limit();
        index
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the index empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current bucket count. Always prime and `>= min_capacity`.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// The prime-rounded floor on the bucket count.
    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    /// Record count at which the next allocation triggers a cycle.
    pub fn sweep_limit(&self) -> usize {
        self.sweep_limit
    }

    /// `sweep_limit = max(1, floor(capacity * sweep_factor))`, recomputed
    /// after every resize and every collection cycle.
    pub(crate) fn recompute_sweep_limit(&mut self) {
        self.sweep_limit = std::cmp::max(1, (self.capacity() as f64 * self.sweep_factor) as usize);
    }

    fn bucket_of(&self, ptr: Address) -> usize {
        hash(ptr) % self.capacity()
    }

    /// Arena slot holding the record for `ptr`, if any.
    fn lookup_slot(&self, ptr: Address) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(ptr)];
        while let Some(slot) = cursor {
            let record = self.records[slot].as_ref()?;
            if record.ptr == ptr {
                return Some(slot);
            }
            cursor = record.next;
        }
        None
    }

    /// The record for `ptr`, if any.
    pub fn get(&self, ptr: Address) -> Option<&AllocationRecord> {
        self.lookup_slot(ptr)
            .and_then(|slot| self.records[slot].as_ref())
    }

    /// The record for `ptr`, if any, mutably.
    pub fn get_mut(&mut self, ptr: Address) -> Option<&mut AllocationRecord> {
        let slot = self.lookup_slot(ptr)?;
        self.records[slot].as_mut()
    }

    /// Insert or update the record for `ptr`.
    ///
    /// If `ptr` is already present its `size` and `finalizer` are replaced
    /// in place, the `tag` is preserved, and the load factor is untouched.
    /// Otherwise a new record is linked at the head of its bucket chain; the
    /// upsize check runs only after the record is in place, so the first
    /// access after a grow already observes the new bucket array.
    pub fn put(
        &mut self,
        ptr: Address,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> &mut AllocationRecord {
        if let Some(slot) = self.lookup_slot(ptr) {
            let record = self.records[slot]
                .as_mut()
                .expect("live chain references an empty arena slot");
            record.size = size;
            record.finalizer = finalizer;
            return record;
        }

        let mut record = AllocationRecord::new(ptr, size, finalizer);
        let bucket = self.bucket_of(ptr);
        record.next = self.buckets[bucket];
        let slot = match self.free.pop() {
            Some(slot) => {
                self.records[slot] = Some(record);
                slot
            }
            None => {
                self.records.push(Some(record));
                self.records.len() - 1
            }
        };
        self.buckets[bucket] = Some(slot);
        self.len += 1;
        self.maybe_upsize();
        self.records[slot]
            .as_mut()
            .expect("freshly inserted arena slot is empty")
    }

    /// Unlink and return the record for `ptr`.
    ///
    /// When `call_finalizer` is set and the record carries a finalizer, the
    /// finalizer runs with the block's base address before the record is
    /// handed back. The managed block itself is *not* freed here; the caller
    /// owns that storage. Removing the last record of a bucket resets the
    /// bucket head to `None`, and the downsize check runs after the chain is
    /// already unlinked.
    pub fn remove(&mut self, ptr: Address, call_finalizer: bool) -> Option<AllocationRecord> {
        let bucket = self.bucket_of(ptr);
        let mut prev: Option<usize> = None;
        let mut cursor = self.buckets[bucket];
        while let Some(slot) = cursor {
            let record = self.records[slot].as_ref()?;
            if record.ptr != ptr {
                prev = Some(slot);
                cursor = record.next;
                continue;
            }

            let next = record.next;
            match prev {
                None => self.buckets[bucket] = next,
                Some(prev_slot) => {
                    if let Some(prev_record) = self.records[prev_slot].as_mut() {
                        prev_record.next = next;
                    }
                }
            }
            let mut record = self.records[slot].take()?;
            record.next = None;
            self.free.push(slot);
            self.len -= 1;

            if call_finalizer {
                if let Some(finalizer) = record.finalizer {
                    finalizer(record.ptr);
                }
            }
            self.maybe_downsize();
            return Some(record);
        }
        None
    }

    /// Iterate over every live record.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.iter().filter_map(|slot| slot.as_ref())
    }

    /// Iterate over every live record, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AllocationRecord> {
        self.records.iter_mut().filter_map(|slot| slot.as_mut())
    }

    fn load_factor(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    fn maybe_upsize(&mut self) {
        if self.load_factor() > self.upsize_factor {
            let new_capacity = next_prime(self.capacity() * 2);
            self.rehash(new_capacity);
        }
    }

    fn maybe_downsize(&mut self) {
        if self.load_factor() < self.downsize_factor && self.capacity() > self.min_capacity {
            let new_capacity = next_prime(std::cmp::max(self.min_capacity, self.capacity() / 2));
            if new_capacity < self.capacity() {
                self.rehash(new_capacity);
            }
        }
    }

    /// Move every record into buckets computed against `new_capacity`. Arena
    /// slots are stable; only heads and links change.
    fn rehash(&mut self, new_capacity: usize) {
        trace!(
            "rehashing allocation index: {} -> {} buckets ({} records)",
            self.capacity(),
            new_capacity,
            self.len
        );
        self.buckets = vec![None; new_capacity];
        for slot in 0..self.records.len() {
            let Some(record) = self.records[slot].as_ref() else {
                continue;
            };
            let bucket = self.bucket_of(record.ptr);
            let head = self.buckets[bucket];
            if let Some(record) = self.records[slot].as_mut() {
                record.next = head;
            }
            self.buckets[bucket] = Some(slot);
        }
        self.recompute_sweep_limit();
    }
}
