//! Per-block shared-memory arena
//!
//! Each block gets a fresh, zero-initialized arena at block entry; it is
//! dropped after all threads of the block complete, before the next block
//! begins. Static-style allocations are keyed by per-thread call order:
//! every thread of a block must perform the same `shared_alloc` calls in
//! the same order (the collective-call contract), and all of them observe
//! the same region. The dynamic region's size is fixed per exec task and
//! occupies the front of the arena.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicU8, AtomicUsize};

use parking_lot::Mutex;

mod sealed {
    pub trait Sealed {}
}

/// Element types that may live in block-shared memory.
///
/// Restricted to atomics: a shared region is observed concurrently by all
/// threads of a block, so plain loads and stores through `&T` would be
/// data races. Zero-initialized storage is a valid initial state for every
/// implementor.
pub trait SharedElem: sealed::Sealed {}

macro_rules! shared_elem {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl SharedElem for $ty {}
        )+
    };
}

shared_elem!(AtomicU8, AtomicU32, AtomicU64, AtomicI32, AtomicI64, AtomicUsize);

struct SlotTable {
    /// (offset, size) per static allocation, in collective call order
    regions: Vec<(usize, usize)>,
    bump: usize,
}

/// One block's shared-memory arena.
pub struct BlockShared {
    /// u64-backed so every [`SharedElem`] is sufficiently aligned
    storage: UnsafeCell<Box<[u64]>>,
    capacity: usize,
    dyn_bytes: usize,
    slots: Mutex<SlotTable>,
}

// Safety: the raw bytes are only ever reached as atomics, and the slot
// table handing out disjoint regions is behind a mutex.
unsafe impl Send for BlockShared {}
unsafe impl Sync for BlockShared {}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

impl BlockShared {
    /// Arena with `capacity` bytes total, the first `dyn_bytes` of which
    /// form the dynamic region. Callers validate `dyn_bytes <= capacity`
    /// at task-creation time.
    pub(crate) fn new(capacity: usize, dyn_bytes: usize) -> Self {
        debug_assert!(dyn_bytes <= capacity);
        let words = capacity.div_ceil(8).max(1);
        BlockShared {
            storage: UnsafeCell::new(vec![0u64; words].into_boxed_slice()),
            capacity,
            dyn_bytes,
            slots: Mutex::new(SlotTable {
                regions: Vec::new(),
                bump: align_up(dyn_bytes, 8),
            }),
        }
    }

    fn base(&self) -> *mut u8 {
        unsafe { (*self.storage.get()).as_mut_ptr().cast() }
    }

    /// Resolve the static allocation for collective call number `slot`.
    ///
    /// Panics on over-budget or out-of-order allocation; both are contract
    /// violations of the kernel body, not recoverable conditions.
    pub(crate) fn get_or_alloc(&self, slot: usize, size: usize, align: usize) -> *mut u8 {
        let mut slots = self.slots.lock();
        if let Some(&(offset, recorded)) = slots.regions.get(slot) {
            assert_eq!(
                recorded, size,
                "collective shared allocation #{slot} requested with differing sizes"
            );
            return unsafe { self.base().add(offset) };
        }
        assert_eq!(
            slot,
            slots.regions.len(),
            "shared allocations must be requested collectively, in identical order, by every thread of the block"
        );
        let offset = align_up(slots.bump, align);
        let end = offset + size;
        assert!(
            end <= self.capacity,
            "block shared memory exhausted: slot #{slot} needs {size} bytes at offset {offset}, capacity {} bytes",
            self.capacity
        );
        slots.regions.push((offset, size));
        slots.bump = end;
        unsafe { self.base().add(offset) }
    }

    /// The dynamic region, sized per work-division instance
    pub(crate) fn dyn_region(&self) -> &[AtomicU8] {
        // Safety: AtomicU8 is layout-compatible with u8 and the region is
        // only reached through this shared view.
        unsafe { std::slice::from_raw_parts(self.base() as *const AtomicU8, self.dyn_bytes) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_collective_slots_resolve_to_same_region() {
        let arena = BlockShared::new(1024, 0);
        let first = arena.get_or_alloc(0, 4, 4);
        let again = arena.get_or_alloc(0, 4, 4);
        assert_eq!(first, again);
        let second = arena.get_or_alloc(1, 8, 8);
        assert_ne!(first, second);
    }

    #[test]
    fn test_dyn_region_precedes_static_allocations() {
        let arena = BlockShared::new(256, 32);
        assert_eq!(arena.dyn_region().len(), 32);
        let first = arena.get_or_alloc(0, 4, 4);
        let distance = first as usize - arena.base() as usize;
        assert!(distance >= 32);
    }

    #[test]
    fn test_zero_initialized() {
        let arena = BlockShared::new(64, 16);
        for byte in arena.dyn_region() {
            assert_eq!(byte.load(Ordering::Relaxed), 0);
        }
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_over_budget_panics() {
        let arena = BlockShared::new(16, 0);
        arena.get_or_alloc(0, 64, 8);
    }
}
