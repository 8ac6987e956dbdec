//! Accelerator capability contracts
//!
//! [`Acc`] is the only API a kernel body may call. It bundles the
//! indexing state of one logical thread with the capability operations
//! (atomics, block synchronization, block-shared memory, random
//! generation, time, math). Each backend supplies one accelerator variant
//! implementing the trait; kernels written against `A: Acc<N>` run
//! unmodified on every backend, with the realization resolved statically
//! by the type — never by runtime branching.

mod atomic;
mod shared;

pub use atomic::AtomicCell;
pub use shared::{BlockShared, SharedElem};

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dim::Dim;
use crate::workdiv::WorkDiv;

/// Granularity at which an atomic operation must be indivisible.
///
/// Selectable independently per call site; stronger scopes pay stronger
/// memory ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicScope {
    /// Among all threads in the system
    System,
    /// Among the threads of one block
    Block,
    /// Among the elements of one thread
    Thread,
}

impl AtomicScope {
    fn ordering(self) -> Ordering {
        match self {
            AtomicScope::System => Ordering::SeqCst,
            AtomicScope::Block => Ordering::AcqRel,
            AtomicScope::Thread => Ordering::Relaxed,
        }
    }
}

/// splitmix64; enough bit diffusion to decorrelate per-thread streams
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

/// The execution context one kernel invocation sees.
///
/// Owned exclusively by the executor for the lifetime of one invocation;
/// it never escapes that scope.
pub trait Acc<const N: usize> {
    // Indexing / work division

    /// Grid extent in blocks
    fn grid_block_extent(&self) -> Dim<N>;
    /// Block extent in threads
    fn block_thread_extent(&self) -> Dim<N>;
    /// Elements-per-thread extent; the kernel iterates this itself
    fn thread_elem_extent(&self) -> Dim<N>;
    /// This block's index within the grid
    fn grid_block_idx(&self) -> Dim<N>;
    /// This thread's index within the block
    fn block_thread_idx(&self) -> Dim<N>;

    /// Linear block index, row-major with the last dimension fastest
    fn linear_block_idx(&self) -> u64 {
        self.grid_block_extent().linearize(self.grid_block_idx())
    }

    /// Linear thread index within the block
    fn linear_thread_idx(&self) -> u64 {
        self.block_thread_extent().linearize(self.block_thread_idx())
    }

    /// Linear thread index across the whole grid
    fn global_thread_idx(&self) -> u64 {
        self.linear_block_idx() * self.block_thread_extent().prod() + self.linear_thread_idx()
    }

    // Block synchronization

    /// Barrier across the threads of this block.
    ///
    /// Every thread that entered the kernel body must call it the same
    /// number of times; mismatched call counts are undefined behavior and
    /// deliberately not detected.
    fn sync_block_threads(&self);

    // Block-shared memory

    /// Allocate one zero-initialized shared cell for this block.
    ///
    /// Must be requested collectively: every thread of the block performs
    /// the same `shared_alloc` calls in the same order, and all observe
    /// the same cell. Exceeding the per-block budget panics (contract
    /// violation).
    fn shared_alloc<T: SharedElem>(&self) -> &T;

    /// Collective allocation of a zero-initialized shared slice
    fn shared_alloc_slice<T: SharedElem>(&self, len: usize) -> &[T];

    /// The dynamic shared region, sized per exec task
    fn shared_dyn(&self) -> &[AtomicU8];

    // Time

    /// Monotonic clock in nanoseconds; epoch is this accelerator
    /// instance's creation, readings are comparable only within it
    fn clock_ns(&self) -> u64;

    // Atomics

    /// Atomic add; returns the previous value
    fn atomic_add<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_add(v, scope.ordering())
    }

    /// Atomic subtract; returns the previous value
    fn atomic_sub<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_sub(v, scope.ordering())
    }

    /// Atomic bitwise and; returns the previous value
    fn atomic_and<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_and(v, scope.ordering())
    }

    /// Atomic bitwise or; returns the previous value
    fn atomic_or<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_or(v, scope.ordering())
    }

    /// Atomic bitwise xor; returns the previous value
    fn atomic_xor<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_xor(v, scope.ordering())
    }

    /// Atomic minimum; returns the previous value
    fn atomic_min<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_min(v, scope.ordering())
    }

    /// Atomic maximum; returns the previous value
    fn atomic_max<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.fetch_max(v, scope.ordering())
    }

    /// Atomic exchange; returns the previous value
    fn atomic_exchange<C: AtomicCell>(&self, cell: &C, v: C::Value, scope: AtomicScope) -> C::Value {
        cell.swap(v, scope.ordering())
    }

    /// Atomic compare-and-swap; returns the previous value
    fn atomic_compare_exchange<C: AtomicCell>(
        &self,
        cell: &C,
        current: C::Value,
        new: C::Value,
        scope: AtomicScope,
    ) -> C::Value {
        match cell.compare_exchange(current, new, scope.ordering(), Ordering::Relaxed) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Atomic f32 add over the value's bit pattern; returns the previous value
    fn atomic_add_f32(&self, cell: &AtomicU32, v: f32, scope: AtomicScope) -> f32 {
        let order = scope.ordering();
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + v).to_bits();
            match cell.compare_exchange_weak(current, next, order, Ordering::Relaxed) {
                Ok(previous) => return f32::from_bits(previous),
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomic f64 add over the value's bit pattern; returns the previous value
    fn atomic_add_f64(&self, cell: &AtomicU64, v: f64, scope: AtomicScope) -> f64 {
        let order = scope.ordering();
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + v).to_bits();
            match cell.compare_exchange_weak(current, next, order, Ordering::Relaxed) {
                Ok(previous) => return f64::from_bits(previous),
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomic f32 exchange over the value's bit pattern; returns the previous value
    fn atomic_exchange_f32(&self, cell: &AtomicU32, v: f32, scope: AtomicScope) -> f32 {
        f32::from_bits(cell.swap(v.to_bits(), scope.ordering()))
    }

    /// Atomic f64 exchange over the value's bit pattern; returns the previous value
    fn atomic_exchange_f64(&self, cell: &AtomicU64, v: f64, scope: AtomicScope) -> f64 {
        f64::from_bits(cell.swap(v.to_bits(), scope.ordering()))
    }

    /// Atomic f32 compare-and-swap over the value's bit pattern.
    ///
    /// Comparison is bitwise, so NaN payloads compare by representation
    /// and -0.0 does not match +0.0. Returns the previous value.
    fn atomic_compare_exchange_f32(&self, cell: &AtomicU32, current: f32, new: f32, scope: AtomicScope) -> f32 {
        match cell.compare_exchange(current.to_bits(), new.to_bits(), scope.ordering(), Ordering::Relaxed) {
            Ok(previous) | Err(previous) => f32::from_bits(previous),
        }
    }

    /// Atomic f64 compare-and-swap over the value's bit pattern; see
    /// [`atomic_compare_exchange_f32`](Self::atomic_compare_exchange_f32)
    fn atomic_compare_exchange_f64(&self, cell: &AtomicU64, current: f64, new: f64, scope: AtomicScope) -> f64 {
        match cell.compare_exchange(current.to_bits(), new.to_bits(), scope.ordering(), Ordering::Relaxed) {
            Ok(previous) | Err(previous) => f64::from_bits(previous),
        }
    }

    // Random generation

    /// Per-thread random generator, seeded deterministically from the
    /// global seed, this thread's linear index, and a subsequence id.
    /// Reproducible across runs for identical seed and work division.
    fn random(&self, seed: u64, subsequence: u64) -> StdRng {
        let mixed = splitmix64(seed ^ splitmix64(self.global_thread_idx() ^ splitmix64(subsequence)));
        StdRng::seed_from_u64(mixed)
    }

    // Math

    fn sin_f32(&self, x: f32) -> f32 {
        x.sin()
    }
    fn cos_f32(&self, x: f32) -> f32 {
        x.cos()
    }
    fn exp_f32(&self, x: f32) -> f32 {
        x.exp()
    }
    fn ln_f32(&self, x: f32) -> f32 {
        x.ln()
    }
    fn sqrt_f32(&self, x: f32) -> f32 {
        x.sqrt()
    }
    fn abs_f32(&self, x: f32) -> f32 {
        x.abs()
    }
    fn min_f32(&self, a: f32, b: f32) -> f32 {
        a.min(b)
    }
    fn max_f32(&self, a: f32, b: f32) -> f32 {
        a.max(b)
    }
    fn fma_f32(&self, a: f32, b: f32, c: f32) -> f32 {
        a.mul_add(b, c)
    }
    fn sin_f64(&self, x: f64) -> f64 {
        x.sin()
    }
    fn cos_f64(&self, x: f64) -> f64 {
        x.cos()
    }
    fn exp_f64(&self, x: f64) -> f64 {
        x.exp()
    }
    fn ln_f64(&self, x: f64) -> f64 {
        x.ln()
    }
    fn sqrt_f64(&self, x: f64) -> f64 {
        x.sqrt()
    }
    fn abs_f64(&self, x: f64) -> f64 {
        x.abs()
    }
    fn min_f64(&self, a: f64, b: f64) -> f64 {
        a.min(b)
    }
    fn max_f64(&self, a: f64, b: f64) -> f64 {
        a.max(b)
    }
    fn fma_f64(&self, a: f64, b: f64, c: f64) -> f64 {
        a.mul_add(b, c)
    }
}

/// Shared per-thread state composed into every accelerator variant.
///
/// Backends hold one of these per logical thread and forward the index,
/// shared-memory, and clock operations to it — composition instead of a
/// base-class hierarchy.
pub(crate) struct AccState<const N: usize> {
    pub(crate) workdiv: WorkDiv<N>,
    pub(crate) block_idx: Dim<N>,
    pub(crate) thread_idx: Dim<N>,
    pub(crate) shared: Arc<BlockShared>,
    shared_calls: Cell<usize>,
    origin: Instant,
}

impl<const N: usize> AccState<N> {
    pub(crate) fn new(workdiv: WorkDiv<N>, block_idx: Dim<N>, thread_idx: Dim<N>, shared: Arc<BlockShared>) -> Self {
        AccState {
            workdiv,
            block_idx,
            thread_idx,
            shared,
            shared_calls: Cell::new(0),
            origin: Instant::now(),
        }
    }

    pub(crate) fn shared_alloc<T: SharedElem>(&self) -> &T {
        let slot = self.shared_calls.get();
        self.shared_calls.set(slot + 1);
        let ptr = self
            .shared
            .get_or_alloc(slot, std::mem::size_of::<T>(), std::mem::align_of::<T>());
        // Safety: the arena hands out a zero-initialized, properly aligned
        // region that lives as long as the Arc held by self.
        unsafe { &*ptr.cast::<T>() }
    }

    pub(crate) fn shared_alloc_slice<T: SharedElem>(&self, len: usize) -> &[T] {
        let slot = self.shared_calls.get();
        self.shared_calls.set(slot + 1);
        let ptr = self
            .shared
            .get_or_alloc(slot, std::mem::size_of::<T>() * len, std::mem::align_of::<T>());
        unsafe { std::slice::from_raw_parts(ptr.cast::<T>(), len) }
    }

    pub(crate) fn shared_dyn(&self) -> &[AtomicU8] {
        self.shared.dyn_region()
    }

    pub(crate) fn clock_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}
