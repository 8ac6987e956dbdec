//! Single-threaded host backend
//!
//! Grid and block loops are ordinary sequential iteration; "thread" is
//! nominal. The serial accelerator therefore reports a one-thread-per-block
//! maximum — a sequential loop cannot realize barrier semantics for more —
//! and kernels get their width from the grid and the elements-per-thread
//! extent instead.

use std::sync::atomic::AtomicU8;
use std::sync::Arc;

use tracing::debug_span;

use crate::acc::{Acc, AccState, BlockShared, SharedElem};
use crate::device::{AccProps, Device};
use crate::dim::Dim;
use crate::error::Result;
use crate::exec::{ExecTask, KernelExec};

/// Accelerator variant handed to kernels by [`SerialExec`]
pub struct AccSerial<const N: usize> {
    state: AccState<N>,
}

impl<const N: usize> Acc<N> for AccSerial<N> {
    fn grid_block_extent(&self) -> Dim<N> {
        self.state.workdiv.grid_blocks
    }

    fn block_thread_extent(&self) -> Dim<N> {
        self.state.workdiv.block_threads
    }

    fn thread_elem_extent(&self) -> Dim<N> {
        self.state.workdiv.thread_elems
    }

    fn grid_block_idx(&self) -> Dim<N> {
        self.state.block_idx
    }

    fn block_thread_idx(&self) -> Dim<N> {
        self.state.thread_idx
    }

    /// With one thread per block the barrier is trivially satisfied.
    fn sync_block_threads(&self) {}

    fn shared_alloc<T: SharedElem>(&self) -> &T {
        self.state.shared_alloc()
    }

    fn shared_alloc_slice<T: SharedElem>(&self, len: usize) -> &[T] {
        self.state.shared_alloc_slice(len)
    }

    fn shared_dyn(&self) -> &[AtomicU8] {
        self.state.shared_dyn()
    }

    fn clock_ns(&self) -> u64 {
        self.state.clock_ns()
    }
}

/// Single-threaded executor
pub struct SerialExec;

impl<const N: usize, K, Args> KernelExec<N, K, Args> for SerialExec
where
    K: Fn(&AccSerial<N>, &Args),
{
    fn props(device: &Device) -> AccProps<N> {
        AccProps {
            max_block_threads: 1,
            max_block_thread_extent: Dim::ones(),
            max_grid_extent: Dim::splat(u32::MAX),
            shared_mem_bytes: device.shared_mem_bytes(),
        }
    }

    fn execute(task: ExecTask<Self, K, Args, N>) -> Result<()> {
        let span = debug_span!(
            "serial_exec",
            blocks = task.workdiv.block_count(),
            threads = task.workdiv.threads_per_block()
        );
        let _enter = span.enter();

        let workdiv = task.workdiv;
        let budget = task.device.shared_mem_bytes();
        for block in 0..workdiv.block_count() {
            let block_idx = workdiv.grid_blocks.from_linear(block);
            let shared = Arc::new(BlockShared::new(budget, task.shared_dyn_bytes));
            for thread in 0..workdiv.threads_per_block() {
                let thread_idx = workdiv.block_threads.from_linear(thread);
                let acc = AccSerial {
                    state: AccState::new(workdiv, block_idx, thread_idx, Arc::clone(&shared)),
                };
                (task.kernel)(&acc, &task.args);
            }
            // Block-shared memory is released here, before the next block.
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{enumerate_devices, Platform};
    use crate::exec::create_task_exec;
    use crate::task::TaskRun;
    use crate::workdiv::WorkDiv;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn host() -> Device {
        enumerate_devices(Platform::Host).unwrap().remove(0)
    }

    #[test]
    fn test_every_block_visited_once() {
        let device = host();
        let workdiv = WorkDiv::new(Dim::new([2, 3]), Dim::ones(), Dim::ones());
        let visited = Arc::new(AtomicU64::new(0));
        let kernel = |acc: &AccSerial<2>, visited: &Arc<AtomicU64>| {
            visited.fetch_or(1 << acc.linear_block_idx(), Ordering::Relaxed);
        };
        create_task_exec::<SerialExec, _, _, 2>(&device, workdiv, kernel, Arc::clone(&visited))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(visited.load(Ordering::Relaxed), 0b11_1111);
    }

    #[test]
    fn test_elements_exposed_not_unrolled() {
        let device = host();
        let workdiv = WorkDiv::new(Dim([4]), Dim([1]), Dim([8]));
        let counted = Arc::new(AtomicU64::new(0));
        let kernel = |acc: &AccSerial<1>, counted: &Arc<AtomicU64>| {
            // One invocation per thread; the element extent is data.
            assert_eq!(acc.thread_elem_extent().prod(), 8);
            counted.fetch_add(1, Ordering::Relaxed);
        };
        create_task_exec::<SerialExec, _, _, 1>(&device, workdiv, kernel, Arc::clone(&counted))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(counted.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_float_atomics_over_bit_patterns() {
        use crate::acc::AtomicScope;
        use std::sync::atomic::AtomicU32;

        let device = host();
        let workdiv = WorkDiv::new(Dim([1]), Dim([1]), Dim([1]));
        let cell = Arc::new(AtomicU32::new(1.5f32.to_bits()));
        let kernel = |acc: &AccSerial<1>, cell: &Arc<AtomicU32>| {
            assert_eq!(acc.atomic_exchange_f32(cell, 2.5, AtomicScope::System), 1.5);
            // Matching current value swaps in the new one
            assert_eq!(acc.atomic_compare_exchange_f32(cell, 2.5, 4.0, AtomicScope::System), 2.5);
            // Stale expectation leaves the cell untouched
            assert_eq!(acc.atomic_compare_exchange_f32(cell, 2.5, 8.0, AtomicScope::System), 4.0);
        };
        create_task_exec::<SerialExec, _, _, 1>(&device, workdiv, kernel, Arc::clone(&cell))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(f32::from_bits(cell.load(Ordering::Relaxed)), 4.0);
    }

    #[test]
    fn test_shared_memory_reset_between_blocks() {
        let device = host();
        let workdiv = WorkDiv::new(Dim([8]), Dim([1]), Dim([1]));
        let kernel = |acc: &AccSerial<1>, _: &()| {
            let cell = acc.shared_alloc::<std::sync::atomic::AtomicU32>();
            // Fresh arena per block: the previous block's write is gone.
            assert_eq!(cell.load(Ordering::Relaxed), 0);
            cell.store(acc.linear_block_idx() as u32 + 1, Ordering::Relaxed);
        };
        create_task_exec::<SerialExec, _, _, 1>(&device, workdiv, kernel, ())
            .unwrap()
            .run()
            .unwrap();
    }
}
