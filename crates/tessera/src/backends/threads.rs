//! Multi-threaded host backend
//!
//! Each block is realized by one short-lived set of OS threads — one
//! worker per block thread, spawned and joined once per block — and
//! `sync_block_threads` is a true reusable barrier across those workers.
//! Blocks themselves run one at a time; kernels are required to be
//! independent across blocks, so no inter-block concurrency is needed for
//! correctness.

use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Barrier};
use std::thread;

use tracing::debug_span;

use crate::acc::{Acc, AccState, BlockShared, SharedElem};
use crate::device::{AccProps, Device};
use crate::dim::Dim;
use crate::error::{AccelError, Result};
use crate::exec::{ExecTask, KernelExec};

/// Block threads allowed per hardware thread. Workers park at barriers
/// rather than spin, so modest oversubscription is safe.
const THREADS_PER_CORE: usize = 8;

/// Accelerator variant handed to kernels by [`ThreadsExec`]
pub struct AccThreads<const N: usize> {
    state: AccState<N>,
    barrier: Arc<Barrier>,
}

impl<const N: usize> Acc<N> for AccThreads<N> {
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

    fn sync_block_threads(&self) {
        self.barrier.wait();
    }

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

/// Multi-threaded executor
pub struct ThreadsExec;

impl<const N: usize, K, Args> KernelExec<N, K, Args> for ThreadsExec
where
    K: Fn(&AccThreads<N>, &Args) + Sync,
    Args: Sync,
{
    fn props(device: &Device) -> AccProps<N> {
        let max = (device.concurrency() * THREADS_PER_CORE).min(u32::MAX as usize) as u32;
        AccProps {
            max_block_threads: max,
            max_block_thread_extent: Dim::splat(max),
            max_grid_extent: Dim::splat(u32::MAX),
            shared_mem_bytes: device.shared_mem_bytes(),
        }
    }

    fn execute(task: ExecTask<Self, K, Args, N>) -> Result<()> {
        let span = debug_span!(
            "threads_exec",
            blocks = task.workdiv.block_count(),
            threads = task.workdiv.threads_per_block()
        );
        let _enter = span.enter();

        let workdiv = task.workdiv;
        let budget = task.device.shared_mem_bytes();
        let num_threads = workdiv.threads_per_block() as usize;
        let kernel = &task.kernel;
        let args = &task.args;

        for block in 0..workdiv.block_count() {
            let block_idx = workdiv.grid_blocks.from_linear(block);
            let shared = Arc::new(BlockShared::new(budget, task.shared_dyn_bytes));
            let barrier = Arc::new(Barrier::new(num_threads));

            let panicked = thread::scope(|scope| {
                let mut workers = Vec::with_capacity(num_threads);
                for thread in 0..num_threads {
                    let thread_idx = workdiv.block_threads.from_linear(thread as u64);
                    let acc = AccThreads {
                        state: AccState::new(workdiv, block_idx, thread_idx, Arc::clone(&shared)),
                        barrier: Arc::clone(&barrier),
                    };
                    workers.push(scope.spawn(move || kernel(&acc, args)));
                }
                workers.into_iter().map(|w| w.join()).filter(|join| join.is_err()).count()
            });
            if panicked > 0 {
                return Err(AccelError::execution_fault(format!(
                    "{panicked} kernel thread(s) panicked in block {block_idx}"
                )));
            }
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
    use std::sync::atomic::{AtomicU32, Ordering};

    fn host() -> Device {
        enumerate_devices(Platform::Host).unwrap().remove(0)
    }

    #[test]
    fn test_props_scale_with_concurrency() {
        let device = host();
        let props = <ThreadsExec as KernelExec<1, fn(&AccThreads<1>, &()), ()>>::props(&device);
        assert!(props.max_block_threads as usize >= device.concurrency());
    }

    #[test]
    fn test_block_atomic_counter_equals_block_extent() {
        let device = host();
        for block_size in [1u32, 2, 4, 7] {
            let workdiv = WorkDiv::new(Dim([1]), Dim([block_size]), Dim([1]));
            let total = Arc::new(AtomicU32::new(0));
            let kernel = |acc: &AccThreads<1>, total: &Arc<AtomicU32>| {
                let counter = acc.shared_alloc::<AtomicU32>();
                acc.atomic_add(counter, 1u32, crate::acc::AtomicScope::Block);
                acc.sync_block_threads();
                if acc.linear_thread_idx() == 0 {
                    total.store(counter.load(Ordering::Acquire), Ordering::Release);
                }
            };
            create_task_exec::<ThreadsExec, _, _, 1>(&device, workdiv, kernel, Arc::clone(&total))
                .unwrap()
                .run()
                .unwrap();
            assert_eq!(total.load(Ordering::Acquire), block_size);
        }
    }

    #[test]
    fn test_kernel_panic_reported_as_fault() {
        let device = host();
        let workdiv = WorkDiv::new(Dim([1]), Dim([2]), Dim([1]));
        // No barrier anywhere: a panic must surface, not hang.
        let kernel = |acc: &AccThreads<1>, _: &()| {
            if acc.linear_thread_idx() == 1 {
                panic!("boom");
            }
        };
        let task = match create_task_exec::<ThreadsExec, _, _, 1>(&device, workdiv, kernel, ()) {
            Ok(task) => task,
            Err(err) => panic!("task creation failed: {err}"),
        };
        let err = task.run().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::RuntimeExecution);
    }
}
