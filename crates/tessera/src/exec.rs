//! Kernel-execution task construction and dispatch seam
//!
//! [`create_task_exec`] validates a (work division, kernel, args) triple
//! against the chosen executor's limits on the chosen device and returns
//! an inert [`ExecTask`]. Validation is eager: everything that static
//! information can decide fails here, before anything is enqueued; only
//! true backend faults defer to execution time.

use std::marker::PhantomData;

use tracing::debug;

use crate::device::{AccProps, Device};
use crate::error::{AccelError, Result};
use crate::task::TaskRun;
use crate::workdiv::WorkDiv;

/// An executor able to run kernels of shape `K(acc, &Args)` over a
/// rank-`N` work division.
///
/// One implementation per backend; the accelerator variant it drives is
/// fixed by the implementation, so capability resolution is purely static.
pub trait KernelExec<const N: usize, K, Args>: Sized {
    /// Execution limits of this executor on `device`
    fn props(device: &Device) -> AccProps<N>;

    /// Drive the grid: iterate blocks in row-major order, realize each
    /// block's threads under this backend's concurrency model, invoke the
    /// kernel exactly once per thread index, and release the block's
    /// shared memory before the next block begins.
    fn execute(task: ExecTask<Self, K, Args, N>) -> Result<()>;
}

/// A built kernel-launch task: work division, kernel body, argument
/// bundle, and the device it was validated against. Immutable once built;
/// consumed on run or enqueue.
pub struct ExecTask<E, K, Args, const N: usize> {
    pub(crate) device: Device,
    pub(crate) workdiv: WorkDiv<N>,
    pub(crate) kernel: K,
    pub(crate) args: Args,
    pub(crate) shared_dyn_bytes: usize,
    _exec: PhantomData<E>,
}

impl<E, K, Args, const N: usize> ExecTask<E, K, Args, N>
where
    E: KernelExec<N, K, Args>,
{
    /// Set the dynamic shared-memory requirement for this launch.
    ///
    /// Checked against the device budget now, not at execution time.
    pub fn with_shared_dyn_bytes(mut self, bytes: usize) -> Result<Self> {
        let available = E::props(&self.device).shared_mem_bytes;
        if bytes > available {
            return Err(AccelError::SharedMemOverBudget {
                requested: bytes,
                available,
            });
        }
        self.shared_dyn_bytes = bytes;
        Ok(self)
    }

    /// The work division this task was built with
    pub fn workdiv(&self) -> &WorkDiv<N> {
        &self.workdiv
    }
}

impl<E, K, Args, const N: usize> TaskRun for ExecTask<E, K, Args, N>
where
    E: KernelExec<N, K, Args>,
{
    fn run(self) -> Result<()> {
        E::execute(self)
    }
}

/// Build a kernel-launch task for executor `E`.
///
/// Fails with a configuration error when the work division exceeds the
/// executor's limits on `device`; on success the task is inert until run
/// or enqueued.
pub fn create_task_exec<E, K, Args, const N: usize>(
    device: &Device,
    workdiv: WorkDiv<N>,
    kernel: K,
    args: Args,
) -> Result<ExecTask<E, K, Args, N>>
where
    E: KernelExec<N, K, Args>,
{
    let props = E::props(device);
    workdiv.validate(&props)?;
    debug!(%workdiv, device = device.name(), "built exec task");
    Ok(ExecTask {
        device: device.clone(),
        workdiv,
        kernel,
        args,
        shared_dyn_bytes: 0,
        _exec: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acc::Acc;
    use crate::backends::serial::{AccSerial, SerialExec};
    use crate::device::{enumerate_devices, Platform};
    use crate::dim::Dim;
    use crate::error::ErrorKind;

    fn host() -> Device {
        enumerate_devices(Platform::Host).unwrap().remove(0)
    }

    fn noop(_acc: &AccSerial<1>, _args: &()) {}

    #[test]
    fn test_oversized_workdiv_rejected_at_creation() {
        // Serial accelerators take one thread per block.
        let workdiv = WorkDiv::new(Dim([4]), Dim([2]), Dim([1]));
        let Err(err) = create_task_exec::<SerialExec, _, _, 1>(&host(), workdiv, noop, ()) else {
            panic!("oversized work division accepted");
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_shared_dyn_budget_checked_eagerly() {
        let device = host();
        let workdiv = WorkDiv::new(Dim([1]), Dim([1]), Dim([1]));
        let task = create_task_exec::<SerialExec, _, _, 1>(&device, workdiv, noop, ()).unwrap();
        let Err(err) = task.with_shared_dyn_bytes(device.shared_mem_bytes() + 1) else {
            panic!("over-budget dynamic shared memory accepted");
        };
        assert!(matches!(err, AccelError::SharedMemOverBudget { .. }));
    }

    #[test]
    fn test_task_runs_synchronously() {
        let workdiv = WorkDiv::new(Dim([2]), Dim([1]), Dim([1]));
        let kernel = |acc: &AccSerial<1>, _: &()| {
            let _ = acc.linear_block_idx();
        };
        let task = create_task_exec::<SerialExec, _, _, 1>(&host(), workdiv, kernel, ()).unwrap();
        task.run().unwrap();
    }
}
