//! Portable parallel-kernel execution for heterogeneous hardware
//!
//! This crate provides:
//! - **Accelerator Trait**: One capability contract ([`Acc`]) per kernel
//! - **Executors**: Serial and multi-threaded host backends, CUDA scaffold
//! - **Work Division**: Grid / block / element hierarchy with eager validation
//! - **Pitched Memory**: Typed buffers, strided views, copy/set task builders
//! - **Queues & Events**: Ordered asynchronous submission with completion tokens
//!
//! # Architecture
//!
//! A kernel is written once against `A: Acc<N>` and runs unmodified on
//! every backend; the realization of indexing, atomics, barriers, and
//! block-shared memory is resolved statically by the executor type:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Kernel Body                          │
//! │                fn(&A, &Args) where A: Acc<N>             │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    ExecTask                              │
//! │   (WorkDiv validated against AccProps at creation)       │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────┐
//!          ▼            ▼            ▼
//!    ┌──────────┐ ┌──────────┐ ┌──────────┐
//!    │  Serial  │ │ Threads  │ │   CUDA   │
//!    │ Executor │ │ Executor │ │ (feature)│
//!    └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! Tasks are inert values. They run either inline through [`TaskRun`] or
//! asynchronously on a [`Queue`], which executes them in submission order
//! and hands back an [`Event`] per task.
//!
//! # Usage
//!
//! ```rust
//! use tessera::{
//!     create_task_exec, enumerate_devices, Acc, AccSerial, Buffer, DevPtr, Dim, Platform,
//!     Queue, SerialExec, WorkDiv,
//! };
//!
//! # fn main() -> tessera::Result<()> {
//! let device = enumerate_devices(Platform::Host)?.remove(0);
//! let mut buf = Buffer::<u32, 1>::alloc(&device, Dim::new([64]))?;
//! let out = buf.view_mut().device_ptr()?;
//!
//! // Serial accelerators run one thread per block.
//! let workdiv = WorkDiv::linear(64, 1);
//! let kernel = |acc: &AccSerial<1>, out: &DevPtr<u32>| {
//!     let i = acc.global_thread_idx() as usize;
//!     unsafe { out.write(i, i as u32 * 2) };
//! };
//! let task = create_task_exec::<SerialExec, _, _, 1>(&device, workdiv, kernel, out)?;
//!
//! let queue = Queue::new(&device)?;
//! queue.enqueue(task)?.wait()?;
//!
//! let mut host = vec![0u32; 64];
//! buf.view().read_into(&mut host)?;
//! assert_eq!(host[21], 42);
//! # Ok(())
//! # }
//! ```

pub mod acc;
pub mod backends;
pub mod device;
pub mod dim;
pub mod error;
pub mod exec;
pub mod mem;
pub mod queue;
pub mod task;
pub mod workdiv;

pub use acc::{Acc, AtomicCell, AtomicScope, SharedElem};
pub use backends::{AccSerial, AccThreads, CudaBackend, SerialExec, ThreadsExec};
pub use device::{enumerate_devices, AccProps, Device, Platform};
pub use dim::{Dim, Dim1, Dim2, Dim3};
pub use error::{AccelError, ErrorKind, Result};
pub use exec::{create_task_exec, ExecTask, KernelExec};
pub use mem::{create_task_copy, create_task_set, Buffer, CopyTask, DevPtr, SetTask, View, ViewMut};
pub use queue::{Event, Queue};
pub use task::TaskRun;
pub use workdiv::{workdiv_for, WorkDiv};
