//! Backend implementations for different execution targets
//!
//! This module contains:
//! - `serial` - single-threaded host backend (reference realization)
//! - `threads` - multi-threaded host backend (one OS thread per block thread)
//! - `cuda` - NVIDIA GPU backend (feature-gated)

pub mod cuda;
pub mod serial;
pub mod threads;

pub use cuda::CudaBackend;
pub use serial::{AccSerial, SerialExec};
pub use threads::{AccThreads, ThreadsExec};
