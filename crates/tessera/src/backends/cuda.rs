//! CUDA backend for NVIDIA GPUs
//!
//! Device enumeration and the host↔device transfer boundary, behind the
//! `cuda` cargo feature. The host submits and returns immediately; queue
//! ordering and events come from the generic [`Queue`](crate::Queue).
//!
//! Kernel launch is the seam where a PTX-producing collaborator plugs in:
//! host-authored Rust closures cannot be lowered to device code by this
//! layer, so `launch` reports `Unsupported` until a compiled module is
//! provided. Without the feature the whole backend is a stub whose
//! constructor reports `Unsupported` and whose platform enumerates no
//! devices.

use crate::device::Device;
use crate::error::{AccelError, Result};

/// Shared-memory budget per block reported for CUDA devices
#[allow(dead_code)]
const CUDA_SHARED_MEM_BYTES: usize = 48 * 1024;

#[cfg(feature = "cuda")]
mod real {
    use super::*;
    use cudarc::driver::{CudaDevice, CudaSlice};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Enumerate CUDA devices in ordinal order
    pub(crate) fn enumerate() -> Result<Vec<Device>> {
        let count = CudaDevice::count()
            .map_err(|e| AccelError::DeviceUnavailable(format!("cuda device count: {e}")))?;
        let mut devices = Vec::with_capacity(count as usize);
        for ordinal in 0..count as u32 {
            let dev = CudaDevice::new(ordinal as usize)
                .map_err(|e| AccelError::DeviceUnavailable(format!("cuda device {ordinal}: {e}")))?;
            let name = dev
                .name()
                .unwrap_or_else(|_| format!("cuda device {ordinal}"));
            devices.push(Device::new_cuda(ordinal, name, CUDA_SHARED_MEM_BYTES));
        }
        Ok(devices)
    }

    /// Handle to one linear device allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CudaBufferHandle(u64);

    /// Device-resident linear memory and transfers for one CUDA device
    pub struct CudaBackend {
        device: Arc<CudaDevice>,
        buffers: HashMap<u64, CudaSlice<u8>>,
        next_id: u64,
    }

    impl CudaBackend {
        /// Open the CUDA device at `ordinal`
        pub fn new(ordinal: usize) -> Result<Self> {
            let device = CudaDevice::new(ordinal)
                .map_err(|e| AccelError::DeviceUnavailable(format!("cuda device {ordinal}: {e}")))?;
            Ok(CudaBackend {
                device,
                buffers: HashMap::new(),
                next_id: 0,
            })
        }

        pub fn is_available() -> bool {
            CudaDevice::count().map(|c| c > 0).unwrap_or(false)
        }

        /// Allocate `size` zeroed bytes of device memory
        pub fn allocate_buffer(&mut self, size: usize) -> Result<CudaBufferHandle> {
            let slice = self
                .device
                .alloc_zeros::<u8>(size)
                .map_err(|e| AccelError::AllocationFailed {
                    what: format!("cuda buffer: {e}"),
                    bytes: size,
                })?;
            let id = self.next_id;
            self.next_id += 1;
            self.buffers.insert(id, slice);
            Ok(CudaBufferHandle(id))
        }

        pub fn free_buffer(&mut self, handle: CudaBufferHandle) -> Result<()> {
            self.buffers
                .remove(&handle.0)
                .map(drop)
                .ok_or_else(|| AccelError::execution_fault(format!("invalid cuda buffer handle {}", handle.0)))
        }

        /// Host-to-device transfer (the cross-space transfer primitive)
        pub fn copy_to_buffer(&mut self, handle: CudaBufferHandle, data: &[u8]) -> Result<()> {
            let slice = self
                .buffers
                .get_mut(&handle.0)
                .ok_or_else(|| AccelError::execution_fault(format!("invalid cuda buffer handle {}", handle.0)))?;
            self.device
                .htod_sync_copy_into(data, slice)
                .map_err(|e| AccelError::execution_fault(format!("htod copy: {e}")))
        }

        /// Device-to-host transfer
        pub fn copy_from_buffer(&mut self, handle: CudaBufferHandle, out: &mut [u8]) -> Result<()> {
            let slice = self
                .buffers
                .get(&handle.0)
                .ok_or_else(|| AccelError::execution_fault(format!("invalid cuda buffer handle {}", handle.0)))?;
            self.device
                .dtoh_sync_copy_into(slice, out)
                .map_err(|e| AccelError::execution_fault(format!("dtoh copy: {e}")))
        }

        /// Launch seam for compiled device kernels
        pub fn launch(&mut self) -> Result<()> {
            Err(AccelError::unsupported(
                "CUDA kernel launch requires a compiled PTX module",
            ))
        }
    }
}

#[cfg(feature = "cuda")]
pub use real::{CudaBackend, CudaBufferHandle};

#[cfg(feature = "cuda")]
pub(crate) use real::enumerate;

#[cfg(not(feature = "cuda"))]
pub(crate) fn enumerate() -> Result<Vec<Device>> {
    Ok(Vec::new())
}

#[cfg(not(feature = "cuda"))]
#[derive(Debug)]
pub struct CudaBackend;

#[cfg(not(feature = "cuda"))]
impl CudaBackend {
    pub fn new(_ordinal: usize) -> Result<Self> {
        Err(AccelError::unsupported(
            "CUDA backend requires the 'cuda' feature to be enabled",
        ))
    }

    pub fn is_available() -> bool {
        false
    }
}
