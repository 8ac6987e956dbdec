//! Device enumeration and capability queries
//!
//! A [`Device`] identifies one physical execution unit and carries its
//! capability-query surface. Devices are created once per unit at
//! enumeration time and never mutated afterwards; handles clone cheaply.
//!
//! Per-accelerator limits differ even on the same device (a serial
//! accelerator cannot realize more than one thread per block, a threaded
//! one can), so the maxima live in [`AccProps`] and are queried per
//! (accelerator type, device) pair by the executors.

use std::sync::{Arc, OnceLock};
use std::thread;

use tracing::debug;

use crate::dim::Dim;
use crate::error::{AccelError, Result};

/// Shared-memory budget reported per block on host devices.
///
/// Host RAM would make the budget meaningless as a portability check, so
/// hosts report the figure discrete GPUs commonly expose.
pub const HOST_SHARED_MEM_BYTES: usize = 48 * 1024;

/// Execution technology to enumerate devices for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Host CPU (serves both the serial and the threaded accelerator)
    Host,
    /// NVIDIA GPUs (requires the `cuda` feature; enumerates empty without it)
    Cuda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceKind {
    Host,
    #[allow(dead_code)]
    Cuda {
        ordinal: u32,
    },
}

#[derive(Debug)]
struct DeviceInner {
    name: String,
    kind: DeviceKind,
    concurrency: usize,
    memory_bytes: usize,
    shared_mem_bytes: usize,
}

/// Total RAM reported by the OS, or 0 when it cannot be queried
fn host_memory_bytes() -> usize {
    #[cfg(target_os = "linux")]
    if let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") {
        for line in meminfo.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                if let Some(kib) = rest.split_whitespace().next().and_then(|v| v.parse::<usize>().ok()) {
                    return kib * 1024;
                }
            }
        }
    }
    0
}

/// Handle to one physical execution unit
#[derive(Debug, Clone)]
pub struct Device(Arc<DeviceInner>);

impl Device {
    /// Human-readable device name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of hardware threads the device can run concurrently
    pub fn concurrency(&self) -> usize {
        self.0.concurrency
    }

    /// Total device memory in bytes; 0 when the platform cannot report it
    pub fn memory_bytes(&self) -> usize {
        self.0.memory_bytes
    }

    /// Per-block shared-memory budget in bytes
    pub fn shared_mem_bytes(&self) -> usize {
        self.0.shared_mem_bytes
    }

    pub(crate) fn kind(&self) -> DeviceKind {
        self.0.kind
    }

    /// True when both handles refer to the same physical device
    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[allow(dead_code)]
    pub(crate) fn new_cuda(ordinal: u32, name: String, shared_mem_bytes: usize) -> Self {
        Device(Arc::new(DeviceInner {
            name,
            kind: DeviceKind::Cuda { ordinal },
            concurrency: 1,
            // Not queried at enumeration time; the backend owns allocation.
            memory_bytes: 0,
            shared_mem_bytes,
        }))
    }

    fn host() -> Result<Self> {
        // One handle per physical unit: re-enumeration returns the same
        // device, so handles from different enumerations compare equal.
        static HOST: OnceLock<Device> = OnceLock::new();
        if let Some(device) = HOST.get() {
            return Ok(device.clone());
        }
        let concurrency = thread::available_parallelism()
            .map_err(|e| AccelError::DeviceUnavailable(format!("cannot query host parallelism: {e}")))?
            .get();
        let device = Device(Arc::new(DeviceInner {
            name: format!("host cpu ({concurrency} threads)"),
            kind: DeviceKind::Host,
            concurrency,
            memory_bytes: host_memory_bytes(),
            shared_mem_bytes: HOST_SHARED_MEM_BYTES,
        }));
        Ok(HOST.get_or_init(|| device).clone())
    }
}

/// Enumerate the devices of one platform.
///
/// Re-enumerable with stable ordering per process run. Enumeration failure
/// (the platform cannot be queried at all) is fatal to device creation and
/// reported as [`AccelError::DeviceUnavailable`].
pub fn enumerate_devices(platform: Platform) -> Result<Vec<Device>> {
    let devices = match platform {
        Platform::Host => vec![Device::host()?],
        Platform::Cuda => crate::backends::cuda::enumerate()?,
    };
    debug!(?platform, count = devices.len(), "enumerated devices");
    Ok(devices)
}

/// Per-accelerator execution limits on one device.
///
/// Obtained from an executor type via its `props(&Device)` associated
/// function; consumed by [`WorkDiv::validate`](crate::WorkDiv::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccProps<const N: usize> {
    /// Flat maximum number of threads per block
    pub max_block_threads: u32,
    /// Per-dimension maximum block-thread extent
    pub max_block_thread_extent: Dim<N>,
    /// Per-dimension maximum grid extent
    pub max_grid_extent: Dim<N>,
    /// Per-block shared-memory budget in bytes
    pub shared_mem_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_enumeration_is_stable() {
        let first = enumerate_devices(Platform::Host).unwrap();
        let second = enumerate_devices(Platform::Host).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].name(), second[0].name());
        assert!(first[0].concurrency() >= 1);
        assert_eq!(first[0].shared_mem_bytes(), HOST_SHARED_MEM_BYTES);
    }

    #[test]
    fn test_device_identity_survives_reenumeration() {
        let dev = enumerate_devices(Platform::Host).unwrap().remove(0);
        let clone = dev.clone();
        assert!(dev.same_device(&clone));
        // One handle per physical unit: a second enumeration hands back
        // the same device, not a fresh lookalike.
        let again = enumerate_devices(Platform::Host).unwrap().remove(0);
        assert!(dev.same_device(&again));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_enumerates_empty_without_feature() {
        assert!(enumerate_devices(Platform::Cuda).unwrap().is_empty());
    }
}
