//! Owning allocations backing memory views
//!
//! A [`Buffer`] is the exclusive owner of one allocation in a device's
//! memory space. Views borrow it through an `Arc` back-reference: they
//! keep the allocation alive but never own memory they merely slice, and
//! the buffer's extent and pitches fix the layout for every view over it.
//!
//! Rows may be padded: [`Buffer::alloc_pitched`] reserves a caller-chosen
//! row pitch, so pitched device-style layouts and plain contiguous ones
//! share the same view interface.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::trace;

use crate::device::{Device, DeviceKind};
use crate::dim::Dim;
use crate::error::{AccelError, Result};
use crate::mem::view::{View, ViewMut};

/// Raw bytes of one allocation.
///
/// u64-backed so any primitive `Pod` element is sufficiently aligned.
/// Mutation goes through raw pointers handed out by views and tasks; the
/// non-aliasing discipline is the caller's contract.
pub(crate) struct Storage {
    words: UnsafeCell<Box<[u64]>>,
    len_bytes: usize,
}

// Safety: Storage itself is just bytes; all concurrent access runs through
// views/tasks whose aliasing contract the caller upholds.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").field("len_bytes", &self.len_bytes).finish_non_exhaustive()
    }
}

impl Storage {
    fn new(len_bytes: usize) -> Result<Arc<Self>> {
        let words = len_bytes.div_ceil(8).max(1);
        let mut backing: Vec<u64> = Vec::new();
        backing.try_reserve_exact(words).map_err(|_| AccelError::AllocationFailed {
            what: "host buffer".into(),
            bytes: len_bytes,
        })?;
        backing.resize(words, 0);
        Ok(Arc::new(Storage {
            words: UnsafeCell::new(backing.into_boxed_slice()),
            len_bytes,
        }))
    }

    pub(crate) fn base(&self) -> *mut u8 {
        unsafe { (*self.words.get()).as_mut_ptr().cast() }
    }

    pub(crate) fn len_bytes(&self) -> usize {
        self.len_bytes
    }
}

fn natural_pitches<T, const N: usize>(extent: &Dim<N>) -> [usize; N] {
    let mut pitches = [0usize; N];
    pitches[N - 1] = std::mem::size_of::<T>();
    for d in (0..N - 1).rev() {
        pitches[d] = extent[d + 1] as usize * pitches[d + 1];
    }
    pitches
}

/// Owning, zero-initialized allocation with a fixed extent and layout
pub struct Buffer<T: Pod, const N: usize> {
    storage: Arc<Storage>,
    device: Device,
    extent: Dim<N>,
    pitches: [usize; N],
    _elem: PhantomData<T>,
}

impl<T: Pod, const N: usize> fmt::Debug for Buffer<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("device", &self.device.name())
            .field("extent", &self.extent)
            .field("pitches", &self.pitches)
            .finish_non_exhaustive()
    }
}

impl<T: Pod, const N: usize> Buffer<T, N> {
    /// Allocate a contiguous buffer of `extent` elements on `device`
    pub fn alloc(device: &Device, extent: Dim<N>) -> Result<Self> {
        Self::with_pitches(device, extent, natural_pitches::<T, N>(&extent))
    }

    /// Allocate with padded rows: `row_pitch_bytes` is the byte stride
    /// between consecutive rows (dimension `N-2`). Requires rank >= 2, a
    /// pitch of at least the natural row size, and element-size alignment.
    pub fn alloc_pitched(device: &Device, extent: Dim<N>, row_pitch_bytes: usize) -> Result<Self> {
        if N < 2 {
            return Err(AccelError::unsupported("pitched allocation requires rank >= 2"));
        }
        let elem = std::mem::size_of::<T>();
        let min = extent[N - 1] as usize * elem;
        if row_pitch_bytes < min || row_pitch_bytes % elem != 0 {
            return Err(AccelError::PitchTooSmall {
                pitch: row_pitch_bytes,
                min,
            });
        }
        let mut pitches = natural_pitches::<T, N>(&extent);
        pitches[N - 2] = row_pitch_bytes;
        for d in (0..N.saturating_sub(2)).rev() {
            pitches[d] = extent[d + 1] as usize * pitches[d + 1];
        }
        Self::with_pitches(device, extent, pitches)
    }

    fn with_pitches(device: &Device, extent: Dim<N>, pitches: [usize; N]) -> Result<Self> {
        if device.kind() != DeviceKind::Host {
            return Err(AccelError::unsupported(
                "device-resident buffers allocate through the CUDA backend",
            ));
        }
        let len_bytes = extent[0] as usize * pitches[0];
        let storage = Storage::new(len_bytes)?;
        trace!(extent = %extent, len_bytes, "allocated buffer");
        Ok(Buffer {
            storage,
            device: device.clone(),
            extent,
            pitches,
            _elem: PhantomData,
        })
    }

    /// Extent of the allocation in elements
    pub fn extent(&self) -> Dim<N> {
        self.extent
    }

    /// Byte stride between consecutive indices along dimension `d`
    pub fn pitch_bytes(&self, d: usize) -> usize {
        self.pitches[d]
    }

    /// Device this buffer lives on
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Read-only view over the whole buffer
    pub fn view(&self) -> View<T, N> {
        View::whole(Arc::clone(&self.storage), self.extent, self.pitches)
    }

    /// Mutable view over the whole buffer.
    ///
    /// Takes `&mut self` so the exclusive write path is visible in the
    /// borrow structure even though the storage itself is shared.
    pub fn view_mut(&mut self) -> ViewMut<T, N> {
        ViewMut::whole(Arc::clone(&self.storage), self.extent, self.pitches)
    }

    /// Read-only view over a sub-region
    pub fn sub_view(&self, offset: Dim<N>, extent: Dim<N>) -> Result<View<T, N>> {
        self.view().sub_view(offset, extent)
    }
}
