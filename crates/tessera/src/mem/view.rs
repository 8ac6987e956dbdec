//! Typed, strided, multi-dimensional windows over buffers
//!
//! A view exposes element type, rank, extent, a native pointer, and a
//! per-dimension pitch in bytes. The pitch of the innermost dimension
//! always equals the element size; each outer pitch defaults to the
//! product of the next-inner pitch and that dimension's extent, which
//! lets contiguous buffers, padded allocations, and sub-regions share one
//! interface.
//!
//! Views never own the memory they slice: each holds an `Arc`
//! back-reference to its base allocation, so a view (or a copy/set task
//! built from it) keeps the allocation alive.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64};
use std::sync::Arc;

use bytemuck::Pod;

use crate::dim::Dim;
use crate::error::{AccelError, Result};
use crate::mem::Storage;

/// Invoke `f` with the relative byte offset of each row covered by
/// `extent`, outer-to-inner, last-but-one dimension fastest. A "row" is a
/// run of `extent[N-1]` elements, contiguous because the innermost pitch
/// equals the element size.
pub(crate) fn for_each_row<const N: usize>(extent: &Dim<N>, pitches: &[usize; N], mut f: impl FnMut(usize)) {
    let rows: u64 = extent.0[..N - 1].iter().map(|&e| e as u64).product();
    for row in 0..rows {
        let mut rem = row;
        let mut byte = 0usize;
        for d in (0..N - 1).rev() {
            let e = (extent.0[d] as u64).max(1);
            byte += (rem % e) as usize * pitches[d];
            rem /= e;
        }
        f(byte);
    }
}

fn window_offset_bytes<const N: usize>(offset: &Dim<N>, pitches: &[usize; N]) -> usize {
    (0..N).map(|d| offset[d] as usize * pitches[d]).sum()
}

macro_rules! view_common {
    ($name:ident) => {
        impl<T: Pod, const N: usize> $name<T, N> {
            pub(crate) fn whole(storage: Arc<Storage>, extent: Dim<N>, pitches: [usize; N]) -> Self {
                debug_assert!(extent[0] as usize * pitches[0] <= storage.len_bytes());
                Self {
                    storage,
                    offset_bytes: 0,
                    extent,
                    pitches,
                    _elem: PhantomData,
                }
            }

            /// Extent of the view in elements
            pub fn extent(&self) -> Dim<N> {
                self.extent
            }

            /// Rank of the view
            pub const fn rank(&self) -> usize {
                N
            }

            /// Byte stride between consecutive indices along dimension `d`
            pub fn pitch_bytes(&self, d: usize) -> usize {
                self.pitches[d]
            }

            /// True when the view's rows are densely packed
            pub fn is_contiguous(&self) -> bool {
                let mut natural = std::mem::size_of::<T>();
                for d in (0..N).rev() {
                    if self.pitches[d] != natural {
                        return false;
                    }
                    natural *= self.extent[d] as usize;
                }
                true
            }

            /// Native (host-reachable) pointer to the first element
            pub fn as_ptr(&self) -> *const T {
                unsafe { self.storage.base().add(self.offset_bytes).cast() }
            }

            /// Window into a sub-region; shares the parent's pitches.
            ///
            /// Fails with a configuration error when `offset + extent`
            /// does not fit inside this view.
            pub fn sub_view(&self, offset: Dim<N>, extent: Dim<N>) -> Result<View<T, N>> {
                if !self.extent.contains_window(&offset, &extent) {
                    return Err(AccelError::out_of_bounds(
                        format!("offset {offset} + extent {extent}"),
                        self.extent,
                    ));
                }
                Ok(View {
                    storage: Arc::clone(&self.storage),
                    offset_bytes: self.offset_bytes + window_offset_bytes(&offset, &self.pitches),
                    extent,
                    pitches: self.pitches,
                    _elem: PhantomData,
                })
            }

            /// Pitch-aware gather of every element, row-major, into `out`
            pub fn read_into(&self, out: &mut [T]) -> Result<()> {
                let total = self.extent.prod() as usize;
                if out.len() != total {
                    return Err(AccelError::extent_mismatch(total, out.len()));
                }
                let row_elems = self.extent[N - 1] as usize;
                let base = self.as_ptr().cast::<u8>();
                let mut written = 0usize;
                for_each_row(&self.extent, &self.pitches, |byte| {
                    // Safety: the row lies inside the allocation by the
                    // extent/pitch invariants checked at construction.
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            base.add(byte).cast::<T>(),
                            out.as_mut_ptr().add(written),
                            row_elems,
                        );
                    }
                    written += row_elems;
                });
                Ok(())
            }

            pub(crate) fn storage(&self) -> &Arc<Storage> {
                &self.storage
            }

            pub(crate) fn offset_bytes(&self) -> usize {
                self.offset_bytes
            }

            pub(crate) fn pitches(&self) -> &[usize; N] {
                &self.pitches
            }
        }

        impl<T: Pod, const N: usize> fmt::Debug for $name<T, N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("extent", &self.extent)
                    .field("pitches", &self.pitches)
                    .field("offset_bytes", &self.offset_bytes)
                    .finish_non_exhaustive()
            }
        }
    };
}

/// Read-only view
pub struct View<T: Pod, const N: usize> {
    storage: Arc<Storage>,
    offset_bytes: usize,
    extent: Dim<N>,
    pitches: [usize; N],
    _elem: PhantomData<T>,
}

/// Mutable view
pub struct ViewMut<T: Pod, const N: usize> {
    storage: Arc<Storage>,
    offset_bytes: usize,
    extent: Dim<N>,
    pitches: [usize; N],
    _elem: PhantomData<T>,
}

view_common!(View);
view_common!(ViewMut);

impl<T: Pod, const N: usize> Clone for View<T, N> {
    fn clone(&self) -> Self {
        View {
            storage: Arc::clone(&self.storage),
            offset_bytes: self.offset_bytes,
            extent: self.extent,
            pitches: self.pitches,
            _elem: PhantomData,
        }
    }
}

impl<T: Pod, const N: usize> ViewMut<T, N> {
    /// Mutable native pointer to the first element
    pub fn as_mut_ptr(&mut self) -> *mut T {
        unsafe { self.storage.base().add(self.offset_bytes).cast() }
    }

    /// Read-only alias of this view
    pub fn as_view(&self) -> View<T, N> {
        View {
            storage: Arc::clone(&self.storage),
            offset_bytes: self.offset_bytes,
            extent: self.extent,
            pitches: self.pitches,
            _elem: PhantomData,
        }
    }

    /// Mutable window into a sub-region; shares the parent's pitches,
    /// with the same containment check as [`sub_view`](Self::sub_view)
    pub fn sub_view_mut(&mut self, offset: Dim<N>, extent: Dim<N>) -> Result<ViewMut<T, N>> {
        if !self.extent.contains_window(&offset, &extent) {
            return Err(AccelError::out_of_bounds(
                format!("offset {offset} + extent {extent}"),
                self.extent,
            ));
        }
        Ok(ViewMut {
            storage: Arc::clone(&self.storage),
            offset_bytes: self.offset_bytes + window_offset_bytes(&offset, &self.pitches),
            extent,
            pitches: self.pitches,
            _elem: PhantomData,
        })
    }

    /// Pitch-aware scatter of `data` (row-major) into the view
    pub fn write_from(&mut self, data: &[T]) -> Result<()> {
        let total = self.extent.prod() as usize;
        if data.len() != total {
            return Err(AccelError::extent_mismatch(total, data.len()));
        }
        let row_elems = self.extent[N - 1] as usize;
        let base = unsafe { self.storage.base().add(self.offset_bytes) };
        let mut read = 0usize;
        for_each_row(&self.extent, &self.pitches, |byte| {
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr().add(read), base.add(byte).cast::<T>(), row_elems);
            }
            read += row_elems;
        });
        Ok(())
    }

    /// Pointer bundle for kernel arguments.
    ///
    /// Requires a contiguous view; kernels index it linearly. The bundle
    /// holds the allocation's Arc, so it outlives any enqueued use.
    pub fn device_ptr(&mut self) -> Result<DevPtr<T>> {
        if !self.is_contiguous() {
            return Err(AccelError::unsupported(
                "device_ptr requires a contiguous view; copy into one first",
            ));
        }
        Ok(DevPtr {
            ptr: self.as_mut_ptr(),
            len: self.extent.prod() as usize,
            _keep: Arc::clone(&self.storage),
        })
    }
}

/// A kernel-side handle to one contiguous run of elements.
///
/// Plain reads and writes are unsafe — distinct threads must touch
/// distinct slots, exactly as on real device memory — while the atomic
/// accessors are safe and compose with the accelerator atomic ops.
pub struct DevPtr<T> {
    ptr: *mut T,
    len: usize,
    _keep: Arc<Storage>,
}

// Safety: the pointer targets Arc-owned Pod bytes; cross-thread discipline
// is the kernel contract, as for any accelerator memory.
unsafe impl<T> Send for DevPtr<T> {}
unsafe impl<T> Sync for DevPtr<T> {}

impl<T> Clone for DevPtr<T> {
    fn clone(&self) -> Self {
        DevPtr {
            ptr: self.ptr,
            len: self.len,
            _keep: Arc::clone(&self._keep),
        }
    }
}

impl<T: Pod> DevPtr<T> {
    /// Number of elements reachable through this handle
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `value` at linear index `i`.
    ///
    /// # Safety
    /// `i < len()`, and no other thread may touch slot `i` concurrently
    /// except through the atomic accessors.
    pub unsafe fn write(&self, i: usize, value: T) {
        debug_assert!(i < self.len);
        self.ptr.add(i).write(value);
    }

    /// Read the value at linear index `i`.
    ///
    /// # Safety
    /// `i < len()`, and no concurrent plain write to slot `i`.
    pub unsafe fn read(&self, i: usize) -> T {
        debug_assert!(i < self.len);
        self.ptr.add(i).read()
    }
}

macro_rules! devptr_atomic {
    ($($elem:ty => $atomic:ty),+ $(,)?) => {
        $(
            impl DevPtr<$elem> {
                /// Atomic window over slot `i`
                pub fn atomic(&self, i: usize) -> &$atomic {
                    assert!(i < self.len);
                    // Safety: slot is in bounds, element-aligned, and the
                    // atomic is layout-compatible with its value type.
                    unsafe { &*self.ptr.add(i).cast::<$atomic>() }
                }
            }
        )+
    };
}

devptr_atomic!(u32 => AtomicU32, u64 => AtomicU64, i32 => AtomicI32, i64 => AtomicI64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{enumerate_devices, Platform};
    use crate::mem::Buffer;

    fn host() -> crate::device::Device {
        enumerate_devices(Platform::Host).unwrap().remove(0)
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let mut buf = Buffer::<u32, 2>::alloc(&host(), Dim::new([4, 4])).unwrap();
        let data: Vec<u32> = (0..16).collect();
        buf.view_mut().write_from(&data).unwrap();
        let mut out = vec![0u32; 16];
        buf.view().read_into(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_pitched_view_not_contiguous() {
        let mut buf = Buffer::<u32, 2>::alloc_pitched(&host(), Dim::new([2, 3]), 16).unwrap();
        let view = buf.view_mut();
        assert!(!view.is_contiguous());
        assert_eq!(view.pitch_bytes(0), 16);
        assert_eq!(view.pitch_bytes(1), 4);
    }

    #[test]
    fn test_pitched_roundtrip_skips_padding() {
        let mut buf = Buffer::<u32, 2>::alloc_pitched(&host(), Dim::new([2, 3]), 16).unwrap();
        let data = [1u32, 2, 3, 4, 5, 6];
        buf.view_mut().write_from(&data).unwrap();
        let mut out = [0u32; 6];
        buf.view().read_into(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_sub_view_window() {
        let mut buf = Buffer::<u32, 2>::alloc(&host(), Dim::new([4, 4])).unwrap();
        let data: Vec<u32> = (0..16).collect();
        buf.view_mut().write_from(&data).unwrap();

        let sub = buf.sub_view(Dim::new([1, 1]), Dim::new([2, 2])).unwrap();
        let mut out = [0u32; 4];
        sub.read_into(&mut out).unwrap();
        assert_eq!(out, [5, 6, 9, 10]);
    }

    #[test]
    fn test_sub_view_mut_writes_interior_window() {
        let mut buf = Buffer::<u32, 2>::alloc(&host(), Dim::new([4, 4])).unwrap();
        buf.view_mut()
            .sub_view_mut(Dim::new([1, 1]), Dim::new([2, 2]))
            .unwrap()
            .write_from(&[91, 92, 93, 94])
            .unwrap();

        let mut out = vec![0u32; 16];
        buf.view().read_into(&mut out).unwrap();
        assert_eq!(out[5], 91);
        assert_eq!(out[6], 92);
        assert_eq!(out[9], 93);
        assert_eq!(out[10], 94);
        assert_eq!(out[0], 0);
        assert_eq!(out[15], 0);
    }

    #[test]
    fn test_sub_view_mut_out_of_bounds() {
        let mut buf = Buffer::<u8, 2>::alloc(&host(), Dim::new([4, 4])).unwrap();
        let err = buf
            .view_mut()
            .sub_view_mut(Dim::new([3, 0]), Dim::new([2, 4]))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_sub_view_out_of_bounds() {
        let buf = Buffer::<u8, 2>::alloc(&host(), Dim::new([4, 4])).unwrap();
        let err = buf.sub_view(Dim::new([3, 3]), Dim::new([2, 2])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_device_ptr_signed_atomics() {
        use std::sync::atomic::Ordering;

        let mut buf = Buffer::<i32, 1>::alloc(&host(), Dim::new([4])).unwrap();
        let ptr = buf.view_mut().device_ptr().unwrap();
        ptr.atomic(2).fetch_add(-5, Ordering::Relaxed);

        let mut out = [0i32; 4];
        buf.view().read_into(&mut out).unwrap();
        assert_eq!(out, [0, 0, -5, 0]);
    }

    #[test]
    fn test_read_into_length_checked() {
        let buf = Buffer::<u8, 1>::alloc(&host(), Dim::new([8])).unwrap();
        let mut short = [0u8; 4];
        assert!(buf.view().read_into(&mut short).is_err());
    }
}
