//! Memset and copy tasks over pitched views
//!
//! Both builders validate extents eagerly and return inert task values;
//! the work happens when the task runs, either inline via
//! [`TaskRun::run`](crate::task::TaskRun) or on a queue worker. Tasks
//! capture raw base pointers plus the allocation `Arc`s, so the backing
//! memory cannot be freed while a task is pending.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::trace;

use crate::dim::Dim;
use crate::error::{AccelError, Result};
use crate::mem::view::{for_each_row, View, ViewMut};
use crate::mem::Storage;
use crate::task::TaskRun;

/// Pending fill of a pitched region with one byte value
pub struct SetTask<const N: usize> {
    base: *mut u8,
    pitches: [usize; N],
    extent: Dim<N>,
    row_bytes: usize,
    byte: u8,
    _keep: Arc<Storage>,
}

// Safety: the task owns its pointer range for the duration of run();
// the Arc keeps the allocation alive across queue hand-off.
unsafe impl<const N: usize> Send for SetTask<N> {}

impl<const N: usize> fmt::Debug for SetTask<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetTask")
            .field("extent", &self.extent)
            .field("byte", &self.byte)
            .finish_non_exhaustive()
    }
}

/// Build a task that sets every byte of the leading `extent` window of
/// `dst` to `byte`.
///
/// `extent` must fit inside the destination view. The byte pattern is
/// applied element-wise, so `0` zeroes any element type and `0xFF` is the
/// usual "poison" fill.
pub fn create_task_set<T: Pod, const N: usize>(
    dst: &mut ViewMut<T, N>,
    byte: u8,
    extent: Dim<N>,
) -> Result<SetTask<N>> {
    if !extent.fits_within(&dst.extent()) {
        return Err(AccelError::out_of_bounds(extent, dst.extent()));
    }
    let pitches = *dst.pitches();
    Ok(SetTask {
        base: dst.as_mut_ptr().cast::<u8>(),
        pitches,
        extent,
        row_bytes: extent[N - 1] as usize * std::mem::size_of::<T>(),
        byte,
        _keep: Arc::clone(dst.storage()),
    })
}

impl<const N: usize> TaskRun for SetTask<N> {
    fn run(self) -> Result<()> {
        trace!(extent = %self.extent, byte = self.byte, "memset");
        for_each_row(&self.extent, &self.pitches, |offset| {
            // Safety: the window was bounds-checked against the view at
            // build time and the Arc keeps the allocation alive.
            unsafe { std::ptr::write_bytes(self.base.add(offset), self.byte, self.row_bytes) };
        });
        Ok(())
    }
}

/// Pending pitched copy between two views of the same element type
pub struct CopyTask<T, const N: usize> {
    src_base: *const u8,
    dst_base: *mut u8,
    src_pitches: [usize; N],
    dst_pitches: [usize; N],
    extent: Dim<N>,
    row_bytes: usize,
    _keep_src: Arc<Storage>,
    _keep_dst: Arc<Storage>,
    _elem: PhantomData<T>,
}

unsafe impl<T, const N: usize> Send for CopyTask<T, N> {}

impl<T, const N: usize> fmt::Debug for CopyTask<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyTask").field("extent", &self.extent).finish_non_exhaustive()
    }
}

/// Closed byte span [start, end) covered by a copy window
fn window_span<const N: usize>(offset_bytes: usize, extent: &Dim<N>, pitches: &[usize; N], row_bytes: usize) -> (usize, usize) {
    let reach: usize = (0..N - 1).map(|d| (extent[d] as usize - 1) * pitches[d]).sum();
    (offset_bytes, offset_bytes + reach + row_bytes)
}

/// Build a task copying the leading `extent` window of `src` into the
/// leading window of `dst`, honoring each side's pitch independently.
///
/// The two windows must not overlap; overlapping windows of a shared
/// allocation are rejected here (conservatively, by byte span) rather
/// than producing an aliasing copy at execution time.
pub fn create_task_copy<T: Pod, const N: usize>(
    dst: &mut ViewMut<T, N>,
    src: &View<T, N>,
    extent: Dim<N>,
) -> Result<CopyTask<T, N>> {
    if !extent.fits_within(&src.extent()) {
        return Err(AccelError::out_of_bounds(extent, src.extent()));
    }
    if !extent.fits_within(&dst.extent()) {
        return Err(AccelError::out_of_bounds(extent, dst.extent()));
    }
    if Arc::ptr_eq(src.storage(), dst.storage()) && extent.prod() > 0 {
        let row_bytes = extent[N - 1] as usize * std::mem::size_of::<T>();
        let (src_start, src_end) = window_span(src.offset_bytes(), &extent, src.pitches(), row_bytes);
        let (dst_start, dst_end) = window_span(dst.offset_bytes(), &extent, dst.pitches(), row_bytes);
        if src_start < dst_end && dst_start < src_end {
            return Err(AccelError::CopyOverlap);
        }
    }
    let src_pitches = *src.pitches();
    let dst_pitches = *dst.pitches();
    Ok(CopyTask {
        src_base: src.as_ptr().cast(),
        dst_base: dst.as_mut_ptr().cast(),
        src_pitches,
        dst_pitches,
        extent,
        row_bytes: extent[N - 1] as usize * std::mem::size_of::<T>(),
        _keep_src: Arc::clone(src.storage()),
        _keep_dst: Arc::clone(dst.storage()),
        _elem: PhantomData,
    })
}

impl<T, const N: usize> TaskRun for CopyTask<T, N> {
    fn run(self) -> Result<()> {
        trace!(extent = %self.extent, "copy");
        // Walk both sides' rows in lockstep; the row interiors are
        // contiguous because the innermost pitch equals the element size.
        let rows: u64 = self.extent.0[..N - 1].iter().map(|&e| e as u64).product();
        for row in 0..rows {
            let mut rem = row;
            let mut src_off = 0usize;
            let mut dst_off = 0usize;
            for d in (0..N - 1).rev() {
                let e = (self.extent[d] as u64).max(1);
                let i = (rem % e) as usize;
                src_off += i * self.src_pitches[d];
                dst_off += i * self.dst_pitches[d];
                rem /= e;
            }
            // Safety: both windows were bounds-checked and proven
            // non-overlapping at build time, and the Arcs keep the
            // allocations alive.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.src_base.add(src_off),
                    self.dst_base.add(dst_off),
                    self.row_bytes,
                );
            }
        }
        Ok(())
    }
}
