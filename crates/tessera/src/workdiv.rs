//! Work division: the grid-of-blocks-of-threads-of-elements hierarchy
//!
//! A [`WorkDiv`] describes the logical execution hierarchy of one kernel
//! launch. It is pure data; validation against a concrete accelerator's
//! limits happens at task-creation time, before anything is enqueued.

use std::fmt;

use crate::device::AccProps;
use crate::dim::Dim;
use crate::error::{AccelError, Result};

/// Logical execution hierarchy for one kernel launch.
///
/// * `grid_blocks` — grid extent in blocks
/// * `block_threads` — block extent in threads
/// * `thread_elems` — elements-per-thread extent, exposed to the kernel
///   body as a range to iterate itself (never unrolled by the dispatcher)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkDiv<const N: usize> {
    pub grid_blocks: Dim<N>,
    pub block_threads: Dim<N>,
    pub thread_elems: Dim<N>,
}

impl<const N: usize> WorkDiv<N> {
    /// Create a work division from its three extents
    pub const fn new(grid_blocks: Dim<N>, block_threads: Dim<N>, thread_elems: Dim<N>) -> Self {
        Self {
            grid_blocks,
            block_threads,
            thread_elems,
        }
    }

    /// Total number of blocks in the grid
    pub fn block_count(&self) -> u64 {
        self.grid_blocks.prod()
    }

    /// Number of threads per block
    pub fn threads_per_block(&self) -> u64 {
        self.block_threads.prod()
    }

    /// Total number of logical threads across the grid
    pub fn total_threads(&self) -> u64 {
        self.block_count() * self.threads_per_block()
    }

    /// Number of elements each thread is asked to process
    pub fn elems_per_thread(&self) -> u64 {
        self.thread_elems.prod()
    }

    /// Validate this work division against an accelerator's limits.
    ///
    /// Returns a configuration error when any block-thread dimension
    /// exceeds the per-dimension maximum, the flat thread count exceeds
    /// the per-block maximum, the grid extent exceeds the grid maximum,
    /// or any extent is zero.
    pub fn validate(&self, props: &AccProps<N>) -> Result<()> {
        if self.block_count() == 0 || self.threads_per_block() == 0 || self.elems_per_thread() == 0 {
            return Err(AccelError::invalid_workdiv(format!(
                "zero-sized extent (grid={}, block={}, elems={})",
                self.grid_blocks, self.block_threads, self.thread_elems
            )));
        }
        if !self.block_threads.fits_within(&props.max_block_thread_extent) {
            return Err(AccelError::invalid_workdiv(format!(
                "block extent {} exceeds per-dimension maximum {}",
                self.block_threads, props.max_block_thread_extent
            )));
        }
        if self.threads_per_block() > props.max_block_threads as u64 {
            return Err(AccelError::invalid_workdiv(format!(
                "block extent {} = {} threads exceeds per-block maximum {}",
                self.block_threads,
                self.threads_per_block(),
                props.max_block_threads
            )));
        }
        if !self.grid_blocks.fits_within(&props.max_grid_extent) {
            return Err(AccelError::invalid_workdiv(format!(
                "grid extent {} exceeds maximum {}",
                self.grid_blocks, props.max_grid_extent
            )));
        }
        Ok(())
    }
}

impl WorkDiv<1> {
    /// Simple 1D work division covering `total` elements with one element
    /// per thread and `block_size` threads per block
    pub const fn linear(total: u32, block_size: u32) -> Self {
        let num_blocks = total.div_ceil(block_size);
        Self {
            grid_blocks: Dim([num_blocks]),
            block_threads: Dim([block_size]),
            thread_elems: Dim([1]),
        }
    }
}

impl<const N: usize> fmt::Display for WorkDiv<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={}, block={}, elems={}",
            self.grid_blocks, self.block_threads, self.thread_elems
        )
    }
}

/// Derive a valid work division for `elem_extent` on an accelerator.
///
/// Clamps the block extent to the accelerator's limits, assigns
/// `thread_elems` per thread, and divides the remaining extent into a
/// grid of blocks. The resulting division covers at least `elem_extent`
/// elements in every dimension.
pub fn workdiv_for<const N: usize>(props: &AccProps<N>, elem_extent: Dim<N>, thread_elems: Dim<N>) -> WorkDiv<N> {
    let mut block = props.max_block_thread_extent.min(&elem_extent);
    // Respect the flat per-block limit by shrinking the fastest dimension
    // first (the last-declared one).
    let mut d = N;
    while block.prod() > props.max_block_threads as u64 && d > 0 {
        d -= 1;
        while block[d] > 1 && block.prod() > props.max_block_threads as u64 {
            block[d] = block[d].div_ceil(2);
        }
    }
    let mut grid = Dim::<N>::ones();
    for d in 0..N {
        let per_block = block[d] as u64 * thread_elems[d].max(1) as u64;
        grid[d] = ((elem_extent[d] as u64).div_ceil(per_block.max(1))).max(1) as u32;
    }
    WorkDiv::new(grid, block, thread_elems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props_1024() -> AccProps<3> {
        AccProps {
            max_block_threads: 1024,
            max_block_thread_extent: Dim::splat(1024),
            max_grid_extent: Dim::splat(u32::MAX),
            shared_mem_bytes: 48 * 1024,
        }
    }

    #[test]
    fn test_linear_workdiv() {
        let wd = WorkDiv::linear(1000, 256);
        assert_eq!(wd.grid_blocks[0], 4); // ceil(1000 / 256)
        assert_eq!(wd.block_threads[0], 256);
        assert_eq!(wd.total_threads(), 1024);
        assert_eq!(wd.elems_per_thread(), 1);
    }

    #[test]
    fn test_validate_within_limits() {
        let wd = WorkDiv::new(Dim::new([2, 2, 1]), Dim::new([8, 8, 2]), Dim::ones());
        assert!(wd.validate(&props_1024()).is_ok());
    }

    #[test]
    fn test_validate_flat_limit_exceeded() {
        // 32 * 32 * 2 = 2048 threads > 1024 maximum
        let wd = WorkDiv::new(Dim::ones(), Dim::new([32, 32, 2]), Dim::ones());
        let err = wd.validate(&props_1024()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("2048"));
    }

    #[test]
    fn test_validate_zero_extent() {
        let wd = WorkDiv::new(Dim::new([0, 1, 1]), Dim::ones(), Dim::ones());
        assert!(wd.validate(&props_1024()).is_err());
    }

    #[test]
    fn test_workdiv_for_covers_extent() {
        let props = props_1024();
        let wd = workdiv_for(&props, Dim::new([1, 1, 5000]), Dim::ones());
        assert!(wd.validate(&props).is_ok());
        let covered = wd.grid_blocks[2] as u64 * wd.block_threads[2] as u64;
        assert!(covered >= 5000);
    }

    #[test]
    fn test_workdiv_for_serial_props() {
        // Serial accelerators report one thread per block; width must come
        // from the grid.
        let props = AccProps::<1> {
            max_block_threads: 1,
            max_block_thread_extent: Dim::ones(),
            max_grid_extent: Dim::splat(u32::MAX),
            shared_mem_bytes: 48 * 1024,
        };
        let wd = workdiv_for(&props, Dim::new([64]), Dim::ones());
        assert_eq!(wd.block_threads[0], 1);
        assert_eq!(wd.grid_blocks[0], 64);
    }
}
