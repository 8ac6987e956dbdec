//! Fixed-rank extent, offset, and index vectors
//!
//! All grid/block/element arithmetic in this crate runs over [`Dim`], a
//! rank-`N` vector of `u32`. The rank is a const generic, so combining
//! vectors of different rank is a type error rather than a runtime check.

use std::fmt;
use std::ops::{Index, IndexMut};

/// An ordered vector of `N` unsigned extents, offsets, or indices.
///
/// Linearization is row-major with the **last declared dimension fastest**,
/// matching the block/lane index math used by the executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim<const N: usize>(pub [u32; N]);

/// Rank-1 vector
pub type Dim1 = Dim<1>;
/// Rank-2 vector
pub type Dim2 = Dim<2>;
/// Rank-3 vector
pub type Dim3 = Dim<3>;

impl<const N: usize> Dim<N> {
    /// Create a vector from its components
    pub const fn new(components: [u32; N]) -> Self {
        Dim(components)
    }

    /// Vector with every component equal to `value`
    pub const fn splat(value: u32) -> Self {
        Dim([value; N])
    }

    /// All-zero vector (the origin offset)
    pub const fn zeros() -> Self {
        Self::splat(0)
    }

    /// All-one vector
    pub const fn ones() -> Self {
        Self::splat(1)
    }

    /// Number of dimensions
    pub const fn rank(&self) -> usize {
        N
    }

    /// Product of all components, widened to avoid overflow
    pub fn prod(&self) -> u64 {
        self.0.iter().map(|&c| c as u64).product()
    }

    /// Element-wise minimum
    pub fn min(&self, other: &Self) -> Self {
        let mut out = self.0;
        for (o, b) in out.iter_mut().zip(other.0) {
            *o = (*o).min(b);
        }
        Dim(out)
    }

    /// True when `self[d] <= outer[d]` for every dimension
    pub fn fits_within(&self, outer: &Self) -> bool {
        self.0.iter().zip(outer.0).all(|(&a, b)| a <= b)
    }

    /// True when the window `offset + extent` lies inside `self`
    pub fn contains_window(&self, offset: &Self, extent: &Self) -> bool {
        offset
            .0
            .iter()
            .zip(extent.0)
            .zip(self.0)
            .all(|((&o, e), outer)| (o as u64) + (e as u64) <= outer as u64)
    }

    /// Map an `N`-dimensional index into this extent to its linear position
    pub fn linearize(&self, idx: Dim<N>) -> u64 {
        let mut lin = 0u64;
        for d in 0..N {
            debug_assert!(idx.0[d] < self.0[d].max(1));
            lin = lin * self.0[d] as u64 + idx.0[d] as u64;
        }
        lin
    }

    /// Inverse of [`linearize`](Self::linearize)
    pub fn from_linear(&self, mut lin: u64) -> Dim<N> {
        let mut out = [0u32; N];
        for d in (0..N).rev() {
            let extent = self.0[d] as u64;
            out[d] = (lin % extent.max(1)) as u32;
            lin /= extent.max(1);
        }
        Dim(out)
    }
}

impl<const N: usize> Default for Dim<N> {
    fn default() -> Self {
        Self::ones()
    }
}

impl<const N: usize> Index<usize> for Dim<N> {
    type Output = u32;

    fn index(&self, d: usize) -> &u32 {
        &self.0[d]
    }
}

impl<const N: usize> IndexMut<usize> for Dim<N> {
    fn index_mut(&mut self, d: usize) -> &mut u32 {
        &mut self.0[d]
    }
}

impl<const N: usize> fmt::Display for Dim<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (d, c) in self.0.iter().enumerate() {
            if d > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{c}")?;
        }
        write!(f, ")")
    }
}

impl From<u32> for Dim<1> {
    fn from(x: u32) -> Self {
        Dim([x])
    }
}

impl From<(u32, u32)> for Dim<2> {
    fn from((y, x): (u32, u32)) -> Self {
        Dim([y, x])
    }
}

impl From<(u32, u32, u32)> for Dim<3> {
    fn from((z, y, x): (u32, u32, u32)) -> Self {
        Dim([z, y, x])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prod() {
        assert_eq!(Dim::new([2, 3, 4]).prod(), 24);
        assert_eq!(Dim1::splat(10).prod(), 10);
        assert_eq!(Dim3::ones().prod(), 1);
    }

    #[test]
    fn test_linearize_last_dim_fastest() {
        let extent = Dim::new([2, 3]);
        // Row-major: (0,0) (0,1) (0,2) (1,0) (1,1) (1,2)
        assert_eq!(extent.linearize(Dim::new([0, 0])), 0);
        assert_eq!(extent.linearize(Dim::new([0, 2])), 2);
        assert_eq!(extent.linearize(Dim::new([1, 0])), 3);
        assert_eq!(extent.linearize(Dim::new([1, 2])), 5);
    }

    #[test]
    fn test_linear_roundtrip() {
        let extent = Dim::new([4, 4, 2]);
        for lin in 0..extent.prod() {
            let idx = extent.from_linear(lin);
            assert_eq!(extent.linearize(idx), lin);
        }
    }

    #[test]
    fn test_fits_within() {
        assert!(Dim::new([2, 2]).fits_within(&Dim::new([4, 4])));
        assert!(Dim::new([4, 4]).fits_within(&Dim::new([4, 4])));
        assert!(!Dim::new([5, 1]).fits_within(&Dim::new([4, 4])));
    }

    #[test]
    fn test_contains_window() {
        let outer = Dim::new([4, 4]);
        assert!(outer.contains_window(&Dim::new([1, 1]), &Dim::new([2, 2])));
        assert!(outer.contains_window(&Dim::new([0, 0]), &Dim::new([4, 4])));
        assert!(!outer.contains_window(&Dim::new([3, 3]), &Dim::new([2, 2])));
    }

    #[test]
    fn test_display() {
        assert_eq!(Dim::new([2, 3, 4]).to_string(), "(2, 3, 4)");
        assert_eq!(Dim1::from(7).to_string(), "(7)");
    }
}
