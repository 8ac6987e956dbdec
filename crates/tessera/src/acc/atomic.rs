//! Unified surface over the std integer atomics
//!
//! The [`Acc`](crate::Acc) atomic operations are generic over any cell
//! implementing [`AtomicCell`], so one set of capability methods covers
//! every fixed-width integer type without dynamic dispatch.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width integer atomic usable with the accelerator atomic ops.
///
/// Every operation returns the previous value, and is indivisible with
/// respect to all other atomic operations on the same cell.
pub trait AtomicCell: sealed::Sealed + Sync {
    type Value: Copy + PartialEq;

    fn fetch_add(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_sub(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_and(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_or(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_xor(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_min(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn fetch_max(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn swap(&self, v: Self::Value, order: Ordering) -> Self::Value;
    fn compare_exchange(
        &self,
        current: Self::Value,
        new: Self::Value,
        success: Ordering,
        failure: Ordering,
    ) -> std::result::Result<Self::Value, Self::Value>;
    fn load(&self, order: Ordering) -> Self::Value;
    fn store(&self, v: Self::Value, order: Ordering);
}

macro_rules! atomic_cell {
    ($(($atomic:ty, $value:ty)),+ $(,)?) => {
        $(
            impl sealed::Sealed for $atomic {}

            impl AtomicCell for $atomic {
                type Value = $value;

                fn fetch_add(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_add(self, v, order)
                }
                fn fetch_sub(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_sub(self, v, order)
                }
                fn fetch_and(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_and(self, v, order)
                }
                fn fetch_or(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_or(self, v, order)
                }
                fn fetch_xor(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_xor(self, v, order)
                }
                fn fetch_min(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_min(self, v, order)
                }
                fn fetch_max(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::fetch_max(self, v, order)
                }
                fn swap(&self, v: $value, order: Ordering) -> $value {
                    <$atomic>::swap(self, v, order)
                }
                fn compare_exchange(
                    &self,
                    current: $value,
                    new: $value,
                    success: Ordering,
                    failure: Ordering,
                ) -> std::result::Result<$value, $value> {
                    <$atomic>::compare_exchange(self, current, new, success, failure)
                }
                fn load(&self, order: Ordering) -> $value {
                    <$atomic>::load(self, order)
                }
                fn store(&self, v: $value, order: Ordering) {
                    <$atomic>::store(self, v, order)
                }
            }
        )+
    };
}

atomic_cell!(
    (AtomicU32, u32),
    (AtomicU64, u64),
    (AtomicI32, i32),
    (AtomicI64, i64),
    (AtomicUsize, usize),
);
