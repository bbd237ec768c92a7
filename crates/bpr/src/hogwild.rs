//! Lock-free shared parameters for Hogwild-style parallel SGD
//!
//! Workers read and write factor rows without locks. Each element is viewed as
//! an `AtomicU32` holding the bits of an `f32` and accessed with `Relaxed`
//! ordering, so concurrent access is free of undefined behaviour while a
//! read-modify-write from one worker may still overwrite a concurrent write to
//! the same element from another. That lost update is the accepted
//! approximation of Hogwild training; it only matters when two workers touch
//! the same row at once, which is rare for sparse interaction data.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::model::FactorParameters;
use crate::{ItemId, UserId};

const _: () = assert!(std::mem::size_of::<f32>() == std::mem::size_of::<AtomicU32>());
const _: () = assert!(std::mem::align_of::<f32>() == std::mem::align_of::<AtomicU32>());

/// Row-major `f32` matrix that can be read and written from many threads
#[derive(Clone, Copy)]
pub struct UnsynchronizedSharedMatrix<'a> {
    cells: &'a [AtomicU32],
    cols: usize,
}

impl<'a> UnsynchronizedSharedMatrix<'a> {
    /// Reinterpret an exclusively borrowed buffer as shared cells
    ///
    /// The exclusive borrow is held for `'a`, so no plain `f32` access to the
    /// buffer can overlap with atomic access through the view.
    pub fn from_mut_slice(values: &'a mut [f32], cols: usize) -> Self {
        let len = values.len();
        // SAFETY: f32 and AtomicU32 have identical size and alignment (checked at
        // compile time above), every bit pattern is a valid u32, and the unique
        // borrow of `values` is transferred to the returned view for 'a.
        let cells = unsafe { std::slice::from_raw_parts(values.as_mut_ptr() as *const AtomicU32, len) };
        Self { cells, cols }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        f32::from_bits(self.cells[row * self.cols + col].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, row: usize, col: usize, value: f32) {
        self.cells[row * self.cols + col].store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn rows(&self) -> usize {
        if self.cols == 0 {
            0
        } else {
            self.cells.len() / self.cols
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

impl std::fmt::Debug for UnsynchronizedSharedMatrix<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsynchronizedSharedMatrix")
            .field("rows", &self.rows())
            .field("cols", &self.cols)
            .finish()
    }
}

/// All model parameters as shared matrices
///
/// `Copy`, so every worker gets its own handle onto the same storage.
#[derive(Debug, Clone, Copy)]
pub struct SharedFactors<'a> {
    users: UnsynchronizedSharedMatrix<'a>,
    items: UnsynchronizedSharedMatrix<'a>,
    bias: UnsynchronizedSharedMatrix<'a>,
}

impl<'a> SharedFactors<'a> {
    pub fn new(
        users: UnsynchronizedSharedMatrix<'a>,
        items: UnsynchronizedSharedMatrix<'a>,
        bias: UnsynchronizedSharedMatrix<'a>,
    ) -> Self {
        Self { users, items, bias }
    }

    pub fn num_users(&self) -> usize {
        self.users.rows()
    }

    pub fn num_items(&self) -> usize {
        self.items.rows()
    }
}

impl FactorParameters for SharedFactors<'_> {
    #[inline]
    fn num_factors(&self) -> usize {
        self.users.cols()
    }

    #[inline]
    fn user_weight(&self, user: UserId, factor: usize) -> f32 {
        self.users.get(user, factor)
    }

    #[inline]
    fn set_user_weight(&mut self, user: UserId, factor: usize, value: f32) {
        self.users.set(user, factor, value);
    }

    #[inline]
    fn item_weight(&self, item: ItemId, factor: usize) -> f32 {
        self.items.get(item, factor)
    }

    #[inline]
    fn set_item_weight(&mut self, item: ItemId, factor: usize, value: f32) {
        self.items.set(item, factor, value);
    }

    #[inline]
    fn bias(&self, item: ItemId) -> f32 {
        self.bias.get(item, 0)
    }

    #[inline]
    fn set_bias(&mut self, item: ItemId, value: f32) {
        self.bias.set(item, 0, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_matrix_round_trips_values() {
        let mut buffer = vec![0.0f32; 6];
        {
            let matrix = UnsynchronizedSharedMatrix::from_mut_slice(&mut buffer, 3);
            assert_eq!(matrix.rows(), 2);
            matrix.set(1, 2, -3.25);
            matrix.set(0, 0, 1.5);
            assert_eq!(matrix.get(1, 2), -3.25);
        }
        assert_eq!(buffer, vec![1.5, 0.0, 0.0, 0.0, 0.0, -3.25]);
    }

    #[test]
    fn test_shared_matrix_concurrent_disjoint_writes() {
        let mut buffer = vec![0.0f32; 8 * 4];
        {
            let matrix = UnsynchronizedSharedMatrix::from_mut_slice(&mut buffer, 4);
            std::thread::scope(|scope| {
                for row in 0..8 {
                    scope.spawn(move || {
                        for col in 0..4 {
                            matrix.set(row, col, (row * 10 + col) as f32);
                        }
                    });
                }
            });
        }

        for row in 0..8 {
            for col in 0..4 {
                assert_eq!(buffer[row * 4 + col], (row * 10 + col) as f32);
            }
        }
    }
}
