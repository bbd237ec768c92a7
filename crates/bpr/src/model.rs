//! Latent factor model
//!
//! Dense user and item factor matrices (`rows x num_factors`) plus a scalar bias
//! per item. Rows are append-only: growing the model for a new id appends
//! Gaussian-initialised rows (amortised `O(1)` through ndarray's geometric
//! growth), and removing an entity zeroes its row so that all other ids keep
//! their index.

use crate::hogwild::{SharedFactors, UnsynchronizedSharedMatrix};
use crate::{ItemId, UserId};
use latent_rank_core::config::env_key;
use latent_rank_core::math::{cosine_similarity, dot_product, squared_norm};
use latent_rank_core::{LatentRankError, Result};
use ndarray::{aview0, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Element access used by the gradient update
///
/// Implemented by the owning [`FactorModel`] for sequential training and by
/// [`SharedFactors`] for lock-free parallel training, so the update rule exists once.
pub trait FactorParameters {
    fn num_factors(&self) -> usize;
    fn user_weight(&self, user: UserId, factor: usize) -> f32;
    fn set_user_weight(&mut self, user: UserId, factor: usize, value: f32);
    fn item_weight(&self, item: ItemId, factor: usize) -> f32;
    fn set_item_weight(&mut self, item: ItemId, factor: usize, value: f32);
    fn bias(&self, item: ItemId) -> f32;
    fn set_bias(&mut self, item: ItemId, value: f32);
}

/// Gaussian used for row initialisation
#[derive(Debug, Clone, Copy)]
pub struct GaussianInit {
    mean: f32,
    stddev: f32,
    normal: Normal<f32>,
}

impl GaussianInit {
    pub fn new(mean: f32, stddev: f32) -> Result<Self> {
        let normal = Normal::new(mean, stddev).map_err(|e| {
            LatentRankError::config(
                format!("Invalid initialisation N({}, {}): {}", mean, stddev, e),
                &env_key("INIT_STDDEV"),
            )
        })?;
        Ok(Self {
            mean,
            stddev,
            normal,
        })
    }

    pub fn mean(&self) -> f32 {
        self.mean
    }

    pub fn stddev(&self) -> f32 {
        self.stddev
    }

    fn row<R: Rng + ?Sized>(&self, num_factors: usize, rng: &mut R) -> Array1<f32> {
        Array1::from_shape_fn(num_factors, |_| self.normal.sample(rng))
    }

    fn matrix<R: Rng + ?Sized>(&self, rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |_| self.normal.sample(rng))
    }
}

/// User factors, item factors and item biases
#[derive(Debug, Clone)]
pub struct FactorModel {
    num_factors: usize,
    init: GaussianInit,
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    item_bias: Array1<f32>,
}

impl FactorModel {
    /// Empty model (no rows) with the given width and initialisation
    pub fn new(num_factors: usize, init: GaussianInit) -> Self {
        Self {
            num_factors,
            init,
            user_factors: Array2::zeros((0, num_factors)),
            item_factors: Array2::zeros((0, num_factors)),
            item_bias: Array1::zeros(0),
        }
    }

    /// Model with `num_users` / `num_items` freshly initialised rows and zero biases
    pub fn initialized<R: Rng + ?Sized>(
        num_factors: usize,
        init: GaussianInit,
        num_users: usize,
        num_items: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            num_factors,
            init,
            user_factors: init.matrix(num_users, num_factors, rng),
            item_factors: init.matrix(num_items, num_factors, rng),
            item_bias: Array1::zeros(num_items),
        }
    }

    /// Rebuild from raw parts, checking every shape invariant
    pub fn from_parts(
        init: GaussianInit,
        user_factors: Array2<f32>,
        item_bias: Array1<f32>,
        item_factors: Array2<f32>,
    ) -> Result<Self> {
        let num_factors = user_factors.ncols();

        if item_factors.ncols() != num_factors {
            return Err(LatentRankError::dimension_mismatch(
                "item factor width",
                num_factors,
                item_factors.ncols(),
            ));
        }

        if item_bias.len() != item_factors.nrows() {
            return Err(LatentRankError::dimension_mismatch(
                "item bias length",
                item_factors.nrows(),
                item_bias.len(),
            ));
        }

        Ok(Self {
            num_factors,
            init,
            user_factors,
            item_factors,
            item_bias,
        })
    }

    pub fn num_factors(&self) -> usize {
        self.num_factors
    }

    pub fn init(&self) -> GaussianInit {
        self.init
    }

    /// Number of user rows
    pub fn num_users(&self) -> usize {
        self.user_factors.nrows()
    }

    /// Number of item rows
    pub fn num_items(&self) -> usize {
        self.item_factors.nrows()
    }

    /// `bias[item] + <user_factors[user], item_factors[item]>`
    ///
    /// `None` means "cannot predict": one of the ids is outside the model.
    pub fn predict(&self, user: UserId, item: ItemId) -> Option<f32> {
        if user >= self.num_users() || item >= self.num_items() {
            return None;
        }

        Some(self.score(user, item))
    }

    /// Unchecked score for ids known to be in bounds
    #[inline]
    pub(crate) fn score(&self, user: UserId, item: ItemId) -> f32 {
        let user_row = self.user_factors.row(user);
        let item_row = self.item_factors.row(item);
        let affinity = match (user_row.as_slice(), item_row.as_slice()) {
            (Some(u), Some(i)) => dot_product(u, i),
            _ => user_row.dot(&item_row),
        };
        self.item_bias[item] + affinity
    }

    /// Cosine similarity of two items' latent factors
    pub fn item_similarity(&self, a: ItemId, b: ItemId) -> Option<f32> {
        let a = self.item_factors(a)?;
        let b = self.item_factors(b)?;
        match (a.as_slice(), b.as_slice()) {
            (Some(a), Some(b)) => Some(cosine_similarity(a, b)),
            _ => None,
        }
    }

    /// Grow the user matrix so that `user` is a valid row
    ///
    /// Returns `true` if rows were appended.
    pub fn add_user<R: Rng + ?Sized>(&mut self, user: UserId, rng: &mut R) -> Result<bool> {
        let mut grew = false;
        while self.user_factors.nrows() <= user {
            let row = self.init.row(self.num_factors, rng);
            let columns = self.user_factors.ncols();
            self.user_factors
                .push_row(row.view())
                .map_err(|e| growth_error("user factor row", columns, row.len(), e))?;
            grew = true;
        }

        if grew {
            debug!(user, rows = self.user_factors.nrows(), "grew user factors");
        }
        Ok(grew)
    }

    /// Grow the item matrix and bias vector so that `item` is a valid row
    pub fn add_item<R: Rng + ?Sized>(&mut self, item: ItemId, rng: &mut R) -> Result<bool> {
        let mut grew = false;
        while self.item_factors.nrows() <= item {
            let row = self.init.row(self.num_factors, rng);
            let columns = self.item_factors.ncols();
            self.item_factors
                .push_row(row.view())
                .map_err(|e| growth_error("item factor row", columns, row.len(), e))?;
            let rows = self.item_factors.nrows();
            self.item_bias
                .push(Axis(0), aview0(&0.0))
                .map_err(|e| growth_error("item bias", rows, self.item_bias.len(), e))?;
            grew = true;
        }

        if grew {
            debug!(item, rows = self.item_factors.nrows(), "grew item factors");
        }
        Ok(grew)
    }

    /// Zero a user's row; the id stays a valid index
    pub fn remove_user(&mut self, user: UserId) {
        if user < self.num_users() {
            self.user_factors.row_mut(user).fill(0.0);
        }
    }

    /// Zero an item's row and bias; the id stays a valid index
    pub fn remove_item(&mut self, item: ItemId) {
        if item < self.num_items() {
            self.item_factors.row_mut(item).fill(0.0);
            self.item_bias[item] = 0.0;
        }
    }

    /// Draw a fresh Gaussian row for `user`
    pub fn reinit_user<R: Rng + ?Sized>(&mut self, user: UserId, rng: &mut R) {
        if user < self.num_users() {
            let row = self.init.row(self.num_factors, rng);
            self.user_factors.row_mut(user).assign(&row);
        }
    }

    /// Draw a fresh Gaussian row for `item`; the bias is kept
    pub fn reinit_item<R: Rng + ?Sized>(&mut self, item: ItemId, rng: &mut R) {
        if item < self.num_items() {
            let row = self.init.row(self.num_factors, rng);
            self.item_factors.row_mut(item).assign(&row);
        }
    }

    pub fn user_factors(&self, user: UserId) -> Option<ArrayView1<'_, f32>> {
        (user < self.num_users()).then(|| self.user_factors.row(user))
    }

    pub fn item_factors(&self, item: ItemId) -> Option<ArrayView1<'_, f32>> {
        (item < self.num_items()).then(|| self.item_factors.row(item))
    }

    pub fn item_bias(&self, item: ItemId) -> Option<f32> {
        self.item_bias.get(item).copied()
    }

    pub fn user_matrix(&self) -> ArrayView2<'_, f32> {
        self.user_factors.view()
    }

    pub fn item_matrix(&self) -> ArrayView2<'_, f32> {
        self.item_factors.view()
    }

    pub fn bias_vector(&self) -> ArrayView1<'_, f32> {
        self.item_bias.view()
    }

    /// Squared L2 norm of a user row; 0 for unknown users
    pub fn user_squared_norm(&self, user: UserId) -> f32 {
        self.user_factors(user)
            .map(|row| row_squared_norm(&row))
            .unwrap_or(0.0)
    }

    /// Squared L2 norm of an item row; 0 for unknown items
    pub fn item_squared_norm(&self, item: ItemId) -> f32 {
        self.item_factors(item)
            .map(|row| row_squared_norm(&row))
            .unwrap_or(0.0)
    }

    /// Lock-free view over all parameters for Hogwild-style workers
    ///
    /// The exclusive borrow guarantees nothing else touches the model while the
    /// view is alive.
    pub fn shared(&mut self) -> Result<SharedFactors<'_>> {
        let num_factors = self.num_factors;

        let users = self
            .user_factors
            .as_slice_mut()
            .ok_or_else(|| not_contiguous("user factors"))?;
        let items = self
            .item_factors
            .as_slice_mut()
            .ok_or_else(|| not_contiguous("item factors"))?;
        let bias = self
            .item_bias
            .as_slice_mut()
            .ok_or_else(|| not_contiguous("item bias"))?;

        Ok(SharedFactors::new(
            UnsynchronizedSharedMatrix::from_mut_slice(users, num_factors),
            UnsynchronizedSharedMatrix::from_mut_slice(items, num_factors),
            UnsynchronizedSharedMatrix::from_mut_slice(bias, 1),
        ))
    }
}

impl FactorParameters for FactorModel {
    #[inline]
    fn num_factors(&self) -> usize {
        self.num_factors
    }

    #[inline]
    fn user_weight(&self, user: UserId, factor: usize) -> f32 {
        self.user_factors[[user, factor]]
    }

    #[inline]
    fn set_user_weight(&mut self, user: UserId, factor: usize, value: f32) {
        self.user_factors[[user, factor]] = value;
    }

    #[inline]
    fn item_weight(&self, item: ItemId, factor: usize) -> f32 {
        self.item_factors[[item, factor]]
    }

    #[inline]
    fn set_item_weight(&mut self, item: ItemId, factor: usize, value: f32) {
        self.item_factors[[item, factor]] = value;
    }

    #[inline]
    fn bias(&self, item: ItemId) -> f32 {
        self.item_bias[item]
    }

    #[inline]
    fn set_bias(&mut self, item: ItemId, value: f32) {
        self.item_bias[item] = value;
    }
}

fn row_squared_norm(row: &ArrayView1<'_, f32>) -> f32 {
    match row.as_slice() {
        Some(slice) => squared_norm(slice),
        None => row.dot(row),
    }
}

/// Appending a row of the wrong width means the model's shape invariant is broken
fn growth_error(what: &str, expected: usize, actual: usize, err: ndarray::ShapeError) -> LatentRankError {
    LatentRankError::dimension_mismatch(format!("grown {} ({})", what, err), expected, actual)
}

fn not_contiguous(what: &str) -> LatentRankError {
    LatentRankError::invalid_state(format!("share {}", what), "holding a non-contiguous matrix")
}
