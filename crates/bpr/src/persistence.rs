//! Model persistence
//!
//! A model is written as three consecutive bincode records: the user-factor
//! matrix, the item-bias vector, then the item-factor matrix. Matrices carry
//! their shape so loading can reject files whose parts disagree.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{FactorModel, GaussianInit};
use latent_rank_core::{LatentRankError, Result};

/// Row-major matrix in a stable on-disk form
#[derive(Debug, Serialize, Deserialize)]
struct SerializableMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl SerializableMatrix {
    fn from_array(array: ndarray::ArrayView2<'_, f32>) -> Self {
        Self {
            rows: array.nrows(),
            cols: array.ncols(),
            data: array.iter().copied().collect(),
        }
    }

    fn into_array(self, what: &str) -> Result<Array2<f32>> {
        let expected = self.rows * self.cols;
        let actual = self.data.len();
        Array2::from_shape_vec((self.rows, self.cols), self.data)
            .map_err(|_| LatentRankError::dimension_mismatch(what, expected, actual))
    }
}

impl FactorModel {
    /// Write the model to `writer`
    pub fn save<W: Write>(&self, mut writer: W) -> Result<()> {
        write_record(&mut writer, &SerializableMatrix::from_array(self.user_matrix()))?;
        write_record(&mut writer, &self.bias_vector().to_vec())?;
        write_record(&mut writer, &SerializableMatrix::from_array(self.item_matrix()))?;
        writer.flush()?;

        debug!(
            users = self.num_users(),
            items = self.num_items(),
            factors = self.num_factors(),
            "saved factor model"
        );
        Ok(())
    }

    /// Read a model written by [`save`](Self::save)
    ///
    /// `init` is used for rows added after loading.
    pub fn load<R: Read>(mut reader: R, init: GaussianInit) -> Result<Self> {
        let users: SerializableMatrix = read_record(&mut reader)?;
        let bias: Vec<f32> = read_record(&mut reader)?;
        let items: SerializableMatrix = read_record(&mut reader)?;

        let model = FactorModel::from_parts(
            init,
            users.into_array("user factors")?,
            Array1::from_vec(bias),
            items.into_array("item factors")?,
        )?;

        debug!(
            users = model.num_users(),
            items = model.num_items(),
            factors = model.num_factors(),
            "loaded factor model"
        );
        Ok(model)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))
    }

    pub fn load_from_path(path: impl AsRef<Path>, init: GaussianInit) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file), init)
    }
}

fn write_record<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    bincode::serialize_into(writer, value).map_err(|e| LatentRankError::Serialization(e.to_string()))
}

fn read_record<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    bincode::deserialize_from(reader).map_err(|e| LatentRankError::Serialization(e.to_string()))
}
