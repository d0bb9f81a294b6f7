//! Dense feature tables and the dataset adapters feeding the trainers.

pub mod mnist;
pub mod sequence;

use std::ops::Range;

use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{Error, Result};

/// Row-major `num_rows × num_cols` matrix of features.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    num_rows: usize,
    num_cols: usize,
    values: Vec<f32>,
}

impl FeatureTable {
    pub fn new(values: Vec<f32>, num_cols: usize) -> Result<Self> {
        if num_cols == 0 || values.len() % num_cols != 0 {
            return Err(Error::ShapeMismatch {
                expected: format!("a multiple of {num_cols} values"),
                actual: format!("{} values", values.len()),
            });
        }
        Ok(Self {
            num_rows: values.len() / num_cols,
            num_cols,
            values,
        })
    }

    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let num_cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|row| row.len() != num_cols) {
            return Err(Error::ShapeMismatch {
                expected: format!("rows of {num_cols} values"),
                actual: format!("a row of {} values", bad.len()),
            });
        }
        Self::new(rows.concat(), num_cols)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.values[index * self.num_cols..(index + 1) * self.num_cols]
    }

    pub fn gather(&self, indices: &[usize]) -> FeatureTable {
        let mut values = Vec::with_capacity(indices.len() * self.num_cols);
        for &index in indices {
            values.extend_from_slice(self.row(index));
        }
        FeatureTable {
            num_rows: indices.len(),
            num_cols: self.num_cols,
            values,
        }
    }

    pub fn slice_rows(&self, rows: Range<usize>) -> FeatureTable {
        let rows = rows.start.min(self.num_rows)..rows.end.min(self.num_rows);
        FeatureTable {
            num_rows: rows.len(),
            num_cols: self.num_cols,
            values: self.values[rows.start * self.num_cols..rows.end * self.num_cols].to_vec(),
        }
    }

    /// First entry that is neither exactly `0.0` nor exactly `1.0`.
    pub fn find_non_binary(&self) -> Option<(usize, usize, f32)> {
        self.values
            .iter()
            .position(|&v| v != 0.0 && v != 1.0)
            .map(|i| (i / self.num_cols, i % self.num_cols, self.values[i]))
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data(
            TensorData::new(self.values.clone(), [self.num_rows, self.num_cols]),
            device,
        )
    }

    pub fn batch_tensor<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Tensor<B, 2> {
        self.gather(indices).to_tensor(device)
    }
}

impl Dataset<Vec<f32>> for FeatureTable {
    fn get(&self, index: usize) -> Option<Vec<f32>> {
        (index < self.num_rows).then(|| self.row(index).to_vec())
    }

    fn len(&self) -> usize {
        self.num_rows
    }
}

/// Features with a `±1` class label per row.
#[derive(Clone, Debug, PartialEq)]
pub struct LabeledTable {
    pub features: FeatureTable,
    pub labels: Vec<f32>,
}

impl LabeledTable {
    pub fn new(features: FeatureTable, labels: Vec<f32>) -> Result<Self> {
        if features.num_rows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} labels", features.num_rows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn count_label(&self, label: f32) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    pub fn batch<B: Backend>(
        &self,
        indices: &[usize],
        device: &B::Device,
    ) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let labels: Vec<f32> = indices.iter().map(|&i| self.labels[i]).collect();
        (
            self.features.batch_tensor(indices, device),
            Tensor::from_data(TensorData::new(labels, [indices.len()]), device),
        )
    }
}

/// Train / validation / test triple.
#[derive(Clone, Debug)]
pub struct Splits<T> {
    pub train: T,
    pub validation: T,
    pub test: T,
}
