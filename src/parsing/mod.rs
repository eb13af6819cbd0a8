use ndarray::{Array1, Array2, Axis};

pub mod batcher;
pub mod mnist;

pub use batcher::{Batch, Batcher, Batches};

/// An in-memory dataset partition. Row `i` of `data` is the flattened image whose class is `target[i]`.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub data: Array2<f32>,
    pub target: Array1<usize>,
}

impl Dataset {
    /// Number of samples in the partition
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Number of features per sample
    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }

    /// Gather the samples at `indices` into an owned batch, keeping the given order
    pub fn select(&self, indices: &[usize]) -> Batch {
        Batch {
            images: self.data.select(Axis(0), indices),
            labels: self.target.select(Axis(0), indices),
        }
    }
}
