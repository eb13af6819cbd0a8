use std::num::NonZeroUsize;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::Dataset;
use crate::error::{Error, Result};

/// A group of samples processed together in one step.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: Array2<f32>,
    pub labels: Array1<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Splits a dataset into batches. Every call to [`Batcher::iter`] starts a new pass.
#[derive(Debug)]
pub struct Batcher {
    batch_size: NonZeroUsize,
    // Present only for shuffled batching
    rng: Option<StdRng>,
}

impl Batcher {
    /// In-order batching, used for evaluation
    pub fn new(batch_size: usize) -> Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size).ok_or(Error::InvalidBatchSize)?;
        Ok(Self {
            batch_size,
            rng: None,
        })
    }

    /// Batching that reshuffles the samples on every pass.
    /// Without a seed the generator is seeded from the OS.
    pub fn shuffled(batch_size: usize, seed: Option<u64>) -> Result<Self> {
        let mut batcher = Self::new(batch_size)?;
        batcher.rng = Some(match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        Ok(batcher)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    pub fn is_shuffled(&self) -> bool {
        self.rng.is_some()
    }

    /// Start a pass over `dataset`
    pub fn iter<'a>(&mut self, dataset: &'a Dataset) -> Batches<'a> {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }

        Batches {
            dataset,
            order,
            batch_size: self.batch_size.get(),
            cursor: 0,
        }
    }
}

/// A lazy pass over a dataset. Batches are gathered only when requested.
pub struct Batches<'a> {
    dataset: &'a Dataset,
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.dataset.select(&self.order[self.cursor..end]);
        self.cursor = end;

        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.order.len() - self.cursor;
        let n = remaining.div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn dataset(n: usize) -> Dataset {
        Dataset {
            data: Array::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32),
            target: Array::from_shape_fn(n, |i| i % 10),
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(Batcher::new(0), Err(Error::InvalidBatchSize)));
        assert!(matches!(
            Batcher::shuffled(0, Some(1)),
            Err(Error::InvalidBatchSize)
        ));
    }

    #[test]
    fn last_batch_may_be_smaller() {
        let data = dataset(10);
        let mut batcher = Batcher::new(4).unwrap();
        let sizes: Vec<usize> = batcher.iter(&data).map(|b| b.len()).collect();

        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(batcher.iter(&data).len(), 3);
    }

    #[test]
    fn in_order_batches_keep_samples_whole() {
        let data = dataset(5);
        let mut batcher = Batcher::new(2).unwrap();
        let batches: Vec<Batch> = batcher.iter(&data).collect();

        assert_eq!(batches[1].labels.to_vec(), vec![2, 3]);
        assert_eq!(batches[1].images.row(0).to_vec(), vec![4.0, 5.0]);
        assert_eq!(batches[1].images.row(1).to_vec(), vec![6.0, 7.0]);
    }

    #[test]
    fn passes_are_restartable_and_deterministic_without_shuffle() {
        let data = dataset(7);
        let mut batcher = Batcher::new(3).unwrap();
        let first: Vec<Vec<usize>> = batcher.iter(&data).map(|b| b.labels.to_vec()).collect();
        let second: Vec<Vec<usize>> = batcher.iter(&data).map(|b| b.labels.to_vec()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn shuffled_passes_cover_every_sample_once() {
        let data = dataset(23);
        let mut batcher = Batcher::shuffled(5, Some(7)).unwrap();

        for _ in 0..3 {
            let mut rows: Vec<usize> = batcher
                .iter(&data)
                .flat_map(|b| {
                    b.images
                        .outer_iter()
                        .map(|row| (row[0] / 2.0) as usize)
                        .collect::<Vec<_>>()
                })
                .collect();
            rows.sort_unstable();
            assert_eq!(rows, (0..23).collect::<Vec<_>>());
        }
    }

    #[test]
    fn shuffling_is_reproducible_with_a_seed_and_changes_between_passes() {
        let data = dataset(50);
        let order = |batcher: &mut Batcher| -> Vec<usize> {
            batcher
                .iter(&data)
                .flat_map(|b| b.images.column(0).to_vec())
                .map(|x| x as usize)
                .collect()
        };

        let mut a = Batcher::shuffled(8, Some(42)).unwrap();
        let mut b = Batcher::shuffled(8, Some(42)).unwrap();
        let a1 = order(&mut a);
        let b1 = order(&mut b);
        let a2 = order(&mut a);

        assert_eq!(a1, b1);
        assert_ne!(a1, a2);
    }
}
