use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::layers::softmax;
use crate::error::{Error, Result};

/// A scalar loss over a batch, together with its gradient w.r.t. the model output
pub trait LossFn {
    fn loss(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32>;

    fn gradient(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<Array2<f32>>;
}

/// Mean squared error between the output (class probabilities) and one-hot targets,
/// averaged over every element of the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
        let target = one_hot(labels, output.ncols())?;
        check_rows(&output, &labels)?;

        Ok((&output - &target)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default())
    }

    fn gradient(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<Array2<f32>> {
        let target = one_hot(labels, output.ncols())?;
        check_rows(&output, &labels)?;

        Ok((&output - &target) * (2.0 / output.len() as f32))
    }
}

/// Cross-entropy between softmax(output) and the integer labels, averaged over the batch.
/// The output is taken to be unnormalized class scores.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl LossFn for CrossEntropy {
    fn loss(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
        check_rows(&output, &labels)?;
        check_labels(&labels, output.ncols())?;

        if labels.is_empty() {
            return Ok(0.0);
        }

        let total: f32 = output
            .axis_iter(Axis(0))
            .zip(labels.iter())
            .map(|(row, &label)| {
                let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
                let log_sum_exp = max + row.mapv(|x| (x - max).exp()).sum().ln();
                log_sum_exp - row[label]
            })
            .sum();

        Ok(total / labels.len() as f32)
    }

    fn gradient(&self, output: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<Array2<f32>> {
        check_rows(&output, &labels)?;
        let target = one_hot(labels, output.ncols())?;
        let n = labels.len().max(1) as f32;

        Ok((softmax(output) - target) / n)
    }
}

/// One row per label with a single 1 in the label's column
pub fn one_hot(labels: ArrayView1<usize>, num_classes: usize) -> Result<Array2<f32>> {
    check_labels(&labels, num_classes)?;

    let mut target = Array2::zeros((labels.len(), num_classes));
    for (mut row, &label) in target.axis_iter_mut(Axis(0)).zip(labels.iter()) {
        row[label] = 1.0;
    }

    Ok(target)
}

fn check_labels(labels: &ArrayView1<usize>, num_classes: usize) -> Result<()> {
    match labels.iter().find(|&&label| label >= num_classes) {
        Some(&label) => Err(Error::SizeMismatch {
            what: "label index",
            got: label,
            expected: num_classes,
        }),
        None => Ok(()),
    }
}

fn check_rows(output: &ArrayView2<f32>, labels: &ArrayView1<usize>) -> Result<()> {
    if output.nrows() != labels.len() {
        return Err(Error::SizeMismatch {
            what: "labels per batch",
            got: labels.len(),
            expected: output.nrows(),
        });
    }
    Ok(())
}
