use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;

use super::layers::{softmax, softmax_backward, Linear};
use super::loss::{LossFn, Mse};
use super::{argmax, Initializer, Model, Param};
use crate::error::{Error, Result};
use crate::parsing::Batch;

/// Linear classifier producing class probabilities: `softmax(x · W + b)`.
/// Trained against one-hot targets with a mean squared error.
#[derive(Debug, Clone)]
pub struct SoftmaxModel {
    linear: Linear,
    // Probabilities of the last tracked forward pass
    probs: Option<Array2<f32>>,
}

impl SoftmaxModel {
    pub fn new<R: Rng>(
        num_features: usize,
        num_classes: usize,
        init: Initializer,
        rng: &mut R,
    ) -> Self {
        Self {
            linear: Linear::new("", num_features, num_classes, init, rng),
            probs: None,
        }
    }

    /// Fraction of samples in `batch` whose most probable class is the label
    pub fn accuracy(&self, batch: &Batch) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        let probs = self.forward(batch.images.view())?;
        let correct = probs
            .axis_iter(Axis(0))
            .zip(batch.labels.iter())
            .filter(|(row, &label)| argmax(row.view()) == label)
            .count();

        Ok(correct as f32 / batch.len() as f32)
    }

    /// Mean squared error between the predicted probabilities and the one-hot labels
    pub fn loss(&self, batch: &Batch) -> Result<f32> {
        let probs = self.forward(batch.images.view())?;
        Mse.loss(probs.view(), batch.labels.view())
    }
}

impl Model for SoftmaxModel {
    fn name(&self) -> &'static str {
        "softmax"
    }

    fn num_classes(&self) -> usize {
        self.linear.d_output()
    }

    fn forward(&self, images: ArrayView2<f32>) -> Result<Array2<f32>> {
        Ok(softmax(self.linear.forward(images)?.view()))
    }

    fn forward_tracked(&mut self, images: ArrayView2<f32>) -> Result<Array2<f32>> {
        let scores = self.linear.forward_tracked(images.to_owned())?;
        let probs = softmax(scores.view());
        self.probs = Some(probs.clone());
        Ok(probs)
    }

    fn backward(&mut self, grad_output: Array2<f32>) -> Result<()> {
        let probs = self.probs.take().ok_or(Error::NoForwardPass)?;
        let grad_scores = softmax_backward(probs.view(), grad_output.view());
        self.linear.backward(grad_scores)?;
        Ok(())
    }

    fn params(&self) -> Vec<&Param> {
        self.linear.params().into()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.linear.params_mut().into()
    }
}
