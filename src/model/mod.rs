use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis};

use crate::error::{Error, Result};

pub mod conv_net;
pub mod init;
pub mod layers;
pub mod loss;
pub mod softmax;

pub use conv_net::{ConvNet, ConvNetConfig};
pub use init::Initializer;
pub use softmax::SoftmaxModel;

/// A classifier mapping a batch of flattened images (one per row) to per-class scores.
///
/// Training goes through three calls: [`Model::forward_tracked`] records what the
/// backward pass needs, [`Model::backward`] turns the gradient of the loss w.r.t. the
/// output into gradients w.r.t. every parameter, and [`Model::zero_grad`] clears them
/// once the optimizer has consumed them.
pub trait Model {
    /// Architecture name, stored in checkpoints
    fn name(&self) -> &'static str;

    fn num_classes(&self) -> usize;

    /// Inference pass. Nothing is recorded and the model is left untouched.
    fn forward(&self, images: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Forward pass that keeps the intermediate values needed by [`Model::backward`]
    fn forward_tracked(&mut self, images: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Accumulate the gradient of every parameter, given the gradient of the loss
    /// w.r.t. the output of the last tracked forward pass. Consumes that pass.
    fn backward(&mut self, grad_output: Array2<f32>) -> Result<()>;

    fn params(&self) -> Vec<&Param>;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    fn zero_grad(&mut self) {
        for param in self.params_mut() {
            param.zero_grad();
        }
    }

    /// Total number of scalar parameters
    fn num_params(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Predicted class for every row of `images`
    fn predict(&self, images: ArrayView2<f32>) -> Result<Array1<usize>> {
        let scores = self.forward(images)?;
        Ok(scores.axis_iter(Axis(0)).map(argmax).collect())
    }
}

/// Index of the largest value. Ties go to the lowest index and NaNs are never picked
/// over a number, so the result is stable for uniform scores.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;

    for (idx, &value) in row.iter().enumerate() {
        if value > best_value {
            best = idx;
            best_value = value;
        }
    }

    best
}

/// A named trainable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    value: ArrayD<f32>,
    grad: ArrayD<f32>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        let grad = ArrayD::zeros(value.raw_dim());
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn grad(&self) -> &ArrayD<f32> {
        &self.grad
    }

    /// Mutable value and read-only gradient, for optimizers
    pub fn value_and_grad(&mut self) -> (&mut ArrayD<f32>, &ArrayD<f32>) {
        (&mut self.value, &self.grad)
    }

    /// Replace the value, keeping the shape
    pub fn assign(&mut self, value: ArrayViewD<f32>) -> Result<()> {
        self.check_shape(value.shape())?;
        self.value.assign(&value);
        Ok(())
    }

    /// Add `grad` to the accumulated gradient
    pub fn accumulate(&mut self, grad: ArrayViewD<f32>) -> Result<()> {
        self.check_shape(grad.shape())?;
        self.grad += &grad;
        Ok(())
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    fn check_shape(&self, shape: &[usize]) -> Result<()> {
        if shape != self.value.shape() {
            return Err(Error::SizeMismatch {
                what: "parameter shape",
                got: shape.iter().product(),
                expected: self.value.len(),
            });
        }
        Ok(())
    }
}

/// `prefix.leaf`, or just `leaf` for top-level parameters
pub(crate) fn param_name(prefix: &str, leaf: &str) -> String {
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        format!("{prefix}.{leaf}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, ArrayD, IxDyn};

    #[test]
    fn argmax_breaks_ties_towards_lowest_index() {
        assert_eq!(argmax(arr1(&[0.1, 0.1, 0.1]).view()), 0);
        assert_eq!(argmax(arr1(&[0.0, 0.5, 0.5, 0.2]).view()), 1);
        assert_eq!(argmax(arr1(&[f32::NAN, 1.0, 2.0]).view()), 2);
    }

    #[test]
    fn param_gradients_accumulate_and_reset() {
        let mut param = Param::new("w", ArrayD::zeros(IxDyn(&[2, 3])));
        let grad = ArrayD::from_elem(IxDyn(&[2, 3]), 0.5f32);

        param.accumulate(grad.view()).unwrap();
        param.accumulate(grad.view()).unwrap();
        assert!(param.grad().iter().all(|&g| g == 1.0));

        param.zero_grad();
        assert!(param.grad().iter().all(|&g| g == 0.0));
        assert_eq!(param.len(), 6);
    }

    #[test]
    fn param_rejects_foreign_shapes() {
        let mut param = Param::new("w", ArrayD::zeros(IxDyn(&[2, 3])));
        let wrong = ArrayD::zeros(IxDyn(&[3, 2]));

        assert!(matches!(
            param.accumulate(wrong.view()),
            Err(Error::SizeMismatch { .. })
        ));
        assert!(param.assign(wrong.view()).is_err());
    }
}
