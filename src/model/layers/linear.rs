use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use rand::Rng;

use crate::error::{Error, Result};
use crate::model::{param_name, Initializer, Param};

/// Fully connected layer: `x · W + b`, with `W` of shape (inputs × outputs).
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Param,
    bias: Param,
    // Input of the last tracked forward pass
    input: Option<Array2<f32>>,
}

impl Linear {
    pub fn new<R: Rng>(
        prefix: &str,
        d_input: usize,
        d_output: usize,
        init: Initializer,
        rng: &mut R,
    ) -> Self {
        let weight = init.weights(&[d_input, d_output], d_input, d_output, rng);
        let bias = init.bias(d_output, d_input, rng);

        Self {
            weight: Param::new(param_name(prefix, "weight"), weight),
            bias: Param::new(param_name(prefix, "bias"), bias),
            input: None,
        }
    }

    pub fn d_input(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn d_output(&self) -> usize {
        self.weight.shape()[1]
    }

    fn weight(&self) -> Result<ArrayView2<'_, f32>> {
        Ok(self.weight.value().view().into_dimensionality::<Ix2>()?)
    }

    fn bias(&self) -> Result<ArrayView1<'_, f32>> {
        Ok(self.bias.value().view().into_dimensionality::<Ix1>()?)
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.d_input() {
            return Err(Error::SizeMismatch {
                what: "linear layer input",
                got: x.ncols(),
                expected: self.d_input(),
            });
        }

        Ok(x.dot(&self.weight()?) + &self.bias()?)
    }

    pub fn forward_tracked(&mut self, x: Array2<f32>) -> Result<Array2<f32>> {
        let output = self.forward(x.view())?;
        self.input = Some(x);
        Ok(output)
    }

    /// Accumulate dW = xᵀ·g and db = Σ g, return the gradient w.r.t. the input (g·Wᵀ)
    pub fn backward(&mut self, grad: Array2<f32>) -> Result<Array2<f32>> {
        let x = self.input.take().ok_or(Error::NoForwardPass)?;

        let weight_grad = x.t().dot(&grad);
        let bias_grad = grad.sum_axis(Axis(0));
        self.weight.accumulate(weight_grad.into_dyn().view())?;
        self.bias.accumulate(bias_grad.into_dyn().view())?;

        Ok(grad.dot(&self.weight()?.t()))
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weight, &self.bias]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weight, &mut self.bias]
    }
}
