use ndarray::{Array, Dimension};

use crate::error::{Error, Result};

/// Rectified linear unit over arrays of any dimension
#[derive(Debug, Clone, Default)]
pub struct Relu<D: Dimension> {
    output: Option<Array<f32, D>>,
}

impl<D: Dimension> Relu<D> {
    pub fn new() -> Self {
        Self { output: None }
    }

    pub fn forward(&self, x: Array<f32, D>) -> Array<f32, D> {
        x.mapv_into(|z| z.max(0.0))
    }

    pub fn forward_tracked(&mut self, x: Array<f32, D>) -> Array<f32, D> {
        let output = self.forward(x);
        self.output = Some(output.clone());
        output
    }

    pub fn backward(&mut self, mut grad: Array<f32, D>) -> Result<Array<f32, D>> {
        let output = self.output.take().ok_or(Error::NoForwardPass)?;
        if output.shape() != grad.shape() {
            return Err(Error::SizeMismatch {
                what: "relu gradient",
                got: grad.len(),
                expected: output.len(),
            });
        }

        grad.zip_mut_with(&output, |g, &a| {
            if a <= 0.0 {
                *g = 0.0;
            }
        });

        Ok(grad)
    }
}
