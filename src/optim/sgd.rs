use ndarray::Zip;

use super::Optimizer;
use crate::error::Result;
use crate::model::Param;

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    /// Returns a new `Sgd` taking steps of length `learning_rate` against the gradient.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()> {
        let lr = self.learning_rate;

        for param in params.iter_mut() {
            let (value, grad) = param.value_and_grad();
            Zip::from(value).and(grad).for_each(|w, &g| *w -= lr * g);
        }

        Ok(())
    }
}
