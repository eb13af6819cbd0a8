use ndarray::{ArrayD, Zip};

use super::Optimizer;
use crate::error::{Error, Result};
use crate::model::Param;

/// Hyperparameters of [`Adam`]
#[derive(Debug, Clone, Copy)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Adam: gradient descent scaled by bias-corrected running estimates of the first and
/// second moments of each parameter's gradient.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    t: i32,
    // One (first moment, second moment) pair per parameter, created on the first step
    moments: Vec<(ArrayD<f32>, ArrayD<f32>)>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            t: 0,
            moments: Vec::new(),
        }
    }

    /// Number of steps taken so far
    pub fn steps(&self) -> i32 {
        self.t
    }

    fn check_state(&mut self, params: &[&mut Param]) -> Result<()> {
        if self.moments.is_empty() {
            self.moments = params
                .iter()
                .map(|p| {
                    let zeros = ArrayD::zeros(p.value().raw_dim());
                    (zeros.clone(), zeros)
                })
                .collect();
            return Ok(());
        }

        if self.moments.len() != params.len() {
            return Err(Error::SizeMismatch {
                what: "optimizer parameter count",
                got: params.len(),
                expected: self.moments.len(),
            });
        }

        for ((m, _), p) in self.moments.iter().zip(params) {
            if m.shape() != p.shape() {
                return Err(Error::SizeMismatch {
                    what: "optimizer state",
                    got: p.len(),
                    expected: m.len(),
                });
            }
        }

        Ok(())
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()> {
        self.check_state(params)?;

        let AdamConfig {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
        } = self.config;

        self.t += 1;

        let bc1 = 1. - b1.powi(self.t);
        let bc2 = 1. - b2.powi(self.t);
        let step_size = lr * (bc2.sqrt() / bc1);

        for (param, (m, v)) in params.iter_mut().zip(self.moments.iter_mut()) {
            let (value, grad) = param.value_and_grad();

            Zip::from(value)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1. - b1) * g;
                    *v = b2 * *v + (1. - b2) * g.powi(2);
                    *p -= step_size * *m / (v.sqrt() + eps);
                });
        }

        Ok(())
    }
}
