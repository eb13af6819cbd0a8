use crate::error::Result;
use crate::model::Param;

mod adam;
mod sgd;

pub use adam::{Adam, AdamConfig};
pub use sgd::Sgd;

/// Update rule applied once per training step.
pub trait Optimizer {
    /// Move every parameter using its accumulated gradient and the optimizer's own state.
    /// Gradients are left untouched; resetting them is the caller's job.
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()>;
}

/// Optimizer selectable from the command line
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f32) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(AdamConfig {
                learning_rate,
                ..Default::default()
            })),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn step(&mut self, params: &mut [&mut Param]) -> Result<()> {
        (**self).step(params)
    }
}
