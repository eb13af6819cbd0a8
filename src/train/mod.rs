mod eval;
mod trainer;

pub use eval::{evaluate, Evaluation};
pub use trainer::{write_history, EpochSummary, Phase, Trainer, TrainerConfig};
