use std::fs::File;
use std::path::Path;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::loss::LossFn;
use crate::model::Model;
use crate::optim::Optimizer;
use crate::parsing::{Batch, Batcher, Dataset};

/// Where a training step currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ForwardComputed,
    GradientsComputed,
    Updated,
}

/// Training hyperparams
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub num_epochs: usize,
    /// Log a summary (and run the monitor) every this many epochs. The last epoch is always reported.
    pub report_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            num_epochs: 5,
            report_every: 1,
        }
    }
}

/// What one pass over the training set looked like
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub mean_loss: f32,
    pub batches: usize,
    pub seconds: f64,
}

/// Owns a model, its loss and its optimizer, and runs the training loop over them.
pub struct Trainer<M, L, O> {
    model: M,
    loss_fn: L,
    optimizer: O,
    config: TrainerConfig,
    phase: Phase,
}

impl<M, L, O> Trainer<M, L, O>
where
    M: Model,
    L: LossFn,
    O: Optimizer,
{
    pub fn new(model: M, loss_fn: L, optimizer: O, config: TrainerConfig) -> Self {
        Self {
            model,
            loss_fn,
            optimizer,
            config,
            phase: Phase::Idle,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn advance(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// One gradient step on `batch`. Returns the loss before the update.
    pub fn step(&mut self, batch: &Batch) -> Result<f32> {
        if self.phase != Phase::Idle {
            return Err(Error::InvalidPhase(self.phase));
        }

        let output = self.model.forward_tracked(batch.images.view())?;
        let loss = self.loss_fn.loss(output.view(), batch.labels.view())?;
        self.advance(Phase::ForwardComputed);

        let grad = self.loss_fn.gradient(output.view(), batch.labels.view())?;
        self.model.backward(grad)?;
        self.advance(Phase::GradientsComputed);

        self.optimizer.step(&mut self.model.params_mut())?;
        self.advance(Phase::Updated);

        self.model.zero_grad();
        self.advance(Phase::Idle);

        Ok(loss)
    }

    /// Train for the configured number of epochs.
    pub fn fit(&mut self, dataset: &Dataset, batcher: &mut Batcher) -> Result<Vec<EpochSummary>> {
        self.fit_with_monitor(dataset, batcher, |_, _| Ok(()))
    }

    /// Train for the configured number of epochs, calling `monitor` with the current model
    /// on every reported epoch. The monitor only observes; it cannot change the parameters.
    pub fn fit_with_monitor<F>(
        &mut self,
        dataset: &Dataset,
        batcher: &mut Batcher,
        mut monitor: F,
    ) -> Result<Vec<EpochSummary>>
    where
        F: FnMut(&EpochSummary, &M) -> Result<()>,
    {
        let num_epochs = self.config.num_epochs;
        if self.config.report_every == 0 {
            warn!("report_every is 0, reporting every epoch instead");
        }
        let report_every = self.config.report_every.max(1);
        let mut history = Vec::with_capacity(num_epochs);

        info!(
            "training {} ({} parameters) for {} epochs, batch size {}",
            self.model.name(),
            self.model.num_params(),
            num_epochs,
            batcher.batch_size()
        );

        for epoch in 0..num_epochs {
            let start = Instant::now();
            let mut total_loss = 0.0;
            let mut batches = 0;

            for batch in batcher.iter(dataset) {
                total_loss += self.step(&batch)?;
                batches += 1;
            }

            // Approximated by the mean of the per-batch losses seen during the pass
            let summary = EpochSummary {
                epoch,
                mean_loss: total_loss / batches.max(1) as f32,
                batches,
                seconds: start.elapsed().as_secs_f64(),
            };

            if epoch % report_every == 0 || epoch + 1 == num_epochs {
                info!(
                    "epoch [{}/{}] loss {:.5} ({:.1}s)",
                    epoch + 1,
                    num_epochs,
                    summary.mean_loss,
                    summary.seconds
                );
                monitor(&summary, &self.model)?;
            }

            history.push(summary);
        }

        Ok(history)
    }
}

/// Write the per-epoch summaries as CSV, one row per epoch
pub fn write_history<P: AsRef<Path>>(path: P, history: &[EpochSummary]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = csv::Writer::from_writer(file);
    for summary in history {
        writer.serialize(summary)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loss::{CrossEntropy, Mse};
    use crate::model::{Initializer, SoftmaxModel};
    use crate::optim::{Adam, AdamConfig, Sgd};
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Two well separated clusters: class 0 lights up the first half of the pixels,
    /// class 1 the second half
    fn separable(n: usize) -> Dataset {
        let data = Array2::from_shape_fn((n, 4), |(i, j)| {
            let class = i % 2;
            if (j < 2) == (class == 0) {
                1.0
            } else {
                0.0
            }
        });
        let target = (0..n).map(|i| i % 2).collect();
        Dataset { data, target }
    }

    fn softmax_model(seed: u64) -> SoftmaxModel {
        let mut rng = StdRng::seed_from_u64(seed);
        SoftmaxModel::new(4, 2, Initializer::FanIn, &mut rng)
    }

    fn values(model: &SoftmaxModel) -> Vec<Vec<f32>> {
        model
            .params()
            .iter()
            .map(|p| p.value().iter().copied().collect())
            .collect()
    }

    #[test]
    fn zero_epochs_leave_parameters_unchanged() {
        let model = softmax_model(1);
        let before = values(&model);
        let config = TrainerConfig {
            num_epochs: 0,
            report_every: 1,
        };
        let mut trainer = Trainer::new(model, Mse, Sgd::new(0.5), config);

        let history = trainer.fit(&separable(8), &mut Batcher::new(4).unwrap()).unwrap();

        assert!(history.is_empty());
        assert_eq!(values(trainer.model()), before);
    }

    #[test]
    fn step_returns_to_idle_with_clean_gradients() {
        let mut trainer = Trainer::new(
            softmax_model(2),
            CrossEntropy,
            Sgd::new(0.1),
            TrainerConfig::default(),
        );
        let batch = Batch {
            images: array![[1.0, 1.0, 0.0, 0.0]],
            labels: array![0],
        };
        let before = values(trainer.model());

        let loss = trainer.step(&batch).unwrap();

        assert!(loss >= 0.0);
        assert_eq!(trainer.phase(), Phase::Idle);
        assert_ne!(values(trainer.model()), before);
        assert!(trainer
            .model()
            .params()
            .iter()
            .all(|p| p.grad().iter().all(|&g| g == 0.0)));
    }

    #[test]
    fn training_lowers_the_loss_on_separable_data() {
        let dataset = separable(32);
        let config = TrainerConfig {
            num_epochs: 30,
            report_every: 10,
        };
        let optimizer = Adam::new(AdamConfig {
            learning_rate: 0.05,
            ..Default::default()
        });
        let mut trainer = Trainer::new(softmax_model(3), Mse, optimizer, config);
        let mut batcher = Batcher::shuffled(8, Some(3)).unwrap();

        let mut reports = Vec::new();
        let history = trainer
            .fit_with_monitor(&dataset, &mut batcher, |summary, model| {
                reports.push((summary.epoch, model.loss(&dataset.select(&[0, 1]))?));
                Ok(())
            })
            .unwrap();

        assert_eq!(history.len(), 30);
        assert!(history.iter().all(|s| s.batches == 4));
        assert!(history[29].mean_loss < history[0].mean_loss);
        assert_eq!(
            reports.iter().map(|r| r.0).collect::<Vec<_>>(),
            vec![0, 10, 20, 29]
        );

        let all = dataset.select(&(0..32).collect::<Vec<_>>());
        assert_eq!(trainer.model().accuracy(&all).unwrap(), 1.0);
    }

    #[test]
    fn monitor_errors_stop_training() {
        let mut trainer = Trainer::new(
            softmax_model(4),
            Mse,
            Sgd::new(0.1),
            TrainerConfig::default(),
        );
        let result = trainer.fit_with_monitor(
            &separable(4),
            &mut Batcher::new(2).unwrap(),
            |_, _| Err(Error::Checkpoint("stop".into())),
        );

        assert!(result.is_err());
    }

    #[test]
    fn history_is_written_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let history = vec![
            EpochSummary {
                epoch: 0,
                mean_loss: 0.5,
                batches: 3,
                seconds: 1.5,
            },
            EpochSummary {
                epoch: 1,
                mean_loss: 0.25,
                batches: 3,
                seconds: 1.0,
            },
        ];

        write_history(&path, &history).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,mean_loss,batches,seconds");
        assert_eq!(lines[2], "1,0.25,3,1.0");
    }
}
