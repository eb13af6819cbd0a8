//! The two end-to-end runs: load data, train, persist, evaluate.

use std::path::PathBuf;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::checkpoint;
use crate::error::Result;
use crate::model::loss::{CrossEntropy, Mse};
use crate::model::{ConvNet, ConvNetConfig, Initializer, SoftmaxModel};
use crate::optim::OptimizerKind;
use crate::parsing::mnist::{parse_dataset, ParseOptions};
use crate::parsing::{Batcher, Dataset};
use crate::train::{evaluate, write_history, EpochSummary, Evaluation, Trainer, TrainerConfig};

const EVAL_BATCH_SIZE: usize = 1000;

/// Settings of the softmax run
#[derive(Debug, Clone)]
pub struct SoftmaxRun {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub parse: ParseOptions,
    pub num_epochs: usize,
    pub learning_rate: f32,
    /// `None` trains on the whole training set as a single batch
    pub batch_size: Option<usize>,
    pub optimizer: OptimizerKind,
    pub init: Initializer,
    pub report_every: usize,
    pub seed: Option<u64>,
    pub weight_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl Default for SoftmaxRun {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/mnist_train.csv"),
            test_path: PathBuf::from("data/mnist_test.csv"),
            parse: ParseOptions::default(),
            num_epochs: 500,
            learning_rate: 0.01,
            batch_size: None,
            optimizer: OptimizerKind::Adam,
            init: Initializer::Ones,
            report_every: 100,
            seed: None,
            weight_path: None,
            history_path: None,
        }
    }
}

/// Settings of the convolutional run
#[derive(Debug, Clone)]
pub struct ConvRun {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub parse: ParseOptions,
    pub net: ConvNetConfig,
    pub num_epochs: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub optimizer: OptimizerKind,
    pub seed: Option<u64>,
    pub model_path: PathBuf,
    pub history_path: Option<PathBuf>,
}

impl Default for ConvRun {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("data/mnist_train.csv"),
            test_path: PathBuf::from("data/mnist_test.csv"),
            parse: ParseOptions::default(),
            net: ConvNetConfig::default(),
            num_epochs: 5,
            learning_rate: 0.001,
            batch_size: 64,
            optimizer: OptimizerKind::Adam,
            seed: None,
            model_path: PathBuf::from("mnist_model.json"),
            history_path: None,
        }
    }
}

/// Outcome of a training run
#[derive(Debug)]
pub struct Report<M> {
    pub model: M,
    pub history: Vec<EpochSummary>,
    pub evaluation: Evaluation,
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn finish_history(path: &Option<PathBuf>, history: &[EpochSummary]) -> Result<()> {
    if let Some(path) = path {
        write_history(path, history)?;
        info!("wrote training history to {}", path.display());
    }
    Ok(())
}

/// Train the softmax classifier, reporting test accuracy along the way, then evaluate it
pub fn run_softmax(run: &SoftmaxRun) -> Result<Report<SoftmaxModel>> {
    let train = parse_dataset(&run.train_path, &run.parse)?;
    let test = parse_dataset(&run.test_path, &run.parse)?;

    let model = SoftmaxModel::new(
        train.num_features(),
        run.parse.num_classes,
        run.init,
        &mut rng(run.seed),
    );
    let config = TrainerConfig {
        num_epochs: run.num_epochs,
        report_every: run.report_every,
    };
    let mut trainer = Trainer::new(
        model,
        Mse,
        run.optimizer.build(run.learning_rate),
        config,
    );

    let batch_size = run.batch_size.unwrap_or(train.len());
    let mut batcher = Batcher::shuffled(batch_size, run.seed)?;
    let mut eval_batcher = Batcher::new(EVAL_BATCH_SIZE)?;

    let history = trainer.fit_with_monitor(&train, &mut batcher, |summary, model| {
        let evaluation = evaluate(model, eval_batcher.iter(&test))?;
        info!(
            "epoch {}, loss {:.5}, test accuracy {:.2}%",
            summary.epoch,
            summary.mean_loss,
            evaluation.percent()
        );
        Ok(())
    })?;
    finish_history(&run.history_path, &history)?;

    let model = trainer.into_model();
    if let Some(path) = &run.weight_path {
        checkpoint::save(&model, path)?;
    }

    let evaluation = evaluate(&model, eval_batcher.iter(&test))?;
    info!("softmax test accuracy: {evaluation}");

    Ok(Report {
        model,
        history,
        evaluation,
    })
}

/// Train the convolutional network, save it, then evaluate it on the test set
pub fn train_conv(run: &ConvRun) -> Result<Report<ConvNet>> {
    let train = parse_dataset(&run.train_path, &run.parse)?;

    let model = ConvNet::new(run.net.clone(), Initializer::FanIn, &mut rng(run.seed))?;
    let config = TrainerConfig {
        num_epochs: run.num_epochs,
        report_every: 1,
    };
    let mut trainer = Trainer::new(
        model,
        CrossEntropy,
        run.optimizer.build(run.learning_rate),
        config,
    );

    let mut batcher = Batcher::shuffled(run.batch_size, run.seed)?;
    let history = trainer.fit(&train, &mut batcher)?;
    finish_history(&run.history_path, &history)?;

    let model = trainer.into_model();
    checkpoint::save(&model, &run.model_path)?;

    let test = parse_dataset(&run.test_path, &run.parse)?;
    let evaluation = evaluate_conv(&model, &test, run.batch_size)?;

    Ok(Report {
        model,
        history,
        evaluation,
    })
}

/// Rebuild a convolutional network from a saved checkpoint and evaluate it
pub fn test_conv(run: &ConvRun) -> Result<Evaluation> {
    let mut model = ConvNet::new(run.net.clone(), Initializer::FanIn, &mut rng(Some(0)))?;
    checkpoint::load(&mut model, &run.model_path)?;

    let test = parse_dataset(&run.test_path, &run.parse)?;
    evaluate_conv(&model, &test, run.batch_size)
}

fn evaluate_conv(model: &ConvNet, test: &Dataset, batch_size: usize) -> Result<Evaluation> {
    let evaluation = evaluate(model, Batcher::new(batch_size)?.iter(test))?;
    info!("test accuracy: {evaluation}");
    Ok(evaluation)
}
