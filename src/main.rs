use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use digit_nets::model::Initializer;
use digit_nets::optim::OptimizerKind;
use digit_nets::parsing::mnist::ParseOptions;
use digit_nets::pipeline::{self, ConvRun, SoftmaxRun};
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train and evaluate the linear softmax classifier
    Softmax(SoftmaxArgs),
    /// Train or evaluate the convolutional network
    Conv {
        #[command(subcommand)]
        command: ConvCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConvCommand {
    /// Train, save the parameters, then evaluate on the test set
    Train(ConvTrainArgs),
    /// Evaluate previously saved parameters on the test set
    Test(ConvTestArgs),
}

/// How the dataset files are laid out
#[derive(Args, Debug)]
struct DataArgs {
    /// The files start with a header line
    #[arg(long)]
    has_headers: bool,

    /// Keep pixel intensities in [0, 255] instead of scaling them to [0, 1]
    #[arg(long)]
    raw_pixels: bool,
}

impl DataArgs {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            has_headers: self.has_headers,
            normalize: !self.raw_pixels,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
struct SoftmaxArgs {
    /// The path of the training dataset
    #[arg(short, long)]
    train_path: PathBuf,

    /// The path of the test dataset
    #[arg(short = 'v', long)]
    test_path: PathBuf,

    #[command(flatten)]
    data: DataArgs,

    /// Number of epochs to train the model for
    #[arg(short, long, default_value_t = 500)]
    epochs: usize,

    /// Learning rate of the optimizer
    #[arg(short, long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Batch size. The whole training set is one batch when not provided
    #[arg(short, long)]
    batch_size: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,

    /// Weight initialization method
    #[arg(short, long, value_enum, default_value_t = Initializer::Ones)]
    initialization: Initializer,

    /// Report loss and test accuracy every this many epochs
    #[arg(short, long, default_value_t = 100)]
    report_every: usize,

    /// Seed for initialization and shuffling
    #[arg(short, long)]
    seed: Option<u64>,

    /// Export the trained weights (JSON) to this path
    #[arg(short, long)]
    weight_path: Option<PathBuf>,

    /// Save the per-epoch loss history (CSV) to this path
    #[arg(short = 'd', long)]
    history_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvTrainArgs {
    /// The path of the training dataset
    #[arg(short, long)]
    train_path: PathBuf,

    /// The path of the test dataset
    #[arg(short = 'v', long)]
    test_path: PathBuf,

    #[command(flatten)]
    data: DataArgs,

    /// Number of epochs to train the network for
    #[arg(short, long, default_value_t = 5)]
    epochs: usize,

    /// Learning rate of the optimizer
    #[arg(short, long, default_value_t = 0.001)]
    learning_rate: f32,

    /// Batch size of the network
    #[arg(short, long, default_value_t = 64)]
    batch_size: usize,

    #[arg(short, long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,

    /// Seed for initialization and shuffling
    #[arg(short, long)]
    seed: Option<u64>,

    /// Where to save the trained parameters
    #[arg(short, long, default_value = "mnist_model.json")]
    model_path: PathBuf,

    /// Save the per-epoch loss history (CSV) to this path
    #[arg(short = 'd', long)]
    history_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvTestArgs {
    /// The path of the test dataset
    #[arg(short = 'v', long)]
    test_path: PathBuf,

    #[command(flatten)]
    data: DataArgs,

    /// Parameters saved by `conv train`
    #[arg(short, long, default_value = "mnist_model.json")]
    model_path: PathBuf,

    #[arg(short, long, default_value_t = 64)]
    batch_size: usize,
}

fn softmax(args: SoftmaxArgs) -> anyhow::Result<()> {
    let run = SoftmaxRun {
        parse: args.data.parse_options(),
        train_path: args.train_path,
        test_path: args.test_path,
        num_epochs: args.epochs,
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        optimizer: args.optimizer,
        init: args.initialization,
        report_every: args.report_every,
        seed: args.seed,
        weight_path: args.weight_path,
        history_path: args.history_path,
    };

    let report = pipeline::run_softmax(&run).context("softmax run failed")?;
    println!("Test accuracy: {:.2}%", report.evaluation.percent());

    Ok(())
}

fn conv_train(args: ConvTrainArgs) -> anyhow::Result<()> {
    let run = ConvRun {
        parse: args.data.parse_options(),
        train_path: args.train_path,
        test_path: args.test_path,
        num_epochs: args.epochs,
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        optimizer: args.optimizer,
        seed: args.seed,
        model_path: args.model_path,
        history_path: args.history_path,
        ..Default::default()
    };

    let report = pipeline::train_conv(&run).context("training the convolutional network failed")?;
    println!("Test accuracy: {:.2}%", report.evaluation.percent());

    Ok(())
}

fn conv_test(args: ConvTestArgs) -> anyhow::Result<()> {
    let run = ConvRun {
        parse: args.data.parse_options(),
        test_path: args.test_path,
        model_path: args.model_path,
        batch_size: args.batch_size,
        ..Default::default()
    };

    let evaluation = pipeline::test_conv(&run)
        .with_context(|| format!("evaluating {} failed", run.model_path.display()))?;
    println!("Test accuracy: {:.2}%", evaluation.percent());

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("{:?}", cli.command);

    match cli.command {
        Command::Softmax(args) => softmax(args),
        Command::Conv { command } => match command {
            ConvCommand::Train(args) => conv_train(args),
            ConvCommand::Test(args) => conv_test(args),
        },
    }
}
