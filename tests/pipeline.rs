use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use digit_nets::model::{ConvNetConfig, Initializer, Model};
use digit_nets::optim::OptimizerKind;
use digit_nets::parsing::mnist::ParseOptions;
use digit_nets::pipeline::{run_softmax, test_conv, train_conv, ConvRun, SoftmaxRun};
use digit_nets::Error;

/// Rows of `label,pixel..` where class 0 lights up the first half of the image and
/// class 1 the second half.
fn write_split_images(path: &Path, rows: usize, num_features: usize) {
    let mut contents = String::new();
    for row in 0..rows {
        let label = row % 2;
        write!(contents, "{label}").unwrap();
        for pixel in 0..num_features {
            let lit = (pixel < num_features / 2) == (label == 0);
            let value = if lit { 200 + (row * 7 + pixel) % 50 } else { (row + pixel) % 20 };
            write!(contents, ",{value}").unwrap();
        }
        contents.push('\n');
    }
    fs::write(path, contents).unwrap();
}

fn options(num_features: usize) -> ParseOptions {
    ParseOptions {
        num_features,
        num_classes: 2,
        ..Default::default()
    }
}

#[test]
fn softmax_run_learns_split_images_and_exports_weights() {
    let dir = tempfile::tempdir().unwrap();
    let train_path = dir.path().join("train.csv");
    let test_path = dir.path().join("test.csv");
    write_split_images(&train_path, 40, 4);
    write_split_images(&test_path, 10, 4);

    let run = SoftmaxRun {
        train_path,
        test_path,
        parse: options(4),
        num_epochs: 200,
        learning_rate: 0.05,
        init: Initializer::FanIn,
        report_every: 50,
        seed: Some(3),
        weight_path: Some(dir.path().join("weights.json")),
        history_path: Some(dir.path().join("history.csv")),
        ..Default::default()
    };
    let report = run_softmax(&run).unwrap();

    assert_eq!(report.history.len(), 200);
    assert!(report.history[199].mean_loss < report.history[0].mean_loss);
    assert_eq!(report.evaluation.total, 10);
    assert_eq!(report.evaluation.correct, 10);

    let weights = fs::read_to_string(dir.path().join("weights.json")).unwrap();
    assert!(weights.contains("\"softmax\""));
    let history = fs::read_to_string(dir.path().join("history.csv")).unwrap();
    assert_eq!(history.lines().count(), 201);
}

#[test]
fn conv_run_saves_a_checkpoint_that_tests_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let train_path = dir.path().join("train.csv");
    let test_path = dir.path().join("test.csv");
    write_split_images(&train_path, 24, 16);
    write_split_images(&test_path, 8, 16);

    let run = ConvRun {
        train_path,
        test_path,
        parse: options(16),
        net: ConvNetConfig {
            image_side: 4,
            conv_channels: [2, 3],
            hidden: 8,
            num_classes: 2,
            ..Default::default()
        },
        num_epochs: 3,
        learning_rate: 0.01,
        batch_size: 5,
        optimizer: OptimizerKind::Adam,
        seed: Some(11),
        model_path: dir.path().join("model.json"),
        history_path: None,
    };

    let report = train_conv(&run).unwrap();
    assert_eq!(report.history.len(), 3);
    assert!(report.history.iter().all(|epoch| epoch.batches == 5));
    assert_eq!(report.model.name(), "conv_net");
    assert_eq!(report.evaluation.total, 8);

    let reloaded = test_conv(&run).unwrap();
    assert_eq!(reloaded, report.evaluation);
}

#[test]
fn conv_test_without_a_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let test_path = dir.path().join("test.csv");
    write_split_images(&test_path, 4, 16);

    let run = ConvRun {
        test_path,
        parse: options(16),
        net: ConvNetConfig {
            image_side: 4,
            conv_channels: [2, 3],
            hidden: 8,
            num_classes: 2,
            ..Default::default()
        },
        model_path: dir.path().join("absent.json"),
        ..Default::default()
    };

    assert!(matches!(test_conv(&run), Err(Error::Io { .. })));
}
