use std::path::PathBuf;

use thiserror::Error;

use crate::train::Phase;

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading data, training or persisting a model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv input: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed json: {0}")]
    Json(#[from] json::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("line {line}: expected {expected} columns, got {got}")]
    ColumnCount {
        line: u64,
        expected: usize,
        got: usize,
    },

    #[error("line {line}, column {column}: cannot parse {value:?} as a number")]
    InvalidField {
        line: u64,
        column: usize,
        value: String,
    },

    #[error("line {line}: label {label} is outside [0, {num_classes})")]
    InvalidLabel {
        line: u64,
        label: i64,
        num_classes: usize,
    },

    #[error("dataset {0} contains no samples")]
    EmptyDataset(PathBuf),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("size mismatch for {what}: got {got}, expected {expected}")]
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("backward pass requested without a tracked forward pass")]
    NoForwardPass,

    #[error("training step started in phase {0:?}, expected Idle")]
    InvalidPhase(Phase),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}
