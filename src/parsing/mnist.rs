use std::fs::File;
use std::path::Path;

use log::{debug, info};
use ndarray::{Array1, Array2};

use super::Dataset;
use crate::error::{Error, Result};

pub const NUM_FEATURES: usize = 784;
pub const NUM_CLASSES: usize = 10;
pub const IMAGE_SIDE: usize = 28;
const GREYSCALE_SIZE: f32 = 255f32;

/// How a dataset file is laid out.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Skip the first line (e.g. the Kaggle export starts with `label,1x1,1x2,...`)
    pub has_headers: bool,
    /// Divide pixel intensities by 255
    pub normalize: bool,
    pub num_features: usize,
    pub num_classes: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            has_headers: false,
            normalize: true,
            num_features: NUM_FEATURES,
            num_classes: NUM_CLASSES,
        }
    }
}

/// Parse a field of a record, reporting where it was found on failure
fn parse_field<T: std::str::FromStr>(value: &str, line: u64, column: usize) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidField {
        line,
        column,
        value: value.to_string(),
    })
}

/// Parse a record of the form <label>,<pixel0x0>,<pixel0x1>,...
/// Returns the pixels and the label
fn parse_record(
    record: &csv::StringRecord,
    line: u64,
    options: &ParseOptions,
) -> Result<(Vec<f32>, usize)> {
    let expected = options.num_features + 1;

    if record.len() != expected {
        return Err(Error::ColumnCount {
            line,
            expected,
            got: record.len(),
        });
    }

    let label: i64 = parse_field(&record[0], line, 0)?;
    if label < 0 || label as usize >= options.num_classes {
        return Err(Error::InvalidLabel {
            line,
            label,
            num_classes: options.num_classes,
        });
    }

    let scale = if options.normalize { GREYSCALE_SIZE } else { 1f32 };
    let pixels = record
        .iter()
        .enumerate()
        .skip(1)
        .map(|(column, value)| parse_field::<f32>(value, line, column).map(|x| x / scale))
        .collect::<Result<Vec<_>>>()?;

    Ok((pixels, label as usize))
}

/// Read a whole dataset file into memory.
///
/// Fails on the first malformed row; nothing is recovered from a partially valid file.
pub fn parse_dataset<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<Dataset> {
    let path = path.as_ref();
    info!("loading dataset from {}", path.display());

    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_reader(file, path, options)
}

/// Same as [`parse_dataset`] for any reader. `origin` is only used in error messages.
pub fn parse_reader<R: std::io::Read>(
    reader: R,
    origin: &Path,
    options: &ParseOptions,
) -> Result<Dataset> {
    // Column counts are checked by hand so the error carries the line number
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.has_headers)
        .flexible(true)
        .from_reader(reader);

    let mut pixels = Vec::new();
    let mut labels = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(idx as u64 + 1);

        let (row, label) = parse_record(&record, line, options)?;
        pixels.extend(row);
        labels.push(label);
    }

    if labels.is_empty() {
        return Err(Error::EmptyDataset(origin.to_path_buf()));
    }

    let data = Array2::from_shape_vec((labels.len(), options.num_features), pixels)?;
    debug!(
        "parsed {} samples with {} features from {}",
        labels.len(),
        options.num_features,
        origin.display()
    );

    Ok(Dataset {
        data,
        target: Array1::from_vec(labels),
    })
}
