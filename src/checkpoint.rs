//! Parameter persistence.
//!
//! Parameters are exported as a JSON document:
//! `{"model": "<name>", "params": {"<param>": {"shape": [..], "data": [..]}, ..}}`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use json::{object, JsonValue};
use log::info;
use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::model::Model;

/// Write the parameters of `model` to `path`
pub fn save<M: Model + ?Sized, P: AsRef<Path>>(model: &M, path: P) -> Result<()> {
    let path = path.as_ref();
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut params = object! {};
    for param in model.params() {
        let shape: Vec<usize> = param.shape().to_vec();
        let data: Vec<f64> = param.value().iter().map(|&x| x as f64).collect();
        let mut entry = object! {};
        entry["shape"] = shape.into();
        entry["data"] = data.into();
        params[param.name()] = entry;
    }

    let mut document = object! {};
    document["model"] = model.name().into();
    document["params"] = params;

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    document.write(&mut writer).map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    info!(
        "saved {} parameters of {} to {}",
        model.num_params(),
        model.name(),
        path.display()
    );
    Ok(())
}

/// Restore parameters saved by [`save`] into `model`, which must have the same architecture
pub fn load<M: Model + ?Sized, P: AsRef<Path>>(model: &mut M, path: P) -> Result<()> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = json::parse(&contents)?;

    let saved_name = document["model"]
        .as_str()
        .ok_or_else(|| Error::Checkpoint("missing model name".to_string()))?;
    if saved_name != model.name() {
        return Err(Error::Checkpoint(format!(
            "checkpoint holds a {saved_name} model, expected {}",
            model.name()
        )));
    }

    for param in model.params_mut() {
        let entry = &document["params"][param.name()];
        if entry.is_null() {
            return Err(Error::Checkpoint(format!(
                "parameter {} is missing",
                param.name()
            )));
        }

        let shape = read_shape(&entry["shape"], param.name())?;
        if shape != param.shape() {
            return Err(Error::Checkpoint(format!(
                "parameter {} has shape {:?}, expected {:?}",
                param.name(),
                shape,
                param.shape()
            )));
        }

        let data = entry["data"]
            .members()
            .map(|x| x.as_f32())
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                Error::Checkpoint(format!("parameter {} has non-numeric data", param.name()))
            })?;
        let value = ArrayD::from_shape_vec(IxDyn(&shape), data)?;

        param.assign(value.view())?;
    }

    info!("loaded {} from {}", model.name(), path.display());
    Ok(())
}

fn read_shape(value: &JsonValue, name: &str) -> Result<Vec<usize>> {
    if !value.is_array() {
        return Err(Error::Checkpoint(format!("parameter {name} has no shape")));
    }

    value
        .members()
        .map(|dim| dim.as_usize())
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| Error::Checkpoint(format!("parameter {name} has an invalid shape")))
}
