//! Training and evaluation of handwritten-digit classifiers: a linear softmax model and a
//! small convolutional network, both trained by minibatch gradient descent on CSV datasets.

pub mod checkpoint;
pub mod error;
pub mod model;
pub mod optim;
pub mod parsing;
pub mod pipeline;
pub mod train;

pub use error::{Error, Result};
