use std::fmt;

use log::debug;

use crate::error::Result;
use crate::model::Model;
use crate::parsing::Batch;

/// Correct predictions out of the samples seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Fraction of correct predictions, in [0, 1]. Zero when nothing was evaluated.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    /// Accuracy as a percentage, in [0, 100]
    pub fn percent(&self) -> f64 {
        100.0 * self.accuracy()
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}% ({}/{} correct)",
            self.percent(),
            self.correct,
            self.total
        )
    }
}

/// Run the model over `batches` without tracking anything and count how often the
/// highest scoring class is the label.
pub fn evaluate<M, I>(model: &M, batches: I) -> Result<Evaluation>
where
    M: Model + ?Sized,
    I: IntoIterator<Item = Batch>,
{
    let mut evaluation = Evaluation::default();

    for batch in batches {
        let predicted = model.predict(batch.images.view())?;
        let correct = predicted
            .iter()
            .zip(batch.labels.iter())
            .filter(|(p, l)| p == l)
            .count();

        evaluation.correct += correct;
        evaluation.total += batch.len();
    }

    debug!("evaluated {} samples", evaluation.total);
    Ok(evaluation)
}
