use ndarray::{Array, ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

/// Parameter initialization scheme
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Initializer {
    /// Every weight and bias set to one
    Ones,
    /// Uniform in ±1/sqrt(fan_in) for weights and biases
    #[default]
    FanIn,
    /// Uniform in ±sqrt(6/(fan_in + fan_out)), zero biases
    Xavier,
}

impl Initializer {
    pub fn weights<R: Rng>(
        &self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> ArrayD<f32> {
        match self {
            Initializer::Ones => ArrayD::ones(IxDyn(shape)),
            Initializer::FanIn => uniform(shape, (fan_in as f32).sqrt().recip(), rng),
            Initializer::Xavier => {
                let boundary = (6f32 / (fan_in + fan_out) as f32).sqrt();
                uniform(shape, boundary, rng)
            }
        }
    }

    pub fn bias<R: Rng>(&self, len: usize, fan_in: usize, rng: &mut R) -> ArrayD<f32> {
        match self {
            Initializer::Ones => ArrayD::ones(IxDyn(&[len])),
            Initializer::FanIn => uniform(&[len], (fan_in as f32).sqrt().recip(), rng),
            Initializer::Xavier => ArrayD::zeros(IxDyn(&[len])),
        }
    }
}

fn uniform<R: Rng>(shape: &[usize], boundary: f32, rng: &mut R) -> ArrayD<f32> {
    let distribution = Uniform::new_inclusive(-boundary, boundary);
    Array::from_shape_simple_fn(IxDyn(shape), || distribution.sample(rng))
}
