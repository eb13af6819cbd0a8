use ndarray::{Array2, Array4, ArrayView2, Ix2, Ix4};
use rand::Rng;

use super::layers::{standard, Conv2d, Linear, Relu};
use super::{Initializer, Model, Param};
use crate::error::{Error, Result};
use crate::parsing::mnist::{IMAGE_SIDE, NUM_CLASSES};

/// Shape of a [`ConvNet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvNetConfig {
    /// Images are square with one channel
    pub image_side: usize,
    pub conv_channels: [usize; 2],
    pub kernel_size: usize,
    pub padding: usize,
    pub hidden: usize,
    pub num_classes: usize,
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        Self {
            image_side: IMAGE_SIDE,
            conv_channels: [32, 64],
            kernel_size: 3,
            padding: 1,
            hidden: 128,
            num_classes: NUM_CLASSES,
        }
    }
}

/// Two convolution + ReLU stages, flatten, then two fully connected stages.
/// The last stage has no activation: the output is raw class scores.
#[derive(Debug, Clone)]
pub struct ConvNet {
    config: ConvNetConfig,
    conv1: Conv2d,
    act1: Relu<Ix4>,
    conv2: Conv2d,
    act2: Relu<Ix4>,
    fc1: Linear,
    act3: Relu<Ix2>,
    fc2: Linear,
    // Spatial side after the second convolution
    feature_side: usize,
}

impl ConvNet {
    pub fn new<R: Rng>(config: ConvNetConfig, init: Initializer, rng: &mut R) -> Result<Self> {
        let [c1, c2] = config.conv_channels;
        let (k, pad) = (config.kernel_size, config.padding);

        let conv1 = Conv2d::new("conv1", 1, c1, k, pad, init, rng);
        let conv2 = Conv2d::new("conv2", c1, c2, k, pad, init, rng);
        let feature_side = conv2.output_side(conv1.output_side(config.image_side));
        if feature_side == 0 {
            return Err(Error::SizeMismatch {
                what: "image side",
                got: config.image_side,
                expected: k,
            });
        }

        let flat = c2 * feature_side * feature_side;
        let fc1 = Linear::new("fc1", flat, config.hidden, init, rng);
        let fc2 = Linear::new("fc2", config.hidden, config.num_classes, init, rng);

        Ok(Self {
            config,
            conv1,
            act1: Relu::new(),
            conv2,
            act2: Relu::new(),
            fc1,
            act3: Relu::new(),
            fc2,
            feature_side,
        })
    }

    pub fn config(&self) -> &ConvNetConfig {
        &self.config
    }

    /// (batch, pixels) -> (batch, 1, side, side)
    fn to_images(&self, images: ArrayView2<f32>) -> Result<Array4<f32>> {
        let side = self.config.image_side;
        if images.ncols() != side * side {
            return Err(Error::SizeMismatch {
                what: "pixels per image",
                got: images.ncols(),
                expected: side * side,
            });
        }

        let n = images.nrows();
        Ok(standard(images.to_owned()).into_shape((n, 1, side, side))?)
    }
}

impl Model for ConvNet {
    fn name(&self) -> &'static str {
        "conv_net"
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn forward(&self, images: ArrayView2<f32>) -> Result<Array2<f32>> {
        let x = self.to_images(images)?;
        let x = self.act1.forward(self.conv1.forward(x.view())?);
        let x = self.act2.forward(self.conv2.forward(x.view())?);

        let n = x.dim().0;
        let x = standard(x).into_shape((n, flat_len(&self.config, self.feature_side)))?;
        let x = self.act3.forward(self.fc1.forward(x.view())?);

        self.fc2.forward(x.view())
    }

    fn forward_tracked(&mut self, images: ArrayView2<f32>) -> Result<Array2<f32>> {
        let x = self.to_images(images)?;
        let x = self.conv1.forward_tracked(x.view())?;
        let x = self.act1.forward_tracked(x);
        let x = self.conv2.forward_tracked(x.view())?;
        let x = self.act2.forward_tracked(x);

        let n = x.dim().0;
        let x = standard(x).into_shape((n, flat_len(&self.config, self.feature_side)))?;
        let x = self.fc1.forward_tracked(x)?;
        let x = self.act3.forward_tracked(x);

        self.fc2.forward_tracked(x)
    }

    fn backward(&mut self, grad_output: Array2<f32>) -> Result<()> {
        let grad = self.fc2.backward(grad_output)?;
        let grad = self.act3.backward(grad)?;
        let grad = self.fc1.backward(grad)?;

        let n = grad.nrows();
        let side = self.feature_side;
        let grad = standard(grad).into_shape((n, self.config.conv_channels[1], side, side))?;

        let grad = self.act2.backward(grad)?;
        let grad = self.conv2.backward(grad)?;
        let grad = self.act1.backward(grad)?;
        // The gradient w.r.t. the images themselves is not needed
        self.conv1.backward(grad)?;

        Ok(())
    }

    fn params(&self) -> Vec<&Param> {
        let mut params = Vec::with_capacity(8);
        params.extend(self.conv1.params());
        params.extend(self.conv2.params());
        params.extend(self.fc1.params());
        params.extend(self.fc2.params());
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = Vec::with_capacity(8);
        params.extend(self.conv1.params_mut());
        params.extend(self.conv2.params_mut());
        params.extend(self.fc1.params_mut());
        params.extend(self.fc2.params_mut());
        params
    }
}

fn flat_len(config: &ConvNetConfig, feature_side: usize) -> usize {
    config.conv_channels[1] * feature_side * feature_side
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::loss::{CrossEntropy, LossFn};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_config() -> ConvNetConfig {
        ConvNetConfig {
            image_side: 5,
            conv_channels: [2, 3],
            kernel_size: 3,
            padding: 1,
            hidden: 6,
            num_classes: 4,
        }
    }

    fn tiny_net() -> ConvNet {
        let mut rng = StdRng::seed_from_u64(21);
        ConvNet::new(tiny_config(), Initializer::FanIn, &mut rng).unwrap()
    }

    fn images(n: usize) -> Array2<f32> {
        Array::from_shape_fn((n, 25), |(i, j)| ((i * 13 + j * 7) % 17) as f32 / 17.0)
    }

    #[test]
    fn default_network_has_the_expected_parameter_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = ConvNet::new(ConvNetConfig::default(), Initializer::FanIn, &mut rng).unwrap();
        let shapes: Vec<(String, Vec<usize>)> = net
            .params()
            .iter()
            .map(|p| (p.name().to_string(), p.shape().to_vec()))
            .collect();

        assert_eq!(shapes[0], ("conv1.weight".to_string(), vec![32, 1, 3, 3]));
        assert_eq!(shapes[3], ("conv2.bias".to_string(), vec![64]));
        assert_eq!(shapes[4], ("fc1.weight".to_string(), vec![64 * 28 * 28, 128]));
        assert_eq!(shapes[7], ("fc2.bias".to_string(), vec![10]));
    }

    #[test]
    fn outputs_one_score_per_class_and_sample() {
        let net = tiny_net();
        assert_eq!(net.forward(images(3).view()).unwrap().dim(), (3, 4));
    }

    #[test]
    fn tracked_and_untracked_passes_agree() {
        let mut net = tiny_net();
        let x = images(2);
        let plain = net.forward(x.view()).unwrap();
        let tracked = net.forward_tracked(x.view()).unwrap();

        assert_eq!(plain, tracked);
    }

    #[test]
    fn rejects_images_of_the_wrong_size() {
        let net = tiny_net();
        let err = net.forward(Array::zeros((1, 24)).view()).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { got: 24, expected: 25, .. }));
    }

    #[test]
    fn backward_fills_every_gradient_consistently() {
        let mut net = tiny_net();
        let x = images(3);
        let labels = array![0usize, 3, 1];
        let loss = |net: &ConvNet| {
            let scores = net.forward(x.view()).unwrap();
            CrossEntropy.loss(scores.view(), labels.view()).unwrap()
        };

        let scores = net.forward_tracked(x.view()).unwrap();
        let grad = CrossEntropy.gradient(scores.view(), labels.view()).unwrap();
        net.backward(grad).unwrap();

        let eps = 1e-3;
        for (param_idx, element) in [(0usize, 4usize), (1, 1), (2, 10), (5, 2), (6, 7)] {
            let analytic = net.params()[param_idx].grad().as_slice().unwrap()[element];

            let mut probe = net.clone();
            probe.params_mut()[param_idx]
                .value_and_grad()
                .0
                .as_slice_mut()
                .unwrap()[element] += eps;
            let plus = loss(&probe);
            probe.params_mut()[param_idx]
                .value_and_grad()
                .0
                .as_slice_mut()
                .unwrap()[element] -= 2.0 * eps;
            let minus = loss(&probe);

            assert_abs_diff_eq!(analytic, (plus - minus) / (2.0 * eps), epsilon = 2e-3);
        }
    }

    #[test]
    fn backward_without_forward_fails() {
        let mut net = tiny_net();
        let err = net.backward(Array::zeros((1, 4))).unwrap_err();
        assert!(matches!(err, Error::NoForwardPass));
    }
}
