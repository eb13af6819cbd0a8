use ndarray::{Array2, Array4, ArrayView1, ArrayView2, ArrayView4, Axis, Ix1};
use rand::Rng;

use super::standard;
use crate::error::{Error, Result};
use crate::model::{param_name, Initializer, Param};

/// 2D convolution with stride 1 and zero padding, computed as one matrix product over the
/// unrolled receptive fields (im2col).
///
/// Inputs and outputs are laid out as (batch, channels, height, width).
#[derive(Debug, Clone)]
pub struct Conv2d {
    weight: Param,
    bias: Param,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: usize,
    trace: Option<Trace>,
}

#[derive(Debug, Clone)]
struct Trace {
    cols: Array2<f32>,
    input_dim: (usize, usize, usize, usize),
}

impl Conv2d {
    pub fn new<R: Rng>(
        prefix: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        init: Initializer,
        rng: &mut R,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        let fan_out = out_channels * kernel_size * kernel_size;
        let weight = init.weights(
            &[out_channels, in_channels, kernel_size, kernel_size],
            fan_in,
            fan_out,
            rng,
        );
        let bias = init.bias(out_channels, fan_in, rng);

        Self {
            weight: Param::new(param_name(prefix, "weight"), weight),
            bias: Param::new(param_name(prefix, "bias"), bias),
            in_channels,
            out_channels,
            kernel_size,
            padding,
            trace: None,
        }
    }

    /// Spatial size of the output for an input side of `side`
    pub fn output_side(&self, side: usize) -> usize {
        (side + 2 * self.padding + 1).saturating_sub(self.kernel_size)
    }

    /// The kernels as a (out_channels × in_channels·k·k) matrix
    fn kernel_matrix(&self) -> Result<ArrayView2<'_, f32>> {
        let k = self.kernel_size;
        Ok(self
            .weight
            .value()
            .view()
            .into_shape((self.out_channels, self.in_channels * k * k))?)
    }

    fn bias(&self) -> Result<ArrayView1<'_, f32>> {
        Ok(self.bias.value().view().into_dimensionality::<Ix1>()?)
    }

    fn check_input(&self, dim: (usize, usize, usize, usize)) -> Result<(usize, usize)> {
        let (_, channels, height, width) = dim;
        if channels != self.in_channels {
            return Err(Error::SizeMismatch {
                what: "convolution input channels",
                got: channels,
                expected: self.in_channels,
            });
        }

        let (oh, ow) = (self.output_side(height), self.output_side(width));
        if oh == 0 || ow == 0 {
            return Err(Error::SizeMismatch {
                what: "convolution input side",
                got: height.min(width),
                expected: self.kernel_size,
            });
        }

        Ok((oh, ow))
    }

    /// One row per output position, one column per (channel, ky, kx)
    fn im2col(&self, x: ArrayView4<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let (n, c, h, w) = x.dim();
        let k = self.kernel_size;
        let pad = self.padding as isize;
        let mut cols = Array2::zeros((n * oh * ow, c * k * k));

        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    let mut row = cols.row_mut((b * oh + oy) * ow + ox);
                    for ch in 0..c {
                        for ky in 0..k {
                            let iy = oy as isize + ky as isize - pad;
                            if iy < 0 || iy as usize >= h {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = ox as isize + kx as isize - pad;
                                if ix < 0 || ix as usize >= w {
                                    continue;
                                }
                                row[(ch * k + ky) * k + kx] = x[[b, ch, iy as usize, ix as usize]];
                            }
                        }
                    }
                }
            }
        }

        cols
    }

    /// Inverse scatter of `im2col`: overlapping receptive fields add up
    fn col2im(
        &self,
        cols: ArrayView2<f32>,
        input_dim: (usize, usize, usize, usize),
        oh: usize,
        ow: usize,
    ) -> Array4<f32> {
        let (n, c, h, w) = input_dim;
        let k = self.kernel_size;
        let pad = self.padding as isize;
        let mut x = Array4::zeros(input_dim);

        for b in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    let row = cols.row((b * oh + oy) * ow + ox);
                    for ch in 0..c {
                        for ky in 0..k {
                            let iy = oy as isize + ky as isize - pad;
                            if iy < 0 || iy as usize >= h {
                                continue;
                            }
                            for kx in 0..k {
                                let ix = ox as isize + kx as isize - pad;
                                if ix < 0 || ix as usize >= w {
                                    continue;
                                }
                                x[[b, ch, iy as usize, ix as usize]] += row[(ch * k + ky) * k + kx];
                            }
                        }
                    }
                }
            }
        }

        x
    }

    fn apply_kernels(&self, cols: &Array2<f32>, n: usize, oh: usize, ow: usize) -> Result<Array4<f32>> {
        let out = cols.dot(&self.kernel_matrix()?.t()) + &self.bias()?;
        let out = standard(out)
            .into_shape((n, oh, ow, self.out_channels))?
            .permuted_axes([0, 3, 1, 2]);

        Ok(standard(out))
    }

    pub fn forward(&self, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (oh, ow) = self.check_input(x.dim())?;
        let cols = self.im2col(x, oh, ow);
        self.apply_kernels(&cols, x.dim().0, oh, ow)
    }

    pub fn forward_tracked(&mut self, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (oh, ow) = self.check_input(x.dim())?;
        let cols = self.im2col(x, oh, ow);
        let out = self.apply_kernels(&cols, x.dim().0, oh, ow)?;

        self.trace = Some(Trace {
            cols,
            input_dim: x.dim(),
        });
        Ok(out)
    }

    /// Accumulate the kernel and bias gradients, return the gradient w.r.t. the input
    pub fn backward(&mut self, grad: Array4<f32>) -> Result<Array4<f32>> {
        let Trace { cols, input_dim } = self.trace.take().ok_or(Error::NoForwardPass)?;
        let (n, oc, oh, ow) = grad.dim();
        if oc != self.out_channels || n != input_dim.0 || cols.nrows() != n * oh * ow {
            return Err(Error::SizeMismatch {
                what: "convolution gradient",
                got: grad.len(),
                expected: cols.nrows() * self.out_channels,
            });
        }

        // (n, oc, oh, ow) -> (n·oh·ow, oc), matching the rows of `cols`
        let grad = standard(grad.permuted_axes([0, 2, 3, 1])).into_shape((n * oh * ow, oc))?;

        let kernel_grad = standard(grad.t().dot(&cols)).into_shape(self.weight.value().raw_dim())?;
        self.weight.accumulate(kernel_grad.view())?;
        self.bias.accumulate(grad.sum_axis(Axis(0)).into_dyn().view())?;

        let cols_grad = grad.dot(&self.kernel_matrix()?);
        Ok(self.col2im(cols_grad.view(), input_dim, oh, ow))
    }

    pub fn params(&self) -> [&Param; 2] {
        [&self.weight, &self.bias]
    }

    pub fn params_mut(&mut self) -> [&mut Param; 2] {
        [&mut self.weight, &mut self.bias]
    }
}
