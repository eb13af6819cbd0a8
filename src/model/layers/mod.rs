use ndarray::{Array, Array2, ArrayView2, Axis, Dimension, Zip};

mod conv2d;
mod linear;
mod relu;

pub use conv2d::Conv2d;
pub use linear::Linear;
pub use relu::Relu;

/// Make sure `array` is laid out in row-major order so it can be reshaped without copying again
pub(crate) fn standard<D: Dimension>(array: Array<f32, D>) -> Array<f32, D> {
    if array.is_standard_layout() {
        array
    } else {
        array.as_standard_layout().into_owned()
    }
}

/// Softmax function - Convert each row of scores into a probability distribution
pub fn softmax(scores: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = scores.to_owned();

    for mut row in probs.axis_iter_mut(Axis(0)) {
        // Shift by the max so exp() cannot overflow
        let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }

    probs
}

/// Gradient w.r.t. the scores given the softmax output and the gradient w.r.t. it:
/// dz_i = p_i * (g_i - sum_j g_j p_j)
pub fn softmax_backward(probs: ArrayView2<f32>, grad: ArrayView2<f32>) -> Array2<f32> {
    let dot = (&probs * &grad).sum_axis(Axis(1)).insert_axis(Axis(1));
    let mut out = Array2::zeros(probs.raw_dim());

    Zip::from(&mut out)
        .and(&probs)
        .and(&grad)
        .and_broadcast(&dot)
        .for_each(|o, &p, &g, &d| *o = p * (g - d));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn softmax_rows_sum_to_one_even_for_large_scores() {
        let probs = softmax(array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]].view());

        for row in probs.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(probs[[1, 0]], 1.0 / 3.0, epsilon = 1e-6);
        assert!(probs[[0, 2]] > probs[[0, 1]]);
    }

    #[test]
    fn softmax_backward_matches_finite_differences() {
        let scores = array![[0.3f32, -1.2, 0.8]];
        let weights = array![[0.5f32, -2.0, 1.5]];
        // f(z) = sum(weights * softmax(z))
        let f = |z: &Array2<f32>| (&softmax(z.view()) * &weights).sum();

        let probs = softmax(scores.view());
        let analytic = softmax_backward(probs.view(), weights.view());

        let eps = 1e-3;
        for j in 0..3 {
            let mut plus = scores.clone();
            plus[[0, j]] += eps;
            let mut minus = scores.clone();
            minus[[0, j]] -= eps;
            let numeric = (f(&plus) - f(&minus)) / (2.0 * eps);
            assert_abs_diff_eq!(analytic[[0, j]], numeric, epsilon = 1e-3);
        }
    }
}
