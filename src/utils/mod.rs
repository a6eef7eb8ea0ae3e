//! Math utilities: gate activations, softmax, argmax.

use ndarray::{Array2, ArrayView1, Axis};

/// Logistic sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Derivative of sigmoid, given its output `s = sigmoid(x)`.
#[inline]
pub fn d_sigmoid_from_output(s: f32) -> f32 {
    s * (1.0 - s)
}

/// Derivative of tanh, given its output `t = tanh(x)`.
#[inline]
pub fn d_tanh_from_output(t: f32) -> f32 {
    1.0 - t * t
}

/// Row-wise softmax. Each output row sums to 1.
#[must_use]
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// Index of the largest value; ties resolve to the lowest index.
///
/// NaN entries never win. Returns 0 for an empty or all-NaN slice.
#[must_use]
pub fn argmax(values: ArrayView1<f32>) -> usize {
    let mut best_idx = 0;
    let mut best_val = f32::NEG_INFINITY;
    let mut seen = false;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if !seen || v > best_val {
            best_idx = i;
            best_val = v;
            seen = true;
        }
    }
    best_idx
}
