//! Loss and metrics: softmax cross-entropy, L2 penalty, accuracy

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2};

/// Compute softmax per row: exp(x_i - max) / sum(exp(x_j - max))
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Index of the largest value in each row
pub fn argmax_rows(x: &Array2<f32>) -> Array1<usize> {
    Array1::from_iter(x.rows().into_iter().map(|row| {
        let mut best = 0usize;
        let mut best_v = f32::NEG_INFINITY;
        for (i, &v) in row.iter().enumerate() {
            if v > best_v {
                best_v = v;
                best = i;
            }
        }
        best
    }))
}

/// Mean cross-entropy between softmax(logits) and one-hot labels.
///
/// Logits and labels are (batch, num_classes); a shape mismatch is fatal.
/// A degenerate batch producing NaN propagates — numerical errors are
/// reported upward, not masked.
pub fn softmax_cross_entropy(logits: &Array2<f32>, labels: &Array2<f32>) -> Result<f32> {
    if logits.dim() != labels.dim() {
        return Err(ModelError::ShapeMismatch {
            context: "cross-entropy loss",
            expected: format!("labels of shape {:?}", logits.dim()),
            actual: format!("{:?}", labels.dim()),
        });
    }
    let probs = softmax_rows(logits);
    let batch = logits.nrows() as f32;
    let total: f32 = labels
        .iter()
        .zip(probs.iter())
        .map(|(&t, &p)| -t * (p + 1e-10).max(f32::MIN_POSITIVE).ln())
        .sum();
    Ok(total / batch)
}

/// TF-style L2 penalty: sum(x^2) / 2
pub fn l2_loss<'a, I: IntoIterator<Item = &'a f32>>(values: I) -> f32 {
    values.into_iter().map(|v| v * v).sum::<f32>() / 2.0
}

/// Number of rows where argmax(logits) equals argmax(labels)
pub fn correct_count(predictions: &Array1<usize>, labels: &Array2<f32>) -> usize {
    let truth = argmax_rows(labels);
    predictions
        .iter()
        .zip(truth.iter())
        .filter(|(p, t)| p == t)
        .count()
}

/// Fraction of the batch predicted correctly
pub fn accuracy(predictions: &Array1<usize>, labels: &Array2<f32>) -> f32 {
    if predictions.is_empty() {
        return 0.0;
    }
    correct_count(predictions, labels) as f32 / predictions.len() as f32
}
