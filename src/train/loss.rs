//! Loss functions with analytic gradients
//!
//! Each loss returns its scalar value together with the gradient at the
//! prediction, so the orchestrators can chain gradients through the
//! classifier into the translator without an autograd tape.

use crate::error::{Error, Result};
use crate::spectral::Spectrum;
use ndarray::Array2;

/// Row-wise softmax with max subtraction for numerical stability.
pub fn softmax_2d(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    out
}

/// Mean squared error over every element; gradient is `2(p - t) / n`.
pub fn mse_loss(pred: &Spectrum, target: &Spectrum) -> Result<(f32, Spectrum)> {
    pred.check_same_shape(target)?;
    let n = pred.data.len() as f32;

    let mut value = 0.0;
    let mut grad = pred.data.clone();
    for (g, &t) in grad.iter_mut().zip(target.data.iter()) {
        let diff = *g - t;
        value += diff * diff;
        *g = 2.0 * diff / n;
    }
    Ok((value / n, Spectrum::new(grad)?))
}

/// Mean cross-entropy against hard labels.
///
/// Gradient at the logits is `(softmax - onehot) / batch`.
pub fn cross_entropy_loss(logits: &Array2<f32>, labels: &[usize]) -> Result<(f32, Array2<f32>)> {
    let (batch, n_classes) = logits.dim();
    if labels.len() != batch {
        return Err(Error::Shape { expected: vec![batch], actual: vec![labels.len()] });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(Error::Dataset(format!(
            "label {bad} is outside the class range 0..{n_classes}"
        )));
    }

    let mut grad = softmax_2d(logits);
    let mut value = 0.0;
    for (b, &label) in labels.iter().enumerate() {
        value -= grad[[b, label]].max(1e-12).ln();
        grad[[b, label]] -= 1.0;
    }
    grad.mapv_inplace(|g| g / batch as f32);
    Ok((value / batch as f32, grad))
}

/// Mean cross-entropy of student logits against the teacher's softmax.
///
/// Gradient at the student logits is
/// `(softmax(student) - softmax(teacher)) / batch`.
pub fn soft_cross_entropy_loss(
    student_logits: &Array2<f32>,
    teacher_logits: &Array2<f32>,
) -> Result<(f32, Array2<f32>)> {
    if student_logits.dim() != teacher_logits.dim() {
        return Err(Error::Shape {
            expected: vec![teacher_logits.dim().0, teacher_logits.dim().1],
            actual: vec![student_logits.dim().0, student_logits.dim().1],
        });
    }
    let batch = student_logits.dim().0 as f32;

    let student_probs = softmax_2d(student_logits);
    let teacher_probs = softmax_2d(teacher_logits);

    let mut value = 0.0;
    for (s, t) in student_probs.iter().zip(teacher_probs.iter()) {
        value -= t * s.max(1e-12).ln();
    }

    let grad = (&student_probs - &teacher_probs) / batch;
    Ok((value / batch, grad))
}
