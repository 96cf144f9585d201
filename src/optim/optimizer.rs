//! Optimizer trait

use crate::tensor::Tensor;

/// Trait for optimization algorithms.
///
/// One optimizer instance owns the update of a fixed parameter list; in
/// this pipeline that list is the combined parameters of a translation
/// model and a classifier, updated jointly.
pub trait Optimizer {
    /// Perform a single optimization step over the parameters.
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients.
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate.
    fn lr(&self) -> f32;

    /// Set learning rate.
    fn set_lr(&mut self, lr: f32);
}
