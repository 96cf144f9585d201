//! Adam optimizer

use super::Optimizer;
use crate::tensor::Tensor;
use ndarray::Array1;

/// Adam optimizer with bias-corrected first and second moments.
///
/// Update rule:
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * g
/// v_t = β2 * v_{t-1} + (1 - β2) * g²
/// θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
/// ```
///
/// where `lr_t` folds the bias-correction factors into the learning rate.
#[derive(Debug)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<Array1<f32>>>,
    v: Vec<Option<Array1<f32>>>,
}

impl Adam {
    /// Create a new Adam optimizer.
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Adam with the conventional beta defaults.
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-8)
    }

    /// Optimizer step counter.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }

    fn ensure_moments(&mut self, params: &[Tensor]) {
        if self.m.is_empty() {
            self.m = params.iter().map(|_| None).collect();
            self.v = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_moments(params);
        self.t += 1;

        // Bias correction folded into the learning rate.
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));

        for (i, param) in params.iter_mut().enumerate() {
            let Some(grad) = param.grad() else { continue };

            if self.m[i].is_none() {
                self.m[i] = Some(Array1::zeros(grad.len()));
                self.v[i] = Some(Array1::zeros(grad.len()));
            }
            let m = self.m[i].as_mut().expect("first moment initialized above");
            let v = self.v[i].as_mut().expect("second moment initialized above");

            let mut data = param.data_mut();
            for (((d, g), m_i), v_i) in
                data.iter_mut().zip(grad.iter()).zip(m.iter_mut()).zip(v.iter_mut())
            {
                *m_i = self.beta1 * *m_i + (1.0 - self.beta1) * g;
                *v_i = self.beta2 * *v_i + (1.0 - self.beta2) * g * g;
                *d -= lr_t * *m_i / (v_i.sqrt() + self.epsilon);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_adam_reduces_quadratic_loss() {
        // Minimize f(x) = x² from x = 2.0; gradient is 2x.
        let param = Tensor::from_vec(vec![2.0], true);
        let mut opt = Adam::default_params(0.1);

        for _ in 0..200 {
            let x = param.data()[0];
            param.zero_grad();
            param.accumulate_grad(&arr1(&[2.0 * x]));
            opt.step(&mut [param.clone()]);
        }

        assert!(param.data()[0].abs() < 0.05, "x should approach 0, got {}", param.data()[0]);
    }

    #[test]
    fn test_adam_skips_params_without_grad() {
        let param = Tensor::from_vec(vec![1.0, 1.0], true);
        let mut opt = Adam::default_params(0.1);

        opt.step(&mut [param.clone()]);
        assert_eq!(param.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_adam_step_count() {
        let param = Tensor::zeros(1, true);
        let mut opt = Adam::default_params(0.01);
        assert_eq!(opt.step_count(), 0);

        param.accumulate_grad(&arr1(&[1.0]));
        opt.step(&mut [param.clone()]);
        opt.step(&mut [param]);
        assert_eq!(opt.step_count(), 2);
    }

    #[test]
    fn test_set_lr() {
        let mut opt = Adam::default_params(0.001);
        assert_eq!(opt.lr(), 0.001);
        opt.set_lr(0.01);
        assert_eq!(opt.lr(), 0.01);
    }

    #[test]
    fn test_first_step_moves_by_roughly_lr() {
        // With bias correction, the first Adam step is ≈ lr in magnitude.
        let param = Tensor::from_vec(vec![1.0], true);
        let mut opt = Adam::default_params(0.1);
        param.accumulate_grad(&arr1(&[3.0]));
        opt.step(&mut [param.clone()]);

        let moved = (1.0 - param.data()[0]).abs();
        assert!((moved - 0.1).abs() < 1e-3, "first step should be ≈ lr, moved {moved}");
    }
}
