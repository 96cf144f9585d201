//! Linear symbol classifier
//!
//! A dense layer over the flattened spectrum: logits = W·x + b. Both
//! capacity tiers share this head; in distillation the student's copy is
//! warm-started as an exact clone of the teacher's.

use super::state::{apply_state, LoadReport, StateDict};
use super::Classifier;
use crate::error::Result;
use crate::spectral::Spectrum;
use crate::tensor::Tensor;
use ndarray::{Array1, Array2, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dense classifier over the flattened spectrum.
#[derive(Debug)]
pub struct LinearClassifier {
    n_classes: usize,
    input_width: usize,
    weight: Tensor, // [n_classes * input_width]
    bias: Tensor,   // [n_classes]
}

impl LinearClassifier {
    /// Build a classifier for the given spectrum geometry, seeded
    /// deterministically.
    pub fn new(n_classes: usize, freq: usize, frames: usize, seed: u64) -> Self {
        let input_width = 2 * freq * frames;
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = (1.0 / input_width as f32).sqrt();
        let weight: Vec<f32> =
            (0..n_classes * input_width).map(|_| scale * 2.0 * (rng.gen::<f32>() - 0.5)).collect();
        let bias = vec![0.0; n_classes];
        Self {
            n_classes,
            input_width,
            weight: Tensor::from_vec(weight, true),
            bias: Tensor::from_vec(bias, true),
        }
    }

    /// Detached copy: same architecture and values, fresh storage.
    pub fn clone_detached(&self) -> Self {
        Self {
            n_classes: self.n_classes,
            input_width: self.input_width,
            weight: Tensor::from_vec(self.weight.to_vec(), true),
            bias: Tensor::from_vec(self.bias.to_vec(), true),
        }
    }

    fn named_params(&self) -> Vec<(String, Tensor, Vec<usize>)> {
        vec![
            (
                "fc.weight".to_string(),
                self.weight.clone(),
                vec![self.n_classes, self.input_width],
            ),
            ("fc.bias".to_string(), self.bias.clone(), vec![self.n_classes]),
        ]
    }

    fn check_input(&self, input: &Spectrum) -> Result<()> {
        if input.sample_width() != self.input_width {
            return Err(crate::error::Error::Shape {
                expected: vec![self.input_width],
                actual: vec![input.sample_width()],
            });
        }
        Ok(())
    }
}

impl Classifier for LinearClassifier {
    fn forward(&self, input: &Spectrum) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let batch = input.batch_size();
        let w = self.weight.data();
        let b = self.bias.data();

        let mut logits = Array2::zeros((batch, self.n_classes));
        for (s, sample) in input.data.outer_iter().enumerate() {
            // Standard-layout iteration flattens (channel, freq, frame).
            let x: Vec<f32> = sample.iter().copied().collect();
            for k in 0..self.n_classes {
                let row = &w.as_slice().expect("weight is contiguous")
                    [k * self.input_width..(k + 1) * self.input_width];
                let mut acc = b[k];
                for (wv, xv) in row.iter().zip(x.iter()) {
                    acc += wv * xv;
                }
                logits[[s, k]] = acc;
            }
        }
        Ok(logits)
    }

    fn backward(&mut self, input: &Spectrum, grad_logits: &Array2<f32>) -> Result<Spectrum> {
        self.check_input(input)?;
        let batch = input.batch_size();
        if grad_logits.shape() != [batch, self.n_classes] {
            return Err(crate::error::Error::Shape {
                expected: vec![batch, self.n_classes],
                actual: grad_logits.shape().to_vec(),
            });
        }

        let mut grad_w = Array1::<f32>::zeros(self.weight.len());
        let mut grad_b = Array1::<f32>::zeros(self.n_classes);
        let mut grad_in: Array4<f32> = Array4::zeros(input.data.raw_dim());

        {
            let w = self.weight.data();
            let w_slice = w.as_slice().expect("weight is contiguous");
            let gw = grad_w.as_slice_mut().expect("grad buffer is contiguous");

            for (s, sample) in input.data.outer_iter().enumerate() {
                let x: Vec<f32> = sample.iter().copied().collect();
                let mut gx = vec![0.0f32; self.input_width];
                for k in 0..self.n_classes {
                    let g = grad_logits[[s, k]];
                    grad_b[k] += g;
                    let row = &w_slice[k * self.input_width..(k + 1) * self.input_width];
                    let grow = &mut gw[k * self.input_width..(k + 1) * self.input_width];
                    for d in 0..self.input_width {
                        grow[d] += g * x[d];
                        gx[d] += g * row[d];
                    }
                }
                let mut sample_grad = grad_in.index_axis_mut(ndarray::Axis(0), s);
                for (slot, gv) in sample_grad.iter_mut().zip(gx.iter()) {
                    *slot = *gv;
                }
            }
        }

        self.weight.accumulate_grad(&grad_w);
        self.bias.accumulate_grad(&grad_b);
        Spectrum::new(grad_in)
    }

    fn params(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn state_dict(&self) -> StateDict {
        let mut dict = StateDict::new();
        for (name, tensor, shape) in self.named_params() {
            dict.insert(name, shape, tensor.to_vec());
        }
        dict
    }

    fn load_state_dict(&mut self, dict: &StateDict) -> LoadReport {
        apply_state(&self.named_params(), dict)
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}
