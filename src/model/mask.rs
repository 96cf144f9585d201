//! Mask-based translation model
//!
//! A stack of per-bin affine mask layers: each layer scales and shifts
//! every (channel, frequency, frame) cell of the spectrum independently.
//! The teacher tier stacks two layers; the student tier keeps only the
//! first, so a teacher snapshot seeds the student's `layers.0.*` keys
//! through the non-strict load while `layers.1.*` fall away.

use super::state::{apply_state, LoadReport, StateDict};
use super::{ModelTier, Translator};
use crate::error::Result;
use crate::spectral::Spectrum;
use crate::tensor::Tensor;
use ndarray::{Array1, Array4, ArrayView3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug)]
struct MaskLayer {
    weight: Tensor,
    bias: Tensor,
}

impl MaskLayer {
    fn init(cells: usize, rng: &mut StdRng) -> Self {
        // Start near identity so early reconstructions resemble the input.
        let weight: Vec<f32> = (0..cells).map(|_| 1.0 + 0.04 * (rng.gen::<f32>() - 0.5)).collect();
        let bias: Vec<f32> = (0..cells).map(|_| 0.02 * (rng.gen::<f32>() - 0.5)).collect();
        Self { weight: Tensor::from_vec(weight, true), bias: Tensor::from_vec(bias, true) }
    }

    fn forward(&self, input: &Array4<f32>, freq: usize, frames: usize) -> Array4<f32> {
        let w = self.weight.data();
        let b = self.bias.data();
        let w3 = view3(&w, freq, frames);
        let b3 = view3(&b, freq, frames);

        let mut out = input.clone();
        for mut sample in out.outer_iter_mut() {
            sample.zip_mut_with(&w3, |y, &wv| *y *= wv);
            sample.zip_mut_with(&b3, |y, &bv| *y += bv);
        }
        out
    }

    /// Accumulate parameter gradients; returns the gradient w.r.t. the
    /// layer input.
    fn backward(&mut self, input: &Array4<f32>, grad_out: &Array4<f32>) -> Array4<f32> {
        let cells = self.weight.len();
        let mut grad_w = Array1::<f32>::zeros(cells);
        let mut grad_b = Array1::<f32>::zeros(cells);

        for (sample_in, sample_grad) in input.outer_iter().zip(grad_out.outer_iter()) {
            for ((gw, gb), (&x, &g)) in grad_w
                .iter_mut()
                .zip(grad_b.iter_mut())
                .zip(sample_in.iter().zip(sample_grad.iter()))
            {
                *gw += g * x;
                *gb += g;
            }
        }

        self.weight.accumulate_grad(&grad_w);
        self.bias.accumulate_grad(&grad_b);

        let w = self.weight.data();
        let mut grad_in = grad_out.clone();
        for mut sample in grad_in.outer_iter_mut() {
            for (g, &wv) in sample.iter_mut().zip(w.iter()) {
                *g *= wv;
            }
        }
        grad_in
    }
}

fn view3(flat: &Array1<f32>, freq: usize, frames: usize) -> ArrayView3<'_, f32> {
    flat.view().into_shape_with_order((2, freq, frames)).expect("mask geometry is fixed")
}

/// Per-bin affine mask translator.
#[derive(Debug)]
pub struct MaskTranslator {
    freq: usize,
    frames: usize,
    layers: Vec<MaskLayer>,
    tier: ModelTier,
}

impl MaskTranslator {
    /// Build a translator for the given spectrum geometry, seeded
    /// deterministically.
    pub fn new(tier: ModelTier, freq: usize, frames: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells = 2 * freq * frames;
        let layers = (0..tier.mask_layers()).map(|_| MaskLayer::init(cells, &mut rng)).collect();
        Self { freq, frames, layers, tier }
    }

    /// Spectrum geometry this model was built for.
    pub fn geometry(&self) -> (usize, usize) {
        (self.freq, self.frames)
    }

    fn named_params(&self) -> Vec<(String, Tensor, Vec<usize>)> {
        let shape = vec![2, self.freq, self.frames];
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                [
                    (format!("layers.{i}.weight"), layer.weight.clone(), shape.clone()),
                    (format!("layers.{i}.bias"), layer.bias.clone(), shape.clone()),
                ]
            })
            .collect()
    }

    fn check_input(&self, input: &Spectrum) -> Result<()> {
        let expected = Spectrum::zeros(input.batch_size(), self.freq, self.frames);
        expected.check_same_shape(input)
    }
}

impl Translator for MaskTranslator {
    fn forward(&self, input: &Spectrum) -> Result<Spectrum> {
        self.check_input(input)?;
        let mut data = input.data.clone();
        for layer in &self.layers {
            data = layer.forward(&data, self.freq, self.frames);
        }
        Spectrum::new(data)
    }

    fn backward(&mut self, input: &Spectrum, grad_output: &Spectrum) -> Result<()> {
        self.check_input(input)?;
        input.check_same_shape(grad_output)?;

        // Recompute layer activations; the stacks are shallow enough
        // that recomputation beats caching in the forward pass.
        let mut activations = vec![input.data.clone()];
        for layer in &self.layers {
            let next = layer.forward(activations.last().expect("non-empty"), self.freq, self.frames);
            activations.push(next);
        }

        let mut grad = grad_output.data.clone();
        for (layer, act_in) in self.layers.iter_mut().zip(activations.iter()).rev() {
            grad = layer.backward(act_in, &grad);
        }
        Ok(())
    }

    fn params(&self) -> Vec<Tensor> {
        self.named_params().into_iter().map(|(_, t, _)| t).collect()
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

    fn tier(&self) -> ModelTier {
        self.tier
    }
}
