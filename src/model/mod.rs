//! Model pair abstraction
//!
//! The pipeline trains a pair of cooperating models: a translation model
//! that maps a noisy spectrum to a predicted clean spectrum, and a
//! classifier that maps a spectrum to symbol scores. Their internals are
//! deliberately minimal; the traits here are the seam the orchestrators,
//! checkpoint store, and evaluation harness work against.
//!
//! Both models exist in two capacity tiers. The teacher-tier translator
//! is deeper than the student tier, and the shared leading layers give
//! the non-strict checkpoint load a real key intersection to transplant.

mod classifier;
mod mask;
mod state;

pub use classifier::LinearClassifier;
pub use mask::MaskTranslator;
pub use state::{apply_state, LoadReport, StateDict, StateEntry};

use crate::error::Result;
use crate::spectral::Spectrum;
use crate::tensor::Tensor;
use ndarray::Array2;

/// Capacity tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Full-capacity model.
    Teacher,
    /// Reduced-capacity model distilled from a teacher.
    Student,
}

impl ModelTier {
    /// Mask layer count for a translator of this tier.
    pub fn mask_layers(self) -> usize {
        match self {
            Self::Teacher => 2,
            Self::Student => 1,
        }
    }

    /// Name used in checkpoint metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }

    /// Parse a checkpoint metadata tier name.
    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }
}

/// Translation model: input spectrum → predicted clean spectrum.
pub trait Translator {
    /// Forward pass.
    fn forward(&self, input: &Spectrum) -> Result<Spectrum>;

    /// Accumulate parameter gradients for `grad_output` at `input`.
    fn backward(&mut self, input: &Spectrum, grad_output: &Spectrum) -> Result<()>;

    /// Shared handles to every trainable parameter.
    fn params(&self) -> Vec<Tensor>;

    /// Snapshot of the parameter state.
    fn state_dict(&self) -> StateDict;

    /// Non-strict load: apply the key-intersected subset of `dict`.
    fn load_state_dict(&mut self, dict: &StateDict) -> LoadReport;

    /// Capacity tier.
    fn tier(&self) -> ModelTier;
}

/// Classifier model: spectrum → per-sample label scores.
pub trait Classifier {
    /// Forward pass; returns logits `[batch, n_classes]`.
    fn forward(&self, input: &Spectrum) -> Result<Array2<f32>>;

    /// Accumulate parameter gradients and return the gradient with
    /// respect to the input spectrum, so upstream models can chain it.
    fn backward(&mut self, input: &Spectrum, grad_logits: &Array2<f32>) -> Result<Spectrum>;

    /// Shared handles to every trainable parameter.
    fn params(&self) -> Vec<Tensor>;

    /// Snapshot of the parameter state.
    fn state_dict(&self) -> StateDict;

    /// Non-strict load: apply the key-intersected subset of `dict`.
    fn load_state_dict(&mut self, dict: &StateDict) -> LoadReport;

    /// Size of the label set.
    fn n_classes(&self) -> usize;
}

/// Argmax label per sample from a logits matrix.
pub fn predicted_labels(logits: &Array2<f32>) -> Vec<usize> {
    logits
        .rows()
        .into_iter()
        .map(|row| {
            // First strict maximum, so ties resolve to the lowest label.
            row.iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                })
                .0
        })
        .collect()
}
