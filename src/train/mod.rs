//! Training orchestrators
//!
//! Two training modes share one loop shape: draw a paired batch, run the
//! spectral transform, forward the model pair, combine weighted loss
//! terms, backpropagate analytically, and step a single Adam instance
//! over the combined parameter list. `DirectTrainer` fits the
//! full-capacity pair from scratch; `DistillTrainer` fits the reduced
//! pair against a frozen direct-trained teacher.

mod direct;
mod distill;
pub mod loss;

pub use direct::DirectTrainer;
pub use distill::DistillTrainer;

use crate::config::PipelineConfig;
use crate::spectral::Spectrum;

/// Weighted loss terms of one training step.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossBreakdown {
    /// Weighted spectrum reconstruction (MSE) term.
    pub spectrum: f32,
    /// Weighted supervised classification (CE) term.
    pub class: f32,
    /// Weighted student-vs-teacher reconstruction term.
    pub distill_spectrum: f32,
    /// Weighted soft-label classification term.
    pub distill_class: f32,
}

impl LossBreakdown {
    /// Sum of all weighted terms.
    pub fn total(&self) -> f32 {
        self.spectrum + self.class + self.distill_spectrum + self.distill_class
    }
}

/// Summary returned by a completed training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    /// Iterations executed.
    pub iterations: u64,
    /// Loss breakdown of the final step.
    pub final_loss: LossBreakdown,
}

/// Export a diagnostic triptych; failures are logged, never fatal.
pub(crate) fn export_samples(
    config: &PipelineConfig,
    role: &str,
    iteration: u64,
    raw: &Spectrum,
    fake: &Spectrum,
    real: &Spectrum,
) {
    let path = config.sample_dir.join(format!("{role}-iter-{iteration:07}.png"));
    if let Err(err) = crate::render::save_triptych(raw, fake, real, 0, &path) {
        println!("  warning: sample export failed: {err}");
    }
}
