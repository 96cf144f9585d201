//! Direct training of the full-capacity model pair

use super::{loss, LossBreakdown, TrainReport};
use crate::checkpoint::{CheckpointMeta, CheckpointStore, Role};
use crate::config::PipelineConfig;
use crate::dataset::{verify_pairing, BatchSource, PairedCyclicLoader, WaveformBatch};
use crate::error::Result;
use crate::model::{Classifier, LinearClassifier, MaskTranslator, ModelTier, Translator};
use crate::optim::{Adam, Optimizer};
use crate::spectral::{SpectralConfig, SpectralTransform, Spectrum};
use crate::tensor::Tensor;

/// Trains the teacher-tier translator and classifier jointly from scratch.
pub struct DirectTrainer<'a> {
    config: &'a PipelineConfig,
    transform: SpectralTransform,
    translator: MaskTranslator,
    classifier: LinearClassifier,
    optimizer: Adam,
    store: CheckpointStore,
}

impl<'a> DirectTrainer<'a> {
    /// Build a trainer for waveforms of `sample_len` samples.
    pub fn new(config: &'a PipelineConfig, sample_len: usize, seed: u64) -> Self {
        let frames = config.frames_for(sample_len);
        let transform = SpectralTransform::new(SpectralConfig {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            win_length: config.win_length,
        });
        Self {
            config,
            transform,
            translator: MaskTranslator::new(ModelTier::Teacher, config.n_fft, frames, seed),
            classifier: LinearClassifier::new(
                config.n_classes,
                config.n_fft,
                frames,
                seed.wrapping_add(1),
            ),
            optimizer: Adam::new(config.lr, config.beta1, config.beta2, 1e-8),
            store: CheckpointStore::new(&config.checkpoint_dir),
        }
    }

    /// Trained model pair.
    pub fn models(&self) -> (&MaskTranslator, &LinearClassifier) {
        (&self.translator, &self.classifier)
    }

    /// Resume the pair from an existing direct snapshot. The restore
    /// must be exact; a partial match means the architecture changed.
    pub fn resume(&mut self, which: crate::checkpoint::SnapshotRef) -> Result<u64> {
        let snapshot = self.store.load_pair(Role::Direct, which)?;
        for (name, report) in [
            ("translator", self.translator.load_state_dict(&snapshot.translator)),
            ("classifier", self.classifier.load_state_dict(&snapshot.classifier)),
        ] {
            if !report.is_exact() {
                return Err(crate::error::Error::checkpoint(
                    &self.config.checkpoint_dir,
                    format!("{name} restore is not exact: {}", report.summary()),
                ));
            }
        }
        println!("Resumed direct pair from iteration {}", snapshot.meta.iteration);
        Ok(snapshot.meta.iteration)
    }

    /// Run the full training loop over the paired domains.
    pub fn run(&mut self, x: &dyn BatchSource, y: &dyn BatchSource) -> Result<TrainReport> {
        let mut loader = PairedCyclicLoader::new(x, y)?;
        println!(
            "Training direct model: {} iterations, {} batches/epoch",
            self.config.train_iters,
            loader.epoch_length()
        );

        // Fixed diagnostic pair, reused for every sample export so image
        // sequences show the model evolving on constant input.
        let (diag_x, diag_y) = (x.batch(0), y.batch(0));
        verify_pairing(diag_x, diag_y, 0)?;
        let fixed_x = self.transform.forward(diag_x)?;
        let fixed_y = self.transform.forward(diag_y)?;

        let mut last = LossBreakdown::default();
        for iteration in 1..=self.config.train_iters {
            let (batch_x, batch_y) = loader.draw(iteration)?;
            last = self.step(batch_x, batch_y)?;

            if iteration % self.config.log_every == 0 {
                println!(
                    "  [direct] iter {iteration:>6}/{} | spectrum {:.6} | class {:.6} | total {:.6}",
                    self.config.train_iters,
                    last.spectrum,
                    last.class,
                    last.total()
                );
            }
            if !self.config.no_samples && iteration % self.config.sample_every == 0 {
                let fake = self.translator.forward(&fixed_x)?;
                super::export_samples(self.config, "direct", iteration, &fixed_x, &fake, &fixed_y);
            }
            if iteration % self.config.checkpoint_every == 0
                || iteration == self.config.train_iters
            {
                let dir = self.save_checkpoint(iteration)?;
                println!("  ✓ checkpoint written to {}", dir.display());
            }
        }

        Ok(TrainReport { iterations: self.config.train_iters, final_loss: last })
    }

    /// One optimization step on a paired batch.
    pub fn step(&mut self, batch_x: &WaveformBatch, batch_y: &WaveformBatch) -> Result<LossBreakdown> {
        let spec_x = self.transform.forward(batch_x)?;
        let spec_y = self.transform.forward(batch_y)?;
        let labels = batch_x.labels()?;

        let fake = self.translator.forward(&spec_x)?;
        let (mse_value, mse_grad) = loss::mse_loss(&fake, &spec_y)?;
        let logits = self.classifier.forward(&fake)?;
        let (ce_value, ce_grad) = loss::cross_entropy_loss(&logits, &labels)?;

        let mut params = self.params();
        self.optimizer.zero_grad(&mut params);

        let scaled_logit_grad = ce_grad.mapv(|g| g * self.config.lambda_class);
        let class_grad = self.classifier.backward(&fake, &scaled_logit_grad)?;

        let mut grad = mse_grad.data;
        grad.mapv_inplace(|g| g * self.config.lambda_spectrum);
        grad += &class_grad.data;
        self.translator.backward(&spec_x, &Spectrum::new(grad)?)?;

        self.optimizer.step(&mut params);

        Ok(LossBreakdown {
            spectrum: self.config.lambda_spectrum * mse_value,
            class: self.config.lambda_class * ce_value,
            distill_spectrum: 0.0,
            distill_class: 0.0,
        })
    }

    fn params(&self) -> Vec<Tensor> {
        let mut params = self.translator.params();
        params.extend(self.classifier.params());
        params
    }

    fn save_checkpoint(&self, iteration: u64) -> Result<std::path::PathBuf> {
        let meta = CheckpointMeta {
            role: Role::Direct.as_str().to_string(),
            iteration,
            tier: self.translator.tier().as_str().to_string(),
            n_classes: self.classifier.n_classes(),
        };
        self.store.save_pair(
            Role::Direct,
            iteration,
            &self.translator.state_dict(),
            &self.classifier.state_dict(),
            &meta,
        )
    }
}
