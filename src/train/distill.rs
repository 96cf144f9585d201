//! Distillation training of the student pair against a frozen teacher

use super::{loss, LossBreakdown, TrainReport};
use crate::checkpoint::{CheckpointMeta, CheckpointStore, Role, SnapshotRef};
use crate::config::PipelineConfig;
use crate::dataset::{verify_pairing, BatchSource, PairedCyclicLoader, WaveformBatch};
use crate::error::{Error, Result};
use crate::model::{Classifier, LinearClassifier, MaskTranslator, ModelTier, Translator};
use crate::optim::{Adam, Optimizer};
use crate::spectral::{SpectralConfig, SpectralTransform, Spectrum};
use crate::tensor::Tensor;

/// Trains the student-tier pair against a frozen direct-trained teacher.
///
/// The teacher pair is restored exactly from the latest direct snapshot.
/// The student translator is seeded through a non-strict load of the
/// teacher state (the shared leading layers transplant, the rest keep
/// their fresh initialization) and the student classifier starts as an
/// exact copy of the teacher's.
#[derive(Debug)]
pub struct DistillTrainer<'a> {
    config: &'a PipelineConfig,
    transform: SpectralTransform,
    teacher_translator: MaskTranslator,
    teacher_classifier: LinearClassifier,
    student_translator: MaskTranslator,
    student_classifier: LinearClassifier,
    optimizer: Adam,
    store: CheckpointStore,
}

impl<'a> DistillTrainer<'a> {
    /// Build a trainer, restoring the teacher from the latest direct
    /// snapshot under the configured checkpoint directory.
    pub fn new(config: &'a PipelineConfig, sample_len: usize, seed: u64) -> Result<Self> {
        let frames = config.frames_for(sample_len);
        let store = CheckpointStore::new(&config.checkpoint_dir);
        let snapshot = store.load_pair(Role::Direct, SnapshotRef::Latest)?;

        let mut teacher_translator =
            MaskTranslator::new(ModelTier::Teacher, config.n_fft, frames, seed);
        let report = teacher_translator.load_state_dict(&snapshot.translator);
        if !report.is_exact() {
            return Err(Error::checkpoint(
                &config.checkpoint_dir,
                format!("teacher translator restore is not exact: {}", report.summary()),
            ));
        }

        let mut teacher_classifier = LinearClassifier::new(
            config.n_classes,
            config.n_fft,
            frames,
            seed.wrapping_add(1),
        );
        let report = teacher_classifier.load_state_dict(&snapshot.classifier);
        if !report.is_exact() {
            return Err(Error::checkpoint(
                &config.checkpoint_dir,
                format!("teacher classifier restore is not exact: {}", report.summary()),
            ));
        }

        let mut student_translator =
            MaskTranslator::new(ModelTier::Student, config.n_fft, frames, seed.wrapping_add(2));
        let report = student_translator.load_state_dict(&snapshot.translator);
        println!("Seeding student translator: {}", report.summary());

        let student_classifier = teacher_classifier.clone_detached();

        Ok(Self {
            config,
            transform: SpectralTransform::new(SpectralConfig {
                n_fft: config.n_fft,
                hop_length: config.hop_length,
                win_length: config.win_length,
            }),
            teacher_translator,
            teacher_classifier,
            student_translator,
            student_classifier,
            optimizer: Adam::new(config.lr, config.beta1, config.beta2, 1e-8),
            store,
        })
    }

    /// Trained student pair.
    pub fn models(&self) -> (&MaskTranslator, &LinearClassifier) {
        (&self.student_translator, &self.student_classifier)
    }

    /// Run the full distillation loop over the paired domains.
    pub fn run(&mut self, x: &dyn BatchSource, y: &dyn BatchSource) -> Result<TrainReport> {
        let mut loader = PairedCyclicLoader::new(x, y)?;
        println!(
            "Distilling student model: {} iterations, {} batches/epoch",
            self.config.train_iters,
            loader.epoch_length()
        );

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
                    "  [student] iter {iteration:>6}/{} | spectrum {:.6} | class {:.6} | d-spectrum {:.6} | d-class {:.6} | total {:.6}",
                    self.config.train_iters,
                    last.spectrum,
                    last.class,
                    last.distill_spectrum,
                    last.distill_class,
                    last.total()
                );
            }
            if !self.config.no_samples && iteration % self.config.sample_every == 0 {
                let fake = self.student_translator.forward(&fixed_x)?;
                super::export_samples(self.config, "student", iteration, &fixed_x, &fake, &fixed_y);
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

    /// One optimization step on a paired batch. The teacher only runs
    /// forward; its parameters never receive gradients.
    pub fn step(&mut self, batch_x: &WaveformBatch, batch_y: &WaveformBatch) -> Result<LossBreakdown> {
        let spec_x = self.transform.forward(batch_x)?;
        let spec_y = self.transform.forward(batch_y)?;
        let labels = batch_x.labels()?;

        let teacher_fake = self.teacher_translator.forward(&spec_x)?;
        let teacher_logits = self.teacher_classifier.forward(&teacher_fake)?;

        let student_fake = self.student_translator.forward(&spec_x)?;
        let student_logits = self.student_classifier.forward(&student_fake)?;

        let (mse_value, mse_grad) = loss::mse_loss(&student_fake, &spec_y)?;
        let (ce_value, ce_grad) = loss::cross_entropy_loss(&student_logits, &labels)?;
        let (dmse_value, dmse_grad) = loss::mse_loss(&student_fake, &teacher_fake)?;
        // Computed every step even when its weight is zero, so the log
        // shows how far the student's predictions drift from the teacher's.
        let (dce_value, dce_grad) =
            loss::soft_cross_entropy_loss(&student_logits, &teacher_logits)?;

        let mut params = self.params();
        self.optimizer.zero_grad(&mut params);

        let logit_grad = ce_grad.mapv(|g| g * self.config.lambda_class)
            + dce_grad.mapv(|g| g * self.config.lambda_distill_class);
        let class_grad = self.student_classifier.backward(&student_fake, &logit_grad)?;

        let mut grad = mse_grad.data;
        grad.mapv_inplace(|g| g * self.config.lambda_spectrum);
        grad.scaled_add(self.config.lambda_distill_spectrum, &dmse_grad.data);
        grad += &class_grad.data;
        self.student_translator.backward(&spec_x, &Spectrum::new(grad)?)?;

        self.optimizer.step(&mut params);

        Ok(LossBreakdown {
            spectrum: self.config.lambda_spectrum * mse_value,
            class: self.config.lambda_class * ce_value,
            distill_spectrum: self.config.lambda_distill_spectrum * dmse_value,
            distill_class: self.config.lambda_distill_class * dce_value,
        })
    }

    fn params(&self) -> Vec<Tensor> {
        let mut params = self.student_translator.params();
        params.extend(self.student_classifier.params());
        params
    }

    fn save_checkpoint(&self, iteration: u64) -> Result<std::path::PathBuf> {
        let meta = CheckpointMeta {
            role: Role::Student.as_str().to_string(),
            iteration,
            tier: self.student_translator.tier().as_str().to_string(),
            n_classes: self.student_classifier.n_classes(),
        };
        self.store.save_pair(
            Role::Student,
            iteration,
            &self.student_translator.state_dict(),
            &self.student_classifier.state_dict(),
            &meta,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemorySource;
    use crate::train::DirectTrainer;
    use num_complex::Complex32;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            n_fft: 16,
            hop_length: 8,
            win_length: 16,
            batch_size: 4,
            train_iters: 40,
            log_every: 20,
            sample_every: 1000,
            checkpoint_every: 40,
            lambda_spectrum: 1.0,
            lambda_class: 1.0,
            lambda_distill_spectrum: 1.0,
            lambda_distill_class: 0.0,
            lr: 0.01,
            n_classes: 4,
            no_samples: true,
            checkpoint_dir: dir.path().join("ckpt"),
            sample_dir: dir.path().join("samples"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        }
    }

    fn paired_sources(n_classes: usize) -> (InMemorySource, InMemorySource) {
        let make = |noise: f32| {
            let samples: Vec<Vec<Complex32>> = (0..4)
                .map(|i| {
                    (0..32)
                        .map(|k| {
                            let phase = 0.25 * (i + 1) as f32 * k as f32;
                            Complex32::new(
                                phase.cos() + noise * ((k * 3 + i) % 7) as f32 * 0.05,
                                phase.sin(),
                            )
                        })
                        .collect()
                })
                .collect();
            let ids =
                (0..4).map(|i| format!("1.0_-10_4_125000_{i}_{}", i % n_classes)).collect();
            InMemorySource::new(vec![WaveformBatch::new(samples, ids).unwrap()])
        };
        (make(1.0), make(0.0))
    }

    fn train_direct(config: &PipelineConfig, x: &InMemorySource, y: &InMemorySource) {
        let mut trainer = DirectTrainer::new(config, 32, 42);
        trainer.run(x, y).unwrap();
    }

    #[test]
    fn test_new_requires_direct_checkpoint() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let err = DistillTrainer::new(&config, 32, 1).unwrap_err();
        assert_eq!(err.stage(), "checkpoint");
    }

    #[test]
    fn test_student_starts_from_teacher_classifier() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        let trainer = DistillTrainer::new(&config, 32, 1).unwrap();
        assert_eq!(
            trainer.student_classifier.state_dict(),
            trainer.teacher_classifier.state_dict()
        );
        assert_eq!(trainer.models().0.tier(), ModelTier::Student);
    }

    #[test]
    fn test_student_translator_inherits_shared_layer() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        let trainer = DistillTrainer::new(&config, 32, 1).unwrap();
        let teacher_state = trainer.teacher_translator.state_dict();
        let student_state = trainer.student_translator.state_dict();
        assert_eq!(
            student_state.get("layers.0.weight").unwrap(),
            teacher_state.get("layers.0.weight").unwrap()
        );
    }

    #[test]
    fn test_fresh_trainer_predictions_match_snapshot_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        let trainer = DistillTrainer::new(&config, 32, 1).unwrap();

        // Restore the same snapshot into an independently seeded pair.
        let store = CheckpointStore::new(&config.checkpoint_dir);
        let snapshot = store.load_pair(Role::Direct, SnapshotRef::Latest).unwrap();
        let frames = config.frames_for(32);
        let mut translator = MaskTranslator::new(ModelTier::Teacher, config.n_fft, frames, 777);
        assert!(translator.load_state_dict(&snapshot.translator).is_exact());
        let mut classifier =
            LinearClassifier::new(config.n_classes, config.n_fft, frames, 778);
        assert!(classifier.load_state_dict(&snapshot.classifier).is_exact());

        let transform = SpectralTransform::new(SpectralConfig {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            win_length: config.win_length,
        });
        let spec = transform.forward(x.batch(0)).unwrap();
        let reconstructed = translator.forward(&spec).unwrap();
        let reference = classifier.forward(&reconstructed).unwrap();

        // Before any step, the trainer's teacher pair reproduces the
        // snapshot's predictions exactly, and the warm-started student
        // classifier agrees bit for bit on the same input.
        let teacher_out = trainer.teacher_translator.forward(&spec).unwrap();
        assert_eq!(teacher_out.data, reconstructed.data);
        assert_eq!(trainer.teacher_classifier.forward(&teacher_out).unwrap(), reference);
        assert_eq!(trainer.student_classifier.forward(&teacher_out).unwrap(), reference);
    }

    #[test]
    fn test_run_trains_student_and_freezes_teacher() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        let mut trainer = DistillTrainer::new(&config, 32, 1).unwrap();
        let teacher_before = trainer.teacher_translator.state_dict();
        let student_before = trainer.student_translator.state_dict();

        let report = trainer.run(&x, &y).unwrap();
        assert_eq!(report.iterations, 40);

        assert_eq!(trainer.teacher_translator.state_dict(), teacher_before);
        assert_ne!(trainer.student_translator.state_dict(), student_before);

        let store = CheckpointStore::new(&config.checkpoint_dir);
        let snapshot = store.load_pair(Role::Student, SnapshotRef::Latest).unwrap();
        assert_eq!(snapshot.meta.tier, "student");
    }

    #[test]
    fn test_step_reads_labels_from_noisy_domain() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        // Labels outside the class range on the reference side must not
        // reach the classification loss.
        let base = x.batch(0);
        let bad_ids = (0..base.len()).map(|i| format!("1.0_-10_4_125000_{i}_99")).collect();
        let bad_y = WaveformBatch::new(base.samples.clone(), bad_ids).unwrap();

        let mut trainer = DistillTrainer::new(&config, 32, 1).unwrap();
        trainer.step(base, &bad_y).unwrap();
    }

    #[test]
    fn test_zero_weight_distill_class_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let (x, y) = paired_sources(config.n_classes);
        train_direct(&config, &x, &y);

        let mut trainer = DistillTrainer::new(&config, 32, 1).unwrap();
        let loss = trainer.step(x.batch(0), y.batch(0)).unwrap();
        assert_eq!(loss.distill_class, 0.0);
        assert!(loss.distill_spectrum >= 0.0);
    }
}
