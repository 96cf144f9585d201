//! SNR-stratified evaluation harness
//!
//! Runs a trained model pair over a labeled noisy corpus and buckets
//! per-sample correctness by the SNR bin named in each identifier. The
//! harness never aborts on an individual bad sample: malformed ids and
//! out-of-list SNR values are reported and skipped. Results serialize to
//! two JSON artifacts, a metrics file (per-bin accuracy plus per-sample
//! audit rows) and a scores file (raw class score vectors grouped by
//! true label).

use crate::config::PipelineConfig;
use crate::dataset::{BatchSource, SampleMeta};
use crate::error::{Error, Result};
use crate::model::{predicted_labels, Classifier, Translator};
use crate::spectral::{SpectralConfig, SpectralTransform};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// How one evaluated sample was accounted for.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Counted in an SNR bin.
    Binned {
        /// Index into the configured SNR list.
        bin: usize,
        /// Whether the predicted label matched the true label.
        correct: bool,
    },
    /// Excluded from the accuracy matrix, with the reason recorded.
    Unbinned(String),
}

/// One audited prediction.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Full sample identifier.
    pub id: String,
    /// Code value from the identifier.
    pub code: f32,
    /// SNR bin value (dB) from the identifier.
    pub snr: i32,
    /// Capture instance.
    pub instance: u32,
    /// Model prediction.
    pub predicted: usize,
    /// True label.
    pub actual: usize,
}

/// A sample excluded from the accuracy matrix.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSample {
    /// Identifier as it appeared in the corpus.
    pub id: String,
    /// Why it was excluded.
    pub reason: String,
}

/// Aggregated evaluation results.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    /// Ordered SNR bins, matching `correct` and `total` by index.
    pub snr_list: Vec<i32>,
    /// Correct predictions per bin.
    pub correct: Vec<u64>,
    /// Evaluated samples per bin.
    pub total: Vec<u64>,
    /// Samples excluded from the matrix.
    pub skipped: Vec<SkippedSample>,
    /// Per-sample audit rows for binned samples.
    pub records: Vec<AuditRecord>,
    /// Raw per-class score vectors grouped by true label. Accumulated
    /// for every sample whose identifier parses, before the bin lookup,
    /// so SNR-unbinned samples still contribute.
    pub scores_by_label: BTreeMap<usize, Vec<Vec<f32>>>,
}

impl EvalReport {
    /// Per-bin accuracy; `None` for bins that saw no samples.
    pub fn accuracy(&self) -> Vec<Option<f32>> {
        self.correct
            .iter()
            .zip(self.total.iter())
            .map(|(&c, &t)| if t == 0 { None } else { Some(c as f32 / t as f32) })
            .collect()
    }

    /// Accuracy over every binned sample.
    pub fn overall_accuracy(&self) -> f32 {
        let total: u64 = self.total.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.correct.iter().sum::<u64>() as f32 / total as f32
    }

    /// Write the metrics and scores artifacts under the configured
    /// output directory, named from the artifact stem.
    pub fn save(&self, config: &PipelineConfig) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&config.output_dir)
            .map_err(|e| Error::io(format!("creating {}", config.output_dir.display()), e))?;

        let stem = config.artifact_stem();
        let metrics_path = config.output_dir.join(format!("{stem}_accuracy.json"));
        let scores_path = config.output_dir.join(format!("{stem}_scores.json"));

        #[derive(Serialize)]
        struct Metrics<'a> {
            snr_list: &'a [i32],
            correct: &'a [u64],
            total: &'a [u64],
            accuracy: Vec<Option<f32>>,
            skipped: &'a [SkippedSample],
            records: &'a [AuditRecord],
        }
        let metrics = Metrics {
            snr_list: &self.snr_list,
            correct: &self.correct,
            total: &self.total,
            accuracy: self.accuracy(),
            skipped: &self.skipped,
            records: &self.records,
        };

        let body = serde_json::to_string_pretty(&metrics)
            .map_err(|e| Error::Serialization(format!("encoding metrics: {e}")))?;
        fs::write(&metrics_path, body)
            .map_err(|e| Error::io(format!("writing {}", metrics_path.display()), e))?;

        let body = serde_json::to_string(&self.scores_by_label)
            .map_err(|e| Error::Serialization(format!("encoding scores: {e}")))?;
        fs::write(&scores_path, body)
            .map_err(|e| Error::io(format!("writing {}", scores_path.display()), e))?;

        Ok((metrics_path, scores_path))
    }
}

/// Evaluation driver.
pub struct Evaluator<'a> {
    config: &'a PipelineConfig,
    transform: SpectralTransform,
}

impl<'a> Evaluator<'a> {
    /// Build an evaluator for the configured spectral geometry.
    pub fn new(config: &'a PipelineConfig) -> Self {
        let transform = SpectralTransform::new(SpectralConfig {
            n_fft: config.n_fft,
            hop_length: config.hop_length,
            win_length: config.win_length,
        });
        Self { config, transform }
    }

    /// Evaluate a model pair over a noisy corpus.
    pub fn run(
        &self,
        translator: &dyn Translator,
        classifier: &dyn Classifier,
        corpus: &dyn BatchSource,
    ) -> Result<EvalReport> {
        let bins = self.config.snr_list.len();
        let mut report = EvalReport {
            snr_list: self.config.snr_list.clone(),
            correct: vec![0; bins],
            total: vec![0; bins],
            skipped: Vec::new(),
            records: Vec::new(),
            scores_by_label: BTreeMap::new(),
        };

        println!("Evaluating {} batches", corpus.batch_count());
        for index in 0..corpus.batch_count() {
            let batch = corpus.batch(index);
            let spectrum = self.transform.forward(batch)?;
            let reconstructed = translator.forward(&spectrum)?;
            let logits = classifier.forward(&reconstructed)?;
            let predictions = predicted_labels(&logits);

            for (pos, id) in batch.ids.iter().enumerate() {
                let meta = match SampleMeta::parse(id) {
                    Ok(meta) => meta,
                    Err(err) => {
                        report
                            .skipped
                            .push(SkippedSample { id: id.clone(), reason: err.to_string() });
                        continue;
                    }
                };
                // Raw scores accumulate ahead of the bin lookup, so
                // samples outside the SNR list still contribute.
                report
                    .scores_by_label
                    .entry(meta.label)
                    .or_default()
                    .push(logits.row(pos).to_vec());
                self.account(id, &meta, predictions[pos], &mut report);
            }

            if (index as u64 + 1) % self.config.log_every == 0 {
                println!("  evaluated {}/{} batches", index + 1, corpus.batch_count());
            }
        }

        for (i, acc) in report.accuracy().iter().enumerate() {
            match acc {
                Some(a) => println!(
                    "  {:>4} dB: {:.4} ({}/{})",
                    report.snr_list[i], a, report.correct[i], report.total[i]
                ),
                None => println!("  {:>4} dB: no samples", report.snr_list[i]),
            }
        }
        println!(
            "✓ overall accuracy {:.4} ({} skipped)",
            report.overall_accuracy(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Bin one parsed sample into the report; returns how it was counted.
    fn account(
        &self,
        id: &str,
        meta: &SampleMeta,
        predicted: usize,
        report: &mut EvalReport,
    ) -> SampleOutcome {
        let Some(bin) = self.config.snr_list.iter().position(|&s| s == meta.snr) else {
            let reason = format!("snr {} dB is not in the configured bin list", meta.snr);
            report.skipped.push(SkippedSample { id: id.to_string(), reason: reason.clone() });
            return SampleOutcome::Unbinned(reason);
        };

        let correct = predicted == meta.label;
        report.total[bin] += 1;
        if correct {
            report.correct[bin] += 1;
        }
        report.records.push(AuditRecord {
            id: id.to_string(),
            code: meta.code,
            snr: meta.snr,
            instance: meta.instance,
            predicted,
            actual: meta.label,
        });
        SampleOutcome::Binned { bin, correct }
    }
}
