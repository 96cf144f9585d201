//! Flat pipeline configuration
//!
//! One `PipelineConfig` carries every knob the orchestrators, transform,
//! checkpoint store, and evaluation harness need. Configs load from YAML
//! and are validated before a run starts; invalid values are surfaced as
//! field-level errors, never deferred into the training loop.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for the full training + evaluation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// FFT size of the spectral transform (also the frequency-bin count).
    pub n_fft: usize,
    /// Hop length between STFT frames, in samples.
    pub hop_length: usize,
    /// Analysis window length, in samples.
    pub win_length: usize,

    /// Samples per batch.
    pub batch_size: usize,
    /// Total training iterations.
    pub train_iters: u64,
    /// Emit a loss log line every this many iterations.
    pub log_every: u64,
    /// Export diagnostic sample images every this many iterations.
    pub sample_every: u64,
    /// Write a checkpoint every this many iterations.
    pub checkpoint_every: u64,

    /// Weight of the spectrum reconstruction (MSE) term.
    pub lambda_spectrum: f32,
    /// Weight of the supervised classification (CE) term.
    pub lambda_class: f32,
    /// Weight of the distillation reconstruction term (distill mode only).
    pub lambda_distill_spectrum: f32,
    /// Weight of the distillation classification term (distill mode only).
    ///
    /// The observed configuration runs with 0.0, which disables the term
    /// while still computing and logging it.
    pub lambda_distill_class: f32,

    /// Adam learning rate.
    pub lr: f32,
    /// Adam beta1.
    pub beta1: f32,
    /// Adam beta2.
    pub beta2: f32,

    /// Number of symbol classes (2^sf for a chirp alphabet).
    pub n_classes: usize,
    /// Ordered SNR bins (dB) for stratified evaluation.
    pub snr_list: Vec<i32>,

    /// Spreading factor tag, used for artifact naming and the demo source.
    pub sf: u32,
    /// Bandwidth tag (Hz), used for artifact naming.
    pub bw: u32,
    /// Free-form comment prefixed onto result artifact names.
    pub dir_comment: String,

    /// Checkpoint snapshot directory.
    pub checkpoint_dir: PathBuf,
    /// Diagnostic sample image directory.
    pub sample_dir: PathBuf,
    /// Evaluation artifact directory.
    pub output_dir: PathBuf,
    /// Disable diagnostic image export (headless runs).
    pub no_samples: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            n_fft: 64,
            hop_length: 16,
            win_length: 64,
            batch_size: 16,
            train_iters: 2000,
            log_every: 50,
            sample_every: 500,
            checkpoint_every: 500,
            lambda_spectrum: 128.0,
            lambda_class: 1.0,
            lambda_distill_spectrum: 1.0,
            lambda_distill_class: 0.0,
            lr: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            n_classes: 64,
            snr_list: vec![-25, -20, -15, -10, -5, 0],
            sf: 6,
            bw: 125_000,
            dir_comment: "demodular".to_string(),
            checkpoint_dir: PathBuf::from("checkpoints"),
            sample_dir: PathBuf::from("samples"),
            output_dir: PathBuf::from("results"),
            no_samples: false,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a YAML file and validate it.
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::io(format!("reading config {}", path.as_ref().display()), e))?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::Serialization(format!("parsing YAML config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field a run depends on.
    pub fn validate(&self) -> Result<()> {
        fn positive(field: &str, value: usize) -> Result<()> {
            if value == 0 {
                return Err(Error::Config {
                    field: field.to_string(),
                    message: "must be positive".to_string(),
                });
            }
            Ok(())
        }

        positive("n_fft", self.n_fft)?;
        positive("hop_length", self.hop_length)?;
        positive("win_length", self.win_length)?;
        positive("batch_size", self.batch_size)?;
        positive("n_classes", self.n_classes)?;
        positive("train_iters", self.train_iters as usize)?;
        positive("log_every", self.log_every as usize)?;
        positive("sample_every", self.sample_every as usize)?;
        positive("checkpoint_every", self.checkpoint_every as usize)?;

        if self.win_length > self.n_fft {
            return Err(Error::Config {
                field: "win_length".to_string(),
                message: format!("window ({}) longer than n_fft ({})", self.win_length, self.n_fft),
            });
        }
        if !(self.lr > 0.0) {
            return Err(Error::Config {
                field: "lr".to_string(),
                message: format!("must be positive, got {}", self.lr),
            });
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::Config {
                    field: name.to_string(),
                    message: format!("must be in [0, 1), got {beta}"),
                });
            }
        }
        for (name, lambda) in [
            ("lambda_spectrum", self.lambda_spectrum),
            ("lambda_class", self.lambda_class),
            ("lambda_distill_spectrum", self.lambda_distill_spectrum),
            ("lambda_distill_class", self.lambda_distill_class),
        ] {
            if lambda < 0.0 || !lambda.is_finite() {
                return Err(Error::Config {
                    field: name.to_string(),
                    message: format!("must be finite and non-negative, got {lambda}"),
                });
            }
        }
        if self.snr_list.is_empty() {
            return Err(Error::Config {
                field: "snr_list".to_string(),
                message: "at least one SNR bin is required".to_string(),
            });
        }

        Ok(())
    }

    /// Number of STFT frames produced for a waveform of `sample_len` samples.
    pub fn frames_for(&self, sample_len: usize) -> usize {
        sample_len / self.hop_length + 1
    }

    /// Result artifact stem: `<comment>_<sf>_<bw>`.
    pub fn artifact_stem(&self) -> String {
        format!("{}_{}_{}", self.dir_comment, self.sf, self.bw)
    }

    /// Builder-style override for the iteration count.
    pub fn with_train_iters(mut self, iters: u64) -> Self {
        self.train_iters = iters;
        self
    }

    /// Builder-style override for the checkpoint directory.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Builder-style override for the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_nfft_rejected() {
        let config = PipelineConfig { n_fft: 0, ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("n_fft"));
    }

    #[test]
    fn test_window_longer_than_fft_rejected() {
        let config = PipelineConfig { n_fft: 32, win_length: 64, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_snr_list_rejected() {
        let config = PipelineConfig { snr_list: vec![], ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("snr_list"));
    }

    #[test]
    fn test_negative_lambda_rejected() {
        let config = PipelineConfig { lambda_class: -1.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_beta_out_of_range_rejected() {
        let config = PipelineConfig { beta2: 1.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "n_fft: 128\nhop_length: 32\nwin_length: 128\nsnr_list: [-10, 0]").unwrap();

        let config = PipelineConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.n_fft, 128);
        assert_eq!(config.snr_list, vec![-10, 0]);
        // Unlisted fields fall back to defaults.
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn test_yaml_invalid_value_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size: 0").unwrap();
        assert!(PipelineConfig::from_yaml(file.path()).is_err());
    }

    #[test]
    fn test_frames_for() {
        let config = PipelineConfig { hop_length: 16, ..Default::default() };
        assert_eq!(config.frames_for(64), 5);
    }

    #[test]
    fn test_artifact_stem() {
        let config = PipelineConfig {
            dir_comment: "run1".into(),
            sf: 7,
            bw: 125_000,
            ..Default::default()
        };
        assert_eq!(config.artifact_stem(), "run1_7_125000");
    }
}
