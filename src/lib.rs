//! Neural-enhanced chirp demodulation pipeline.
//!
//! Trains a pair of cooperating models over STFT spectra of chirp
//! symbols: a translation model that denoises the spectrum and a
//! classifier that decodes the symbol. The pair exists in two capacity
//! tiers; the full-capacity pair is trained directly, then a reduced
//! pair is distilled against it with the teacher frozen. Evaluation
//! stratifies symbol accuracy by SNR bin and serializes the results as
//! JSON artifacts.
//!
//! # Quick start
//!
//! ```no_run
//! use demodular::config::PipelineConfig;
//! use demodular::synth::demo_sources;
//! use demodular::train::DirectTrainer;
//!
//! # fn main() -> demodular::Result<()> {
//! let config = PipelineConfig::default();
//! let (noisy, clean) = demo_sources(&config, 8, 42)?;
//! let mut trainer = DirectTrainer::new(&config, 64, 42);
//! let report = trainer.run(&noisy, &clean)?;
//! println!("final loss {:.6}", report.final_loss.total());
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod model;
pub mod optim;
pub mod render;
pub mod spectral;
pub mod synth;
pub mod tensor;
pub mod train;

pub use config::PipelineConfig;
pub use error::{Error, Result};
