//! Paired waveform datasets and the cyclic batch iterator
//!
//! Two aligned batch sources feed training: domain X (noisy capture) and
//! domain Y (clean reference). Sample identifiers carry structured
//! metadata in a fixed `'_'`-delimited positional layout:
//!
//! ```text
//! <code>_<snr>_<sf>_<bw>_<instance>_<label>
//! field:  0      1    2    3      4        5
//! ```
//!
//! The loader measures the epoch length once as the minimum of the two
//! batch counts and resets both cursors when the iteration count is a
//! multiple of it, so datasets of unequal length truncate to the shorter
//! one every epoch. Unlike the positional-only coupling this layout came
//! from, X/Y correspondence is verified at draw time: instance ids and
//! labels must match pairwise.

use crate::error::{Error, Result};
use num_complex::Complex32;

/// Structured metadata extracted from a sample identifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleMeta {
    /// Code value (chirp code under test).
    pub code: f32,
    /// Signal-to-noise ratio in dB.
    pub snr: i32,
    /// Capture instance index.
    pub instance: u32,
    /// True symbol label.
    pub label: usize,
}

impl SampleMeta {
    /// Parse an identifier string into its positional fields.
    pub fn parse(id: &str) -> Result<Self> {
        let fields: Vec<&str> = id.split('_').collect();
        if fields.len() < 6 {
            return Err(Error::Metadata {
                id: id.to_string(),
                message: format!("expected at least 6 '_'-delimited fields, got {}", fields.len()),
            });
        }

        let field = |index: usize, name: &str| -> Result<&str> {
            fields.get(index).copied().ok_or_else(|| Error::Metadata {
                id: id.to_string(),
                message: format!("missing field {index} ({name})"),
            })
        };

        let code: f32 = field(0, "code")?.parse().map_err(|_| Error::Metadata {
            id: id.to_string(),
            message: "field 0 (code) is not a float".to_string(),
        })?;
        let snr: i32 = field(1, "snr")?.parse().map_err(|_| Error::Metadata {
            id: id.to_string(),
            message: "field 1 (snr) is not an integer".to_string(),
        })?;
        let instance: u32 = field(4, "instance")?.parse().map_err(|_| Error::Metadata {
            id: id.to_string(),
            message: "field 4 (instance) is not an integer".to_string(),
        })?;
        let label: usize = field(5, "label")?.parse().map_err(|_| Error::Metadata {
            id: id.to_string(),
            message: "field 5 (label) is not an integer".to_string(),
        })?;

        Ok(Self { code, snr, instance, label })
    }
}

/// A batch of fixed-length complex waveforms with their identifiers.
#[derive(Debug, Clone)]
pub struct WaveformBatch {
    /// Time-domain IQ samples, one vector per batch element.
    pub samples: Vec<Vec<Complex32>>,
    /// Identifier strings, aligned with `samples`.
    pub ids: Vec<String>,
}

impl WaveformBatch {
    /// Create a batch, checking that samples and ids align and every
    /// waveform has the same length.
    pub fn new(samples: Vec<Vec<Complex32>>, ids: Vec<String>) -> Result<Self> {
        if samples.len() != ids.len() {
            return Err(Error::Dataset(format!(
                "{} samples but {} identifiers",
                samples.len(),
                ids.len()
            )));
        }
        if let Some(first) = samples.first() {
            let len = first.len();
            if let Some(bad) = samples.iter().position(|s| s.len() != len) {
                return Err(Error::Dataset(format!(
                    "waveform {bad} has length {} but batch length is {len}",
                    samples[bad].len()
                )));
            }
        }
        Ok(Self { samples, ids })
    }

    /// Number of samples in the batch.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Waveform length shared by every sample.
    pub fn sample_len(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    /// Parse metadata for every sample. Fails fast on the first
    /// malformed identifier.
    pub fn metas(&self) -> Result<Vec<SampleMeta>> {
        self.ids.iter().map(|id| SampleMeta::parse(id)).collect()
    }

    /// True labels for every sample.
    pub fn labels(&self) -> Result<Vec<usize>> {
        Ok(self.metas()?.into_iter().map(|m| m.label).collect())
    }
}

/// A source of waveform batches with a known total count.
pub trait BatchSource {
    /// Total number of batches per pass.
    fn batch_count(&self) -> usize;

    /// Batch at `index`; `index` must be below `batch_count()`.
    fn batch(&self, index: usize) -> &WaveformBatch;
}

/// Batch source backed by preloaded batches.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    batches: Vec<WaveformBatch>,
}

impl InMemorySource {
    /// Wrap a vector of batches.
    pub fn new(batches: Vec<WaveformBatch>) -> Self {
        Self { batches }
    }
}

impl BatchSource for InMemorySource {
    fn batch_count(&self) -> usize {
        self.batches.len()
    }

    fn batch(&self, index: usize) -> &WaveformBatch {
        &self.batches[index]
    }
}

/// Cyclic iterator over two aligned domains.
pub struct PairedCyclicLoader<'a> {
    x: &'a dyn BatchSource,
    y: &'a dyn BatchSource,
    epoch_length: usize,
    cursor: usize,
}

impl<'a> PairedCyclicLoader<'a> {
    /// Build a loader over a noisy source (X) and a clean source (Y).
    pub fn new(x: &'a dyn BatchSource, y: &'a dyn BatchSource) -> Result<Self> {
        let epoch_length = x.batch_count().min(y.batch_count());
        if epoch_length == 0 {
            return Err(Error::Dataset("both domains must supply at least one batch".into()));
        }
        Ok(Self { x, y, epoch_length, cursor: 0 })
    }

    /// Batches per epoch (the shorter domain's count, measured once).
    pub fn epoch_length(&self) -> usize {
        self.epoch_length
    }

    /// Draw the batch pair for a 1-based training iteration.
    ///
    /// Cursors reset whenever `iteration` is a multiple of the epoch
    /// length; the tail of the longer domain is never visited.
    pub fn draw(&mut self, iteration: u64) -> Result<(&'a WaveformBatch, &'a WaveformBatch)> {
        if iteration % self.epoch_length as u64 == 0 {
            self.cursor = 0;
        }
        let index = self.cursor % self.epoch_length;
        self.cursor += 1;

        let batch_x = self.x.batch(index);
        let batch_y = self.y.batch(index);
        verify_pairing(batch_x, batch_y, index)?;
        Ok((batch_x, batch_y))
    }
}

/// Check that the i-th X and Y batches describe the same samples.
pub fn verify_pairing(x: &WaveformBatch, y: &WaveformBatch, index: usize) -> Result<()> {
    if x.len() != y.len() {
        return Err(Error::Dataset(format!(
            "batch {index}: X has {} samples, Y has {}",
            x.len(),
            y.len()
        )));
    }
    for (pos, (id_x, id_y)) in x.ids.iter().zip(y.ids.iter()).enumerate() {
        let meta_x = SampleMeta::parse(id_x)?;
        let meta_y = SampleMeta::parse(id_y)?;
        if meta_x.instance != meta_y.instance || meta_x.label != meta_y.label {
            return Err(Error::Dataset(format!(
                "batch {index} sample {pos}: X is instance {} label {} but Y is instance {} label {}",
                meta_x.instance, meta_x.label, meta_y.instance, meta_y.label
            )));
        }
    }
    Ok(())
}
