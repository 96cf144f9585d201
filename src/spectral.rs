//! Spectral transform
//!
//! Converts a batch of complex time-domain waveforms into the
//! channel-packed spectral tensor the models consume. The transform is a
//! pure function of its input: fixed FFT size, fixed hop, constant
//! (zero) padding at the edges, no randomness anywhere. Repeated calls on
//! identical input produce bit-identical output.
//!
//! Layout of the output tensor: `[batch, channel, freq_bin, frame]` with
//! channel 0 = real, channel 1 = imaginary. The two FFT halves are
//! swapped so the chirp band is contiguous around the center bin, and
//! each sample is scaled by its own peak magnitude.

use crate::dataset::WaveformBatch;
use crate::error::{Error, Result};
use ndarray::{Array2, Array4};
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Channel-packed time-frequency tensor, shape `[batch, 2, freq, frames]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Backing tensor.
    pub data: Array4<f32>,
}

impl Spectrum {
    /// Wrap a rank-4 tensor. Channel dimension must be 2.
    pub fn new(data: Array4<f32>) -> Result<Self> {
        let shape = data.shape();
        if shape[1] != 2 {
            return Err(Error::Shape {
                expected: vec![shape[0], 2, shape[2], shape[3]],
                actual: shape.to_vec(),
            });
        }
        Ok(Self { data })
    }

    /// Zero spectrum with the given geometry.
    pub fn zeros(batch: usize, freq: usize, frames: usize) -> Self {
        Self { data: Array4::zeros((batch, 2, freq, frames)) }
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.data.shape()[0]
    }

    /// Frequency bin count.
    pub fn freq_bins(&self) -> usize {
        self.data.shape()[2]
    }

    /// Time frame count.
    pub fn frames(&self) -> usize {
        self.data.shape()[3]
    }

    /// Elements per sample (2 * freq * frames), the classifier's input width.
    pub fn sample_width(&self) -> usize {
        2 * self.freq_bins() * self.frames()
    }

    /// Magnitude image `[freq, frames]` for one sample.
    pub fn magnitude(&self, sample: usize) -> Array2<f32> {
        let freq = self.freq_bins();
        let frames = self.frames();
        let mut out = Array2::zeros((freq, frames));
        for f in 0..freq {
            for t in 0..frames {
                let re = self.data[[sample, 0, f, t]];
                let im = self.data[[sample, 1, f, t]];
                out[[f, t]] = (re * re + im * im).sqrt();
            }
        }
        out
    }

    /// Check that another spectrum has the same geometry.
    pub fn check_same_shape(&self, other: &Spectrum) -> Result<()> {
        if self.data.shape() != other.data.shape() {
            return Err(Error::Shape {
                expected: self.data.shape().to_vec(),
                actual: other.data.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// Configuration of the spectral transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectralConfig {
    /// FFT size; also the output frequency-bin count.
    pub n_fft: usize,
    /// Hop between consecutive frames, in samples.
    pub hop_length: usize,
    /// Analysis window length; samples outside it are zeroed.
    pub win_length: usize,
}

/// STFT front end with a cached FFT plan.
pub struct SpectralTransform {
    config: SpectralConfig,
    fft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform").field("config", &self.config).finish_non_exhaustive()
    }
}

impl SpectralTransform {
    /// Build a transform; the FFT plan is created once and reused.
    pub fn new(config: SpectralConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.n_fft);
        Self { config, fft }
    }

    /// Frames produced for a waveform of `sample_len` samples.
    pub fn frames_for(&self, sample_len: usize) -> usize {
        sample_len / self.config.hop_length + 1
    }

    /// Transform a waveform batch into a spectrum tensor.
    ///
    /// Fails if the batch is empty or a waveform is shorter than the
    /// analysis window; fixed-length inputs are assumed upstream, so
    /// this is a data error, not a recoverable condition.
    pub fn forward(&self, batch: &WaveformBatch) -> Result<Spectrum> {
        let SpectralConfig { n_fft, hop_length, win_length } = self.config;
        if batch.is_empty() {
            return Err(Error::Transform("empty waveform batch".into()));
        }
        let sample_len = batch.sample_len();
        if sample_len < win_length {
            return Err(Error::Transform(format!(
                "waveform length {sample_len} is shorter than the analysis window {win_length}"
            )));
        }

        let frames = self.frames_for(sample_len);
        let half = n_fft / 2;
        let mut out = Array4::zeros((batch.len(), 2, n_fft, frames));
        let mut frame_buf = vec![Complex32::new(0.0, 0.0); n_fft];

        // Window shorter than n_fft keeps only the centered win_length
        // samples of each frame, matching a zero-padded analysis window.
        let win_start = (n_fft - win_length) / 2;
        let win_end = win_start + win_length;

        for (b, waveform) in batch.samples.iter().enumerate() {
            for frame in 0..frames {
                // Centered framing with constant (zero) edge padding.
                let center = (frame * hop_length) as isize;
                for (k, slot) in frame_buf.iter_mut().enumerate() {
                    let idx = center - half as isize + k as isize;
                    *slot = if k >= win_start && k < win_end && idx >= 0 && (idx as usize) < sample_len {
                        waveform[idx as usize]
                    } else {
                        Complex32::new(0.0, 0.0)
                    };
                }
                self.fft.process(&mut frame_buf);

                // Swap halves so the band of interest is contiguous.
                for bin in 0..n_fft {
                    let src = (bin + half) % n_fft;
                    out[[b, 0, bin, frame]] = frame_buf[src].re;
                    out[[b, 1, bin, frame]] = frame_buf[src].im;
                }
            }

            // Per-sample peak normalization.
            let mut peak = 0.0f32;
            for f in 0..n_fft {
                for t in 0..frames {
                    let re = out[[b, 0, f, t]];
                    let im = out[[b, 1, f, t]];
                    peak = peak.max((re * re + im * im).sqrt());
                }
            }
            if peak > 0.0 {
                for c in 0..2 {
                    for f in 0..n_fft {
                        for t in 0..frames {
                            out[[b, c, f, t]] /= peak;
                        }
                    }
                }
            }
        }

        Spectrum::new(out)
    }
}
