//! Synthetic chirp dataset
//!
//! Generates paired demo data so the full pipeline runs without a
//! capture corpus: clean cyclic-shift-keyed chirp symbols on the Y side
//! and the same symbols under additive white Gaussian noise on the X
//! side. Identifiers follow the positional layout the dataset module
//! parses, so the synthetic path exercises the same metadata code as
//! real captures would.

use crate::config::PipelineConfig;
use crate::dataset::{InMemorySource, WaveformBatch};
use crate::error::Result;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Chirp symbol synthesizer for one spreading factor.
pub struct ChirpSynth {
    sf: u32,
    bw: u32,
    n: usize,
    base: Vec<Complex32>,
}

impl ChirpSynth {
    /// Build a synthesizer; the symbol alphabet has `2^sf` entries.
    pub fn new(sf: u32, bw: u32) -> Self {
        let n = 1usize << sf;
        // Base up-chirp: quadratic phase sweeping the full bandwidth.
        let base = (0..n)
            .map(|k| {
                let k = k as f32;
                let phase = 2.0 * PI * (k * k / (2.0 * n as f32) - k / 2.0);
                Complex32::new(phase.cos(), phase.sin())
            })
            .collect();
        Self { sf, bw, n, base }
    }

    /// Samples per symbol.
    pub fn sample_len(&self) -> usize {
        self.n
    }

    /// Symbol alphabet size.
    pub fn n_symbols(&self) -> usize {
        self.n
    }

    /// Clean waveform for one symbol: the base chirp cyclically shifted
    /// by the symbol value.
    pub fn symbol_waveform(&self, symbol: usize) -> Vec<Complex32> {
        (0..self.n).map(|k| self.base[(k + symbol) % self.n]).collect()
    }

    /// Symbol waveform under additive white Gaussian noise at `snr_db`.
    /// The clean chirp has unit power, so the noise variance is
    /// `10^(-snr/10)` split evenly across the I and Q components.
    pub fn noisy_waveform(&self, symbol: usize, snr_db: i32, rng: &mut StdRng) -> Vec<Complex32> {
        let noise_power = 10f32.powf(-(snr_db as f32) / 10.0);
        let sigma = (noise_power / 2.0).sqrt();
        self.symbol_waveform(symbol)
            .into_iter()
            .map(|s| s + Complex32::new(sigma * gaussian(rng), sigma * gaussian(rng)))
            .collect()
    }

    fn id_for(&self, snr_db: i32, instance: u32, label: usize) -> String {
        format!("1.0_{}_{}_{}_{}_{}", snr_db, self.sf, self.bw, instance, label)
    }
}

/// Standard normal sample via Box-Muller.
fn gaussian(rng: &mut StdRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Build paired (noisy, clean) demo sources.
///
/// Batches cycle through the configured SNR list; labels are drawn
/// uniformly from the symbol alphabet. Both sides of a pair share their
/// instance ids and labels, so draw-time pairing checks pass.
pub fn demo_sources(
    config: &PipelineConfig,
    batches: usize,
    seed: u64,
) -> Result<(InMemorySource, InMemorySource)> {
    let synth = ChirpSynth::new(config.sf, config.bw);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut noisy_batches = Vec::with_capacity(batches);
    let mut clean_batches = Vec::with_capacity(batches);
    let mut instance = 0u32;

    for b in 0..batches {
        let snr = config.snr_list[b % config.snr_list.len()];
        let mut noisy = Vec::with_capacity(config.batch_size);
        let mut clean = Vec::with_capacity(config.batch_size);
        let mut ids = Vec::with_capacity(config.batch_size);

        for _ in 0..config.batch_size {
            let label = rng.gen_range(0..config.n_classes.min(synth.n_symbols()));
            noisy.push(synth.noisy_waveform(label, snr, &mut rng));
            clean.push(synth.symbol_waveform(label));
            ids.push(synth.id_for(snr, instance, label));
            instance += 1;
        }

        noisy_batches.push(WaveformBatch::new(noisy, ids.clone())?);
        clean_batches.push(WaveformBatch::new(clean, ids)?);
    }

    Ok((InMemorySource::new(noisy_batches), InMemorySource::new(clean_batches)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{verify_pairing, BatchSource, SampleMeta};
    use approx::assert_relative_eq;

    #[test]
    fn test_symbol_waveform_is_unit_power() {
        let synth = ChirpSynth::new(6, 125_000);
        let wave = synth.symbol_waveform(17);
        assert_eq!(wave.len(), 64);
        let power: f32 = wave.iter().map(|s| s.norm_sqr()).sum::<f32>() / wave.len() as f32;
        assert_relative_eq!(power, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_symbols_are_cyclic_shifts() {
        let synth = ChirpSynth::new(4, 125_000);
        let base = synth.symbol_waveform(0);
        let shifted = synth.symbol_waveform(3);
        for k in 0..synth.sample_len() {
            assert_eq!(shifted[k], base[(k + 3) % synth.sample_len()]);
        }
    }

    #[test]
    fn test_noise_scales_with_snr() {
        let synth = ChirpSynth::new(6, 125_000);
        let clean = synth.symbol_waveform(5);

        let residual_power = |snr: i32| {
            let mut rng = StdRng::seed_from_u64(9);
            let noisy = synth.noisy_waveform(5, snr, &mut rng);
            noisy
                .iter()
                .zip(clean.iter())
                .map(|(a, b)| (a - b).norm_sqr())
                .sum::<f32>()
                / clean.len() as f32
        };

        assert!(residual_power(-20) > 10.0 * residual_power(0));
    }

    #[test]
    fn test_demo_sources_are_paired_and_parseable() {
        let config = PipelineConfig { batch_size: 4, n_classes: 16, ..Default::default() };
        let (x, y) = demo_sources(&config, 3, 1).unwrap();

        assert_eq!(x.batch_count(), 3);
        assert_eq!(y.batch_count(), 3);
        for i in 0..3 {
            verify_pairing(x.batch(i), y.batch(i), i).unwrap();
            for id in &x.batch(i).ids {
                let meta = SampleMeta::parse(id).unwrap();
                assert!(meta.label < 16);
                assert!(config.snr_list.contains(&meta.snr));
            }
        }
    }

    #[test]
    fn test_demo_sources_cycle_snr_bins() {
        let config = PipelineConfig {
            batch_size: 2,
            snr_list: vec![-5, 0],
            ..Default::default()
        };
        let (x, _) = demo_sources(&config, 4, 1).unwrap();

        let snr_of = |i: usize| SampleMeta::parse(&x.batch(i).ids[0]).unwrap().snr;
        assert_eq!(snr_of(0), -5);
        assert_eq!(snr_of(1), 0);
        assert_eq!(snr_of(2), -5);
    }

    #[test]
    fn test_instances_are_globally_unique() {
        let config = PipelineConfig { batch_size: 3, ..Default::default() };
        let (x, _) = demo_sources(&config, 2, 1).unwrap();

        let mut seen = std::collections::BTreeSet::new();
        for i in 0..2 {
            for id in &x.batch(i).ids {
                let meta = SampleMeta::parse(id).unwrap();
                assert!(seen.insert(meta.instance));
            }
        }
    }
}
