//! Diagnostic spectrogram export
//!
//! Renders magnitude spectrograms as grayscale PNGs so a training run
//! can be inspected visually. Each export is a triptych of the noisy
//! input, the model's reconstruction, and the clean reference, laid out
//! side by side. Export is advisory; the orchestrators log failures and
//! keep training.

use crate::error::{Error, Result};
use crate::spectral::Spectrum;
use image::{GrayImage, Luma};
use std::fs;
use std::path::Path;

/// Render one sample's magnitude spectrogram to an 8-bit image.
///
/// Values are min-max scaled to the full 8-bit range and the frequency
/// axis is flipped so low bins sit at the bottom of the image.
pub fn magnitude_image(spec: &Spectrum, sample: usize) -> GrayImage {
    let mag = spec.magnitude(sample);
    let (freq, frames) = mag.dim();

    let min = mag.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = mag.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(1e-12);

    let mut img = GrayImage::new(frames as u32, freq as u32);
    for f in 0..freq {
        for t in 0..frames {
            let v = ((mag[[f, t]] - min) / range * 255.0).round() as u8;
            img.put_pixel(t as u32, (freq - 1 - f) as u32, Luma([v]));
        }
    }
    img
}

/// Write a raw / reconstructed / reference triptych for one sample.
pub fn save_triptych(
    raw: &Spectrum,
    fake: &Spectrum,
    real: &Spectrum,
    sample: usize,
    path: &Path,
) -> Result<()> {
    raw.check_same_shape(fake)?;
    raw.check_same_shape(real)?;

    let panels = [
        magnitude_image(raw, sample),
        magnitude_image(fake, sample),
        magnitude_image(real, sample),
    ];
    let (w, h) = (panels[0].width(), panels[0].height());
    let gap = 2u32;

    let mut canvas = GrayImage::from_pixel(3 * w + 2 * gap, h, Luma([255]));
    for (i, panel) in panels.iter().enumerate() {
        let x0 = i as u32 * (w + gap);
        for y in 0..h {
            for x in 0..w {
                canvas.put_pixel(x0 + x, y, *panel.get_pixel(x, y));
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }
    canvas
        .save(path)
        .map_err(|e| Error::Serialization(format!("writing image {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn gradient_spectrum() -> Spectrum {
        let mut spec = Spectrum::zeros(1, 8, 5);
        for (i, v) in spec.data.iter_mut().enumerate() {
            *v = i as f32 * 0.01;
        }
        spec
    }

    #[test]
    fn test_magnitude_image_dimensions() {
        let img = magnitude_image(&gradient_spectrum(), 0);
        assert_eq!((img.width(), img.height()), (5, 8));
    }

    #[test]
    fn test_magnitude_image_uses_full_range() {
        let img = magnitude_image(&gradient_spectrum(), 0);
        let values: Vec<u8> = img.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values.iter().min(), Some(&0));
        assert_eq!(values.iter().max(), Some(&255));
    }

    #[test]
    fn test_constant_spectrum_does_not_divide_by_zero() {
        let spec = Spectrum::zeros(1, 4, 4);
        let img = magnitude_image(&spec, 0);
        assert!(img.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_save_triptych_writes_readable_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sample.png");
        let spec = gradient_spectrum();

        save_triptych(&spec, &spec, &spec, 0, &path).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!(reloaded.width(), 3 * 5 + 2 * 2);
        assert_eq!(reloaded.height(), 8);
    }

    #[test]
    fn test_save_triptych_rejects_mismatched_panels() {
        let dir = TempDir::new().unwrap();
        let a = gradient_spectrum();
        let b = Spectrum::zeros(1, 4, 5);
        let err = save_triptych(&a, &b, &a, 0, &dir.path().join("x.png")).unwrap_err();
        assert!(matches!(err, Error::Shape { .. }));
    }
}
