//! Page image normalization ahead of OCR.
//!
//! Three steps, in order: contrast enhancement, sharpness enhancement and
//! a median filter for speckle noise. Each step is best-effort: a step that
//! fails is skipped and the image enhanced so far moves on.

use std::panic::{catch_unwind, AssertUnwindSafe};

use image::{imageops, Rgb, RgbImage};
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::page::{NormalizedImage, PageImage};

/// 3x3 smoothing kernel used as the "blurred" reference for sharpening.
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// Errors from a single enhancement step.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("{step}: invalid factor {value}")]
    InvalidFactor { step: &'static str, value: f32 },

    #[error("{0}: image has no pixels")]
    EmptyImage(&'static str),

    #[error("{0}: image library panicked")]
    Panicked(&'static str),
}

/// Enhancement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Skip all enhancement when false.
    pub enabled: bool,
    /// Contrast multiplier (1.0 = unchanged).
    pub contrast: f32,
    /// Sharpness multiplier (1.0 = unchanged).
    pub sharpness: f32,
    /// Median filter radius; 1 means a 3x3 window, 0 disables the step.
    pub median_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contrast: 1.5,
            sharpness: 2.0,
            median_radius: 1,
        }
    }
}

/// Applies contrast, sharpness and denoise to page images.
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Normalize one page. Never fails; failed steps are skipped.
    pub fn preprocess(&self, page: PageImage) -> NormalizedImage {
        if !self.config.enabled {
            return NormalizedImage::from(page);
        }

        let mut pixels = page.into_pixels();
        let mut applied = Vec::with_capacity(3);

        let contrast = self.config.contrast;
        if let Some(next) = run_step("contrast", &pixels, |img| enhance_contrast(img, contrast)) {
            pixels = next;
            applied.push("contrast");
        }

        let sharpness = self.config.sharpness;
        if let Some(next) = run_step("sharpness", &pixels, |img| enhance_sharpness(img, sharpness))
        {
            pixels = next;
            applied.push("sharpness");
        }

        let radius = self.config.median_radius;
        if radius > 0 {
            if let Some(next) = run_step("denoise", &pixels, |img| denoise(img, radius)) {
                pixels = next;
                applied.push("denoise");
            }
        }

        debug!("preprocessed page with steps {:?}", applied);
        NormalizedImage::new(pixels, applied)
    }
}

/// Run one step, turning errors and panics into a logged skip.
fn run_step<F>(step: &'static str, image: &RgbImage, f: F) -> Option<RgbImage>
where
    F: FnOnce(&RgbImage) -> Result<RgbImage, PreprocessError>,
{
    let result = catch_unwind(AssertUnwindSafe(|| f(image)))
        .unwrap_or(Err(PreprocessError::Panicked(step)));

    match result {
        Ok(enhanced) => Some(enhanced),
        Err(e) => {
            warn!("Image preprocessing step skipped: {}", e);
            None
        }
    }
}

fn check_factor(step: &'static str, value: f32) -> Result<(), PreprocessError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PreprocessError::InvalidFactor { step, value })
    }
}

fn check_not_empty(step: &'static str, image: &RgbImage) -> Result<(), PreprocessError> {
    if image.width() == 0 || image.height() == 0 {
        Err(PreprocessError::EmptyImage(step))
    } else {
        Ok(())
    }
}

/// Interpolate from `degenerate` towards `image` by `factor`, clamping to u8.
fn blend(degenerate: &RgbImage, image: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let base = degenerate.get_pixel(x, y).0;
        let px = image.get_pixel(x, y).0;
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = base[c] as f32 + factor * (px[c] as f32 - base[c] as f32);
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Mean luminance (ITU-R 601-2), rounded.
fn mean_luminance(image: &RgbImage) -> u8 {
    let total: u64 = image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (r as u64 * 299 + g as u64 * 587 + b as u64 * 114) / 1000
        })
        .sum();
    let count = image.width() as u64 * image.height() as u64;
    ((total as f64 / count as f64) + 0.5).min(255.0) as u8
}

/// Scale each pixel's distance from the mean gray level by `factor`.
pub fn enhance_contrast(image: &RgbImage, factor: f32) -> Result<RgbImage, PreprocessError> {
    check_factor("contrast", factor)?;
    check_not_empty("contrast", image)?;

    let mean = mean_luminance(image);
    let gray = RgbImage::from_pixel(image.width(), image.height(), Rgb([mean, mean, mean]));
    Ok(blend(&gray, image, factor))
}

/// Scale each pixel's distance from a smoothed copy by `factor`.
pub fn enhance_sharpness(image: &RgbImage, factor: f32) -> Result<RgbImage, PreprocessError> {
    check_factor("sharpness", factor)?;
    check_not_empty("sharpness", image)?;

    // filter3x3 leaves the outermost ring black; keep the source pixels there.
    let mut smoothed: RgbImage = imageops::filter3x3(image, &SMOOTH_KERNEL);
    let (width, height) = image.dimensions();
    for (x, y, px) in image.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            smoothed.put_pixel(x, y, *px);
        }
    }
    Ok(blend(&smoothed, image, factor))
}

/// Median filter over a (2r+1)x(2r+1) window.
pub fn denoise(image: &RgbImage, radius: u32) -> Result<RgbImage, PreprocessError> {
    check_not_empty("denoise", image)?;
    Ok(median_filter(image, radius, radius))
}
