//! In-memory page images passed between pipeline stages.

use std::path::Path;

use image::{DynamicImage, ImageFormat, RgbImage};

/// A rasterized PDF page, always RGB8.
#[derive(Debug, Clone)]
pub struct PageImage {
    pixels: RgbImage,
}

impl PageImage {
    /// Wrap an already-decoded RGB image.
    pub fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Convert any decoded image to RGB8, whatever its source color space.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            pixels: image.to_rgb8(),
        }
    }

    /// Decode an image file written by a rasterizer.
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        Ok(Self::from_dynamic(image::open(path)?))
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// A page image after contrast, sharpness and denoise enhancement.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbImage,
    applied: Vec<&'static str>,
}

impl NormalizedImage {
    pub fn new(pixels: RgbImage, applied: Vec<&'static str>) -> Self {
        Self { pixels, applied }
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Names of the enhancement steps that succeeded, in order.
    pub fn applied_steps(&self) -> &[&'static str] {
        &self.applied
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Write the image as PNG, for engines that read from disk.
    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.pixels.save_with_format(path, ImageFormat::Png)
    }
}

impl From<PageImage> for NormalizedImage {
    fn from(page: PageImage) -> Self {
        Self::new(page.into_pixels(), Vec::new())
    }
}
