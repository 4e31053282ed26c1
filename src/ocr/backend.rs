//! OCR engine abstraction.
//!
//! Supports multiple OCR engines behind one trait:
//! - Tesseract: traditional OCR via command-line (CPU)
//! - ImageMagick + Tesseract: `magick` cleanup pass, then Tesseract
//! - Ocrs: pure Rust OCR engine (CPU, feature `ocr-ocrs`)
//! - PaddleOCR: CNN-based OCR via ONNX Runtime (feature `ocr-paddle`)

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::page::NormalizedImage;
use super::process::ToolError;

/// Detections an engine scores below this (0-1 scale) are dropped.
pub const MIN_CONFIDENCE: f32 = 0.5;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

impl From<image::ImageError> for OcrError {
    fn from(e: image::ImageError) -> Self {
        OcrError::ImageError(e.to_string())
    }
}

/// A per-engine, per-page failure. Logged by the page extractor, never fatal.
#[derive(Debug, Error)]
#[error("{engine} extraction failed: {cause}")]
pub struct EngineExtractionFailed {
    pub engine: OcrBackendType,
    #[source]
    pub cause: OcrError,
}

/// Available OCR backend types.
///
/// Closed set; the registry maps each identifier to one adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line.
    #[serde(rename = "tesseract")]
    Tesseract,
    /// ImageMagick preprocessing followed by Tesseract.
    #[serde(rename = "imagemagick_tesseract")]
    MagickTesseract,
    /// Pure Rust OCR engine (ocrs crate).
    #[serde(rename = "ocrs")]
    Ocrs,
    /// PaddleOCR via ONNX Runtime.
    #[serde(rename = "paddleocr")]
    PaddleOcr,
}

impl OcrBackendType {
    pub const ALL: [OcrBackendType; 4] = [
        OcrBackendType::Tesseract,
        OcrBackendType::MagickTesseract,
        OcrBackendType::Ocrs,
        OcrBackendType::PaddleOcr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::MagickTesseract => "imagemagick_tesseract",
            OcrBackendType::Ocrs => "ocrs",
            OcrBackendType::PaddleOcr => "paddleocr",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "imagemagick_tesseract" | "magick" | "imagemagick" => {
                Some(OcrBackendType::MagickTesseract)
            }
            "ocrs" => Some(OcrBackendType::Ocrs),
            "paddleocr" | "paddle" => Some(OcrBackendType::PaddleOcr),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One text region reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub text: String,
    /// Engine confidence on a 0-1 scale, if the engine reports one.
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Raw text recognized by one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean confidence of the detections that survived filtering.
    pub confidence: Option<f32>,
}

impl From<String> for Recognition {
    fn from(text: String) -> Self {
        Self {
            text,
            confidence: None,
        }
    }
}

/// Drop low-confidence detections and join the rest with newlines.
///
/// Detections without a score are kept. Reading order is the input order.
pub fn filter_detections<I>(detections: I) -> Recognition
where
    I: IntoIterator<Item = Detection>,
{
    let mut lines = Vec::new();
    let mut scores = Vec::new();

    for detection in detections {
        if let Some(score) = detection.confidence {
            if score.is_nan() || score < MIN_CONFIDENCE {
                continue;
            }
            scores.push(score);
        }
        let text = detection.text.trim();
        if !text.is_empty() {
            lines.push(text.to_string());
        }
    }

    let confidence = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f32>() / scores.len() as f32)
    };

    Recognition {
        text: lines.join("\n"),
        confidence,
    }
}

/// One engine's result for one page.
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Extracted text content.
    pub text: String,
    /// Confidence score (0.0 - 1.0), if available.
    pub confidence: Option<f32>,
    /// Which backend produced this result.
    pub backend: OcrBackendType,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

impl OcrResult {
    /// Length used for arbitration between engines.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Trait for OCR backends.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check the backend can run here, returning a version or description.
    ///
    /// Called once by the registry; an error excludes the backend.
    async fn probe(&self) -> Result<String, OcrError>;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Core OCR: extract text from a normalized page image.
    async fn run_ocr(&self, image: &NormalizedImage) -> Result<Recognition, OcrError>;

    /// Run OCR on a page image, returning a timed, trimmed result.
    async fn ocr_image(&self, image: &NormalizedImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let recognition = self.run_ocr(image).await?;
        Ok(OcrResult {
            text: recognition.text.trim().to_string(),
            confidence: recognition.confidence,
            backend: self.backend_type(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Configuration shared by OCR backends (language, models, time bounds).
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Language for OCR (e.g., "eng", "chi_sim").
    pub language: String,
    /// Path to model files (for backends that need them).
    pub model_path: Option<PathBuf>,
    /// Upper bound for one engine invocation on one page.
    pub timeout: Duration,
    /// Upper bound for an availability probe.
    pub probe_timeout: Duration,
    /// Restricts Tesseract's output alphabet when set.
    pub char_whitelist: Option<String>,
    /// Where engine scratch files go (system temp dir when unset).
    pub scratch_root: Option<PathBuf>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            model_path: None,
            timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(10),
            char_whitelist: None,
            scratch_root: None,
        }
    }
}
