//! OCRS OCR backend implementation.
//!
//! Uses the ocrs crate for pure-Rust OCR without external binaries.
//! This is a lightweight, CPU-based OCR engine. Model files are looked up
//! locally; download them once from
//! https://ocrs-models.s3-accelerate.amazonaws.com/

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, Recognition};
use super::model_utils::{find_model_dir, model_availability_hint, ModelDirConfig};
use super::page::NormalizedImage;

/// Model directory configuration for OCRS.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "ocrs",
    required_files: &["text-detection.rten", "text-recognition.rten"],
};

/// OCRS OCR backend (pure Rust).
pub struct OcrsBackend {
    config: OcrConfig,
    /// Initialized on first probe or use, then reused for every page.
    engine: OnceLock<Arc<ocrs::OcrEngine>>,
}

impl OcrsBackend {
    /// Create a new OCRS backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    /// Create a new OCRS backend with custom configuration.
    pub fn with_config(config: OcrConfig) -> Self {
        Self {
            config,
            engine: OnceLock::new(),
        }
    }

    fn model_dir(&self) -> Result<PathBuf, OcrError> {
        find_model_dir(self.config.model_path.as_ref(), &MODEL_CONFIG).ok_or_else(|| {
            OcrError::ModelNotFound(model_availability_hint(
                self.config.model_path.as_ref(),
                &MODEL_CONFIG,
                "OCRS",
            ))
        })
    }

    /// Get the cached engine, loading the models on a blocking worker first time.
    async fn engine(&self) -> Result<Arc<ocrs::OcrEngine>, OcrError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }

        let model_dir = self.model_dir()?;
        let engine = tokio::task::spawn_blocking(move || load_engine(&model_dir))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("OCRS model loader panicked: {}", e)))??;

        // If another caller won the race, use theirs.
        Ok(self.engine.get_or_init(|| Arc::new(engine)).clone())
    }
}

fn load_engine(model_dir: &Path) -> Result<ocrs::OcrEngine, OcrError> {
    let detection_model = rten::Model::load_file(model_dir.join("text-detection.rten"))
        .map_err(|e| OcrError::OcrFailed(format!("Failed to load detection model: {}", e)))?;
    let recognition_model = rten::Model::load_file(model_dir.join("text-recognition.rten"))
        .map_err(|e| OcrError::OcrFailed(format!("Failed to load recognition model: {}", e)))?;

    ocrs::OcrEngine::new(ocrs::OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })
    .map_err(|e| OcrError::OcrFailed(format!("Failed to create OCR engine: {}", e)))
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn recognize(engine: &ocrs::OcrEngine, image: &image::RgbImage) -> Result<String, OcrError> {
    let (width, height) = image.dimensions();
    let source = ocrs::ImageSource::from_bytes(image.as_raw(), (width, height))
        .map_err(|e| OcrError::ImageError(format!("Failed to convert image: {}", e)))?;
    let input = engine
        .prepare_input(source)
        .map_err(|e| OcrError::OcrFailed(format!("Failed to prepare input: {}", e)))?;
    engine
        .get_text(&input)
        .map_err(|e| OcrError::OcrFailed(format!("Failed to extract text: {}", e)))
}

#[async_trait]
impl OcrBackend for OcrsBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Ocrs
    }

    async fn probe(&self) -> Result<String, OcrError> {
        let dir = self.model_dir()?;
        self.engine().await?;
        Ok(format!("ocrs (models at {})", dir.display()))
    }

    fn availability_hint(&self) -> String {
        model_availability_hint(self.config.model_path.as_ref(), &MODEL_CONFIG, "OCRS")
    }

    async fn run_ocr(&self, image: &NormalizedImage) -> Result<Recognition, OcrError> {
        let engine = self.engine().await?;
        let pixels = image.pixels().clone();

        let text = tokio::task::spawn_blocking(move || recognize(&engine, &pixels))
            .await
            .map_err(|e| OcrError::OcrFailed(format!("OCRS worker panicked: {}", e)))??;

        Ok(Recognition::from(text))
    }
}
