//! PaddleOCR backend implementation.
//!
//! Uses paddle-ocr-rs for OCR via ONNX Runtime. Each detected text block
//! carries a recognition score, so low-confidence blocks are dropped
//! before the page text is assembled.
//!
//! Models come from https://github.com/RapidAI/RapidOCR and must be
//! present locally.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use paddle_ocr_rs::ocr_lite::OcrLite;

use super::backend::{
    filter_detections, Detection, OcrBackend, OcrBackendType, OcrConfig, OcrError, Recognition,
};
use super::model_utils::{find_model_dir, model_availability_hint, ModelDirConfig};
use super::page::NormalizedImage;
use super::process::scratch_dir;

const DET_MODEL_NAME: &str = "ch_PP-OCRv4_det_infer.onnx";
const REC_MODEL_NAME: &str = "ch_PP-OCRv4_rec_infer.onnx";
const CLS_MODEL_NAME: &str = "ch_ppocr_mobile_v2.0_cls_infer.onnx";

/// Model directory configuration for PaddleOCR.
const MODEL_CONFIG: ModelDirConfig = ModelDirConfig {
    subdir: "paddle-ocr",
    required_files: &[DET_MODEL_NAME, REC_MODEL_NAME, CLS_MODEL_NAME],
};

/// Inference threads handed to ONNX Runtime.
const NUM_THREADS: usize = 4;

/// PaddleOCR backend via ONNX Runtime.
pub struct PaddleBackend {
    config: OcrConfig,
    /// `detect_from_path` needs `&mut self`, hence the mutex.
    engine: OnceLock<Arc<Mutex<OcrLite>>>,
}

impl PaddleBackend {
    /// Create a new PaddleOCR backend with default configuration.
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    /// Create a new PaddleOCR backend with custom configuration.
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
                "PaddleOCR",
            ))
        })
    }

    /// Get the cached engine, loading the models on a blocking worker first time.
    async fn engine(&self) -> Result<Arc<Mutex<OcrLite>>, OcrError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.clone());
        }

        let dir = self.model_dir()?;
        let ocr = tokio::task::spawn_blocking(move || load_engine(&dir))
            .await
            .map_err(|e| {
                OcrError::OcrFailed(format!("PaddleOCR model loader panicked: {}", e))
            })??;

        Ok(self.engine.get_or_init(|| Arc::new(Mutex::new(ocr))).clone())
    }
}

fn load_engine(dir: &Path) -> Result<OcrLite, OcrError> {
    let path = |name: &str| dir.join(name).to_string_lossy().to_string();

    let mut ocr = OcrLite::new();
    ocr.init_models(
        &path(DET_MODEL_NAME),
        &path(CLS_MODEL_NAME),
        &path(REC_MODEL_NAME),
        NUM_THREADS,
    )
    .map_err(|e| OcrError::OcrFailed(format!("Failed to init PaddleOCR: {}", e)))?;
    Ok(ocr)
}

impl Default for PaddleBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn detect(engine: &Mutex<OcrLite>, image_path: &Path) -> Result<Vec<Detection>, OcrError> {
    let mut ocr = engine
        .lock()
        .map_err(|e| OcrError::OcrFailed(format!("Failed to lock OCR engine: {}", e)))?;

    let path = image_path
        .to_str()
        .ok_or_else(|| OcrError::OcrFailed("scratch path is not valid UTF-8".to_string()))?;

    let result = ocr
        .detect_from_path(
            path,
            50,    // padding
            1024,  // max side length
            0.5,   // box score threshold
            0.3,   // box threshold
            1.6,   // unclip ratio
            true,  // do angle
            false, // most angle
        )
        .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR detection failed: {}", e)))?;

    Ok(result
        .text_blocks
        .iter()
        .map(|block| Detection::new(block.text.clone(), Some(block.text_score)))
        .collect())
}

#[async_trait]
impl OcrBackend for PaddleBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::PaddleOcr
    }

    async fn probe(&self) -> Result<String, OcrError> {
        let dir = self.model_dir()?;
        self.engine().await?;
        Ok(format!("paddle-ocr-rs (models at {})", dir.display()))
    }

    fn availability_hint(&self) -> String {
        model_availability_hint(self.config.model_path.as_ref(), &MODEL_CONFIG, "PaddleOCR")
    }

    /// A call abandoned by the engine timeout keeps the worker and the
    /// engine lock until detection returns; later pages of the same
    /// document skip this engine instead of queueing behind it.
    async fn run_ocr(&self, image: &NormalizedImage) -> Result<Recognition, OcrError> {
        let engine = self.engine().await?;
        let scratch = scratch_dir(self.config.scratch_root.as_deref())?;
        let image_path = scratch.path().join("page.png");
        image.save_png(&image_path)?;

        // The scratch guard moves into the worker so the file outlives detection.
        let detections = tokio::task::spawn_blocking(move || {
            let detections = detect(&engine, &image_path);
            drop(scratch);
            detections
        })
        .await
        .map_err(|e| OcrError::OcrFailed(format!("PaddleOCR worker panicked: {}", e)))??;

        Ok(filter_detections(detections))
    }
}
