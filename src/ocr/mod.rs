//! OCR extraction pipeline.
//!
//! PDF bytes flow one way through the pipeline:
//! - rasterization (pdftoppm, falling back to ImageMagick) into page images
//! - preprocessing (contrast, sharpness, median denoise)
//! - every available OCR engine per page, longest text wins
//! - page texts joined with `--- Page N ---` markers
//!
//! ## OCR Backends
//!
//! - **Tesseract**: CLI, TSV output with per-line confidence (default)
//! - **ImageMagick + Tesseract**: `magick` cleanup pass, then Tesseract (default)
//! - **OCRS**: pure Rust OCR, no external binaries (feature: ocr-ocrs)
//! - **PaddleOCR**: CNN-based via ONNX Runtime (feature: ocr-paddle)
//!
//! Backends are probed once by [`EngineRegistry`]; the usable subset is an
//! immutable [`EngineAvailability`].

mod backend;
mod extractor;
mod magick;
mod model_utils;
mod multi;
mod page;
mod preprocess;
mod process;
mod rasterize;
mod registry;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;
#[cfg(feature = "ocr-paddle")]
mod paddle_backend;

pub use backend::{
    filter_detections, Detection, EngineExtractionFailed, OcrBackend, OcrBackendType, OcrConfig,
    OcrError, OcrResult, Recognition, MIN_CONFIDENCE,
};
pub use extractor::{DocumentExtractor, ExtractionError, ExtractionOptions};
pub use magick::MagickTesseractBackend;
pub use model_utils::check_binary;
pub use multi::{arbitrate, MultiEngineExtractor};
pub use page::{NormalizedImage, PageImage};
pub use preprocess::{ImagePreprocessor, PreprocessConfig, PreprocessError};
pub use process::{scratch_dir, ToolError};
pub use rasterize::{
    collect_page_files, ImageRasterizer, MagickRasterizer, PdftoppmRasterizer, RasterizeError,
    Rasterizer, RasterizerConfig, RasterizerKind,
};
pub use registry::{
    BackendRejection, BackendRole, EngineAvailability, EngineRegistry, ProbeOutcome, RegistryError,
};
pub use tesseract::{parse_tsv, TesseractBackend};

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
pub use paddle_backend::PaddleBackend;
