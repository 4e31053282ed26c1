//! ImageMagick + Tesseract OCR backend.
//!
//! Runs an ImageMagick cleanup pass (sharpen, contrast stretch) over the
//! page image before handing it to Tesseract, which writes plain text to
//! a file. Tesseract reports no confidence in this mode.

use async_trait::async_trait;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, Recognition};
use super::model_utils::{check_binary, MAGICK_NOT_FOUND, TESSERACT_NOT_FOUND};
use super::page::NormalizedImage;
use super::process::{probe_version, run_tool, scratch_dir, tool_command, ToolError};

/// ImageMagick preprocessing followed by Tesseract.
pub struct MagickTesseractBackend {
    config: OcrConfig,
}

impl MagickTesseractBackend {
    pub fn new() -> Self {
        Self {
            config: OcrConfig::default(),
        }
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }
}

impl Default for MagickTesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found_hint(e: ToolError) -> OcrError {
    match e {
        ToolError::NotFound { ref tool } if tool == "magick" => {
            OcrError::BackendNotAvailable(MAGICK_NOT_FOUND.to_string())
        }
        ToolError::NotFound { .. } => {
            OcrError::BackendNotAvailable(TESSERACT_NOT_FOUND.to_string())
        }
        other => OcrError::Tool(other),
    }
}

#[async_trait]
impl OcrBackend for MagickTesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::MagickTesseract
    }

    async fn probe(&self) -> Result<String, OcrError> {
        let magick = probe_version("magick", "--version", self.config.probe_timeout)
            .await
            .map_err(not_found_hint)?;
        let tesseract = probe_version("tesseract", "--version", self.config.probe_timeout)
            .await
            .map_err(not_found_hint)?;
        Ok(format!("{} + {}", magick, tesseract))
    }

    fn availability_hint(&self) -> String {
        if !check_binary("magick") {
            MAGICK_NOT_FOUND.to_string()
        } else if !check_binary("tesseract") {
            TESSERACT_NOT_FOUND.to_string()
        } else {
            "ImageMagick + Tesseract is available".to_string()
        }
    }

    async fn run_ocr(&self, image: &NormalizedImage) -> Result<Recognition, OcrError> {
        let scratch = scratch_dir(self.config.scratch_root.as_deref())?;
        let input = scratch.path().join("page.png");
        let processed = scratch.path().join("page_processed.png");
        let text_base = scratch.path().join("page_text");
        image.save_png(&input)?;

        let mut magick = tool_command("magick");
        magick
            .arg(&input)
            .args(["-density", "300", "-quality", "100"])
            .args(["-sharpen", "0x1", "-contrast-stretch", "0.15x0.05%"])
            .arg(&processed);
        run_tool(&mut magick, "magick", self.config.timeout)
            .await
            .map_err(not_found_hint)?;

        let mut tesseract = tool_command("tesseract");
        tesseract
            .arg(&processed)
            .arg(&text_base)
            .args(["--oem", "3", "--psm", "6"])
            .args(["-l", &self.config.language]);
        run_tool(&mut tesseract, "tesseract", self.config.timeout)
            .await
            .map_err(not_found_hint)?;

        let text_path = text_base.with_extension("txt");
        let text = tokio::fs::read_to_string(&text_path).await.map_err(|e| {
            OcrError::MalformedOutput(format!("tesseract wrote no text file: {}", e))
        })?;

        Ok(Recognition::from(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_magick_maps_to_install_hint() {
        let err = not_found_hint(ToolError::NotFound {
            tool: "magick".to_string(),
        });
        match err {
            OcrError::BackendNotAvailable(hint) => assert!(hint.contains("ImageMagick")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_tesseract_maps_to_install_hint() {
        let err = not_found_hint(ToolError::NotFound {
            tool: "tesseract".to_string(),
        });
        assert!(matches!(err, OcrError::BackendNotAvailable(h) if h.contains("tesseract-ocr")));
    }
}
