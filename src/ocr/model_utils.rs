//! Shared utilities for OCR backends.
//!
//! Provides common functionality for:
//! - Locating OCR model files on disk
//! - Checking for CLI tool availability

// Model lookup is only reached from the feature-gated in-process engines.
#![cfg_attr(
    not(any(feature = "ocr-ocrs", feature = "ocr-paddle")),
    allow(dead_code)
)]

use std::path::{Path, PathBuf};

/// Install hint shown when Tesseract is missing.
pub const TESSERACT_NOT_FOUND: &str =
    "Tesseract not installed. Install with: apt install tesseract-ocr (or brew install tesseract)";

/// Install hint shown when ImageMagick is missing.
pub const MAGICK_NOT_FOUND: &str =
    "ImageMagick 7 not installed. Install with: apt install imagemagick (or brew install imagemagick)";

/// Install hint shown when ImageMagick cannot read PDFs.
pub const GHOSTSCRIPT_NOT_FOUND: &str =
    "Ghostscript not installed (ImageMagick needs it to read PDFs). Install with: apt install ghostscript (or brew install ghostscript)";

/// Install hint shown when pdftoppm is missing.
pub const PDFTOPPM_NOT_FOUND: &str =
    "pdftoppm not installed. Install with: apt install poppler-utils (or brew install poppler)";

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Configuration for model directory lookup.
pub struct ModelDirConfig {
    /// Subdirectory name under the data dir (e.g., "ocrs", "paddle-ocr").
    pub subdir: &'static str,
    /// Required model files to check for presence.
    pub required_files: &'static [&'static str],
}

impl ModelDirConfig {
    /// Get the default model directory for this backend.
    pub fn default_dir(&self) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("studybuddy")
            .join(self.subdir)
    }

    /// Get standard candidate directories to search for models.
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        [
            Some(self.default_dir()),
            dirs::data_dir().map(|d| d.join(self.subdir).join("models")),
            dirs::home_dir().map(|d| d.join(format!(".{}", self.subdir)).join("models")),
            Some(PathBuf::from(format!("/usr/share/{}/models", self.subdir))),
            Some(PathBuf::from("./models").join(self.subdir)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Check if a directory contains all required model files.
    pub fn has_required_files(&self, dir: &Path) -> bool {
        self.required_files
            .iter()
            .all(|file| dir.join(file).exists())
    }

    /// Files missing from `dir`.
    pub fn missing_files(&self, dir: &Path) -> Vec<&'static str> {
        self.required_files
            .iter()
            .copied()
            .filter(|file| !dir.join(file).exists())
            .collect()
    }
}

/// Find model directory by checking the configured path (and its
/// per-backend subdirectory) first, then standard locations.
pub fn find_model_dir(
    config_path: Option<&PathBuf>,
    model_config: &ModelDirConfig,
) -> Option<PathBuf> {
    if let Some(path) = config_path {
        for candidate in [path.join(model_config.subdir), path.clone()] {
            if model_config.has_required_files(&candidate) {
                return Some(candidate);
            }
        }
    }

    model_config
        .candidate_dirs()
        .into_iter()
        .find(|dir| model_config.has_required_files(dir))
}

/// Format availability hint for a model-based backend.
pub fn model_availability_hint(
    config_path: Option<&PathBuf>,
    model_config: &ModelDirConfig,
    backend_name: &str,
) -> String {
    match find_model_dir(config_path, model_config) {
        Some(path) => format!("{} models found at {:?}", backend_name, path),
        None if config_path.is_some_and(|p| p.is_dir()) => {
            let configured = config_path.cloned().unwrap_or_default();
            let subdir = configured.join(model_config.subdir);
            let dir = if subdir.is_dir() { subdir } else { configured };
            format!(
                "{} models incomplete in {:?}: missing {}",
                backend_name,
                dir,
                model_config.missing_files(&dir).join(", ")
            )
        }
        None => format!(
            "{} models not found. Place {} in {:?} or set STUDYBUDDY_MODEL_DIR",
            backend_name,
            model_config.required_files.join(", "),
            model_config.default_dir()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_MODELS: ModelDirConfig = ModelDirConfig {
        subdir: "test-engine",
        required_files: &["det.onnx", "rec.onnx"],
    };

    #[test]
    fn test_find_model_dir_in_config_subdir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("test-engine");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("det.onnx"), b"x").unwrap();
        std::fs::write(dir.join("rec.onnx"), b"x").unwrap();

        let root = temp.path().to_path_buf();
        assert_eq!(find_model_dir(Some(&root), &TEST_MODELS), Some(dir));
    }

    #[test]
    fn test_missing_files_listed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("det.onnx"), b"x").unwrap();
        assert_eq!(TEST_MODELS.missing_files(temp.path()), vec!["rec.onnx"]);
        assert!(!TEST_MODELS.has_required_files(temp.path()));
    }

    #[test]
    fn test_hint_mentions_required_files_when_missing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let hint = model_availability_hint(Some(&root), &TEST_MODELS, "Test");
        if find_model_dir(Some(&root), &TEST_MODELS).is_none() {
            assert!(hint.contains("det.onnx, rec.onnx"));
        }
    }
}
