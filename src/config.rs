//! Configuration management for studybuddy using the prefer crate.
//!
//! A config file is optional. When present it may be TOML, YAML or JSON;
//! every field has a default. Environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::EmptyPagePolicy;
use crate::ocr::{ExtractionOptions, OcrConfig, PreprocessConfig, RasterizerConfig};

/// Rasterization resolution override.
pub const ENV_DPI: &str = "STUDYBUDDY_DPI";
/// Comma-separated OCR engine list override.
pub const ENV_OCR_ENGINES: &str = "STUDYBUDDY_OCR_ENGINES";
/// Per-engine timeout override, in seconds.
pub const ENV_ENGINE_TIMEOUT: &str = "STUDYBUDDY_ENGINE_TIMEOUT";
/// Model directory override for in-process engines.
pub const ENV_MODEL_DIR: &str = "STUDYBUDDY_MODEL_DIR";

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("Unsupported config format {} (expected .toml, .yaml, .yml or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// `[extraction]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub dpi: u32,
    pub empty_pages: EmptyPagePolicy,
    pub engine_timeout_secs: u64,
    pub rasterizer_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    /// Parent directory for scratch files; system temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            empty_pages: EmptyPagePolicy::Omit,
            engine_timeout_secs: 120,
            rasterizer_timeout_secs: 300,
            probe_timeout_secs: 10,
            scratch_dir: None,
        }
    }
}

/// `[engines]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Candidate OCR engines in registry order.
    pub enabled: Vec<String>,
    /// Tesseract language code.
    pub language: String,
    /// Model directory for ocrs / PaddleOCR.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<String>,
    /// Characters Tesseract may emit (`tessedit_char_whitelist`); unrestricted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_whitelist: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: ["tesseract", "imagemagick_tesseract", "ocrs", "paddleocr"]
                .map(String::from)
                .to_vec(),
            language: "eng".to_string(),
            model_dir: None,
            char_whitelist: None,
        }
    }
}

/// `[rasterizers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerSettings {
    /// Rasterizers in preference order.
    pub order: Vec<String>,
}

impl Default for RasterizerSettings {
    fn default() -> Self {
        Self {
            order: vec!["pdftoppm".to_string(), "imagemagick".to_string()],
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub extraction: ExtractionSettings,
    pub preprocess: PreprocessConfig,
    pub engines: EngineSettings,
    pub rasterizers: RasterizerSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `explicit`, or from a discovered studybuddy config
    /// file, then apply environment overrides.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match explicit {
            Some(path) => Self::load_from_path(path).await?,
            None => Self::discover().await,
        };
        let settings = settings.with_env_overrides(|var| std::env::var(var).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    async fn discover() -> Self {
        match prefer::load("studybuddy").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(settings) => settings,
                        Err(e) => {
                            warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => {
                debug!("No studybuddy config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load settings from a specific file, choosing the format by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let mut settings: Settings = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "json" => {
                serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?
            }
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };

        settings.source_path = Some(path.to_path_buf());
        debug!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Apply `STUDYBUDDY_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_DPI) {
            self.extraction.dpi = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_DPI,
                value: value.clone(),
            })?;
        }
        if let Some(value) = get(ENV_OCR_ENGINES) {
            self.engines.enabled = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = get(ENV_ENGINE_TIMEOUT) {
            self.extraction.engine_timeout_secs =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_ENGINE_TIMEOUT,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = get(ENV_MODEL_DIR) {
            self.engines.model_dir = Some(value);
        }

        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extraction.dpi == 0 {
            return Err(ConfigError::Invalid("extraction.dpi must be positive".into()));
        }
        let timeouts = [
            ("extraction.engine_timeout_secs", self.extraction.engine_timeout_secs),
            ("extraction.rasterizer_timeout_secs", self.extraction.rasterizer_timeout_secs),
            ("extraction.probe_timeout_secs", self.extraction.probe_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{} must be positive", name)));
        }
        if self.engines.enabled.is_empty() {
            return Err(ConfigError::Invalid("engines.enabled is empty".into()));
        }
        if self.rasterizers.order.is_empty() {
            return Err(ConfigError::Invalid("rasterizers.order is empty".into()));
        }
        Ok(())
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Expand `~` and resolve relative paths against the config file location.
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    fn scratch_root(&self) -> Option<PathBuf> {
        self.extraction
            .scratch_dir
            .as_deref()
            .map(|dir| self.resolve_path(dir))
    }

    /// Settings handed to every OCR engine adapter.
    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.engines.language.clone(),
            model_path: self
                .engines
                .model_dir
                .as_deref()
                .map(|dir| self.resolve_path(dir)),
            timeout: Duration::from_secs(self.extraction.engine_timeout_secs),
            probe_timeout: Duration::from_secs(self.extraction.probe_timeout_secs),
            char_whitelist: self.engines.char_whitelist.clone(),
            scratch_root: self.scratch_root(),
        }
    }

    pub fn rasterizer_config(&self) -> RasterizerConfig {
        RasterizerConfig {
            timeout: Duration::from_secs(self.extraction.rasterizer_timeout_secs),
            probe_timeout: Duration::from_secs(self.extraction.probe_timeout_secs),
        }
    }

    pub fn extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            dpi: self.extraction.dpi,
            empty_pages: self.extraction.empty_pages,
            engine_timeout: Duration::from_secs(self.extraction.engine_timeout_secs),
            scratch_root: self.scratch_root(),
        }
    }
}
