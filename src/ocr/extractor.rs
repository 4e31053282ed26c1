//! Document-level extraction: rasterize, normalize, OCR every page, join.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use super::multi::MultiEngineExtractor;
use super::preprocess::ImagePreprocessor;
use super::rasterize::{ImageRasterizer, RasterizeError, RasterizerKind};
use super::registry::{EngineAvailability, EngineRegistry, RegistryError};
use crate::config::Settings;
use crate::models::{Document, EmptyPagePolicy, ExtractedDocument, StudyInputs};

/// Errors that abort a whole document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Rasterization failed (last tried {backend}): {source}")]
    RasterizationFailed {
        backend: RasterizerKind,
        #[source]
        source: RasterizeError,
    },

    #[error("Failed to stage document: {0}")]
    Staging(#[source] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Per-document extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Rasterization resolution, shared by every page of a document.
    pub dpi: u32,
    pub empty_pages: EmptyPagePolicy,
    /// Upper bound for one engine on one page.
    pub engine_timeout: Duration,
    /// Where staging directories go (system temp dir when unset).
    pub scratch_root: Option<PathBuf>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            empty_pages: EmptyPagePolicy::Omit,
            engine_timeout: Duration::from_secs(120),
            scratch_root: None,
        }
    }
}

/// The full PDF-to-text pipeline.
///
/// Holds a shared, read-only [`EngineAvailability`]; one extractor can
/// serve concurrent documents.
pub struct DocumentExtractor {
    availability: Arc<EngineAvailability>,
    rasterizer: ImageRasterizer,
    preprocessor: ImagePreprocessor,
    multi: MultiEngineExtractor,
    options: ExtractionOptions,
}

impl DocumentExtractor {
    pub fn new(
        availability: Arc<EngineAvailability>,
        preprocessor: ImagePreprocessor,
        options: ExtractionOptions,
    ) -> Self {
        let rasterizer = ImageRasterizer::new(availability.rasterizers().to_vec())
            .with_scratch_root(options.scratch_root.clone());
        let multi = MultiEngineExtractor::new(options.engine_timeout);
        Self {
            availability,
            rasterizer,
            preprocessor,
            multi,
            options,
        }
    }

    /// Probe the configured backends and build the pipeline.
    pub async fn from_settings(settings: &Settings) -> Result<Self, RegistryError> {
        let registry = EngineRegistry::from_names(
            settings.engines.enabled.as_slice(),
            settings.rasterizers.order.as_slice(),
            &settings.ocr_config(),
            &settings.rasterizer_config(),
        );
        let availability = registry.detect().await?;

        Ok(Self::new(
            Arc::new(availability),
            ImagePreprocessor::new(settings.preprocess.clone()),
            settings.extraction_options(),
        ))
    }

    pub fn availability(&self) -> &EngineAvailability {
        &self.availability
    }

    /// Same pipeline, different engine set (e.g. a `--engines` restriction).
    pub fn with_availability(self, availability: EngineAvailability) -> Self {
        Self::new(Arc::new(availability), self.preprocessor, self.options)
    }

    /// Extract the text of every page of `document`.
    pub async fn extract(&self, document: &Document) -> Result<ExtractedDocument, ExtractionError> {
        self.extract_with_progress(document, |_, _| {}).await
    }

    /// Like [`extract`](Self::extract), calling `progress(done, total)` after each page.
    pub async fn extract_with_progress<F>(
        &self,
        document: &Document,
        mut progress: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(usize, usize),
    {
        let images = self.rasterizer.rasterize(document, self.options.dpi).await?;
        let total = images.len();
        let mut pages = Vec::with_capacity(total);
        // Engines that timed out sit out the rest of this document.
        let mut timed_out = Vec::new();

        for (index, image) in images.into_iter().enumerate() {
            let normalized = self.preprocessor.preprocess(image);
            let page = self
                .multi
                .extract_page_tracked(&normalized, &self.availability, index + 1, &mut timed_out)
                .await;
            pages.push(page);
            progress(index + 1, total);
        }

        let extracted = ExtractedDocument::new(document.name(), pages, self.options.empty_pages);
        let with_text = extracted.pages.iter().filter(|p| !p.is_empty()).count();
        info!(
            "Extracted {}: {}/{} page(s) with text",
            document.name(),
            with_text,
            total
        );

        Ok(extracted)
    }

    /// Extract lecture notes and past exams into the summarizer's input pair.
    pub async fn extract_pair(
        &self,
        lecture_notes: &Document,
        past_exams: &Document,
    ) -> Result<StudyInputs, ExtractionError> {
        let notes = self.extract(lecture_notes).await?;
        let exams = self.extract(past_exams).await?;
        Ok(StudyInputs {
            lecture_notes: notes.text(),
            past_exams: exams.text(),
        })
    }
}
