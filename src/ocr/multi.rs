//! Per-page multi-engine extraction and arbitration.

use std::time::Duration;

use tracing::{debug, warn};

use super::backend::{EngineExtractionFailed, OcrBackendType, OcrError, OcrResult};
use super::page::NormalizedImage;
use super::registry::EngineAvailability;
use crate::models::PageResult;

/// Runs every available engine on a page and keeps the best text.
#[derive(Debug, Clone)]
pub struct MultiEngineExtractor {
    engine_timeout: Duration,
}

impl Default for MultiEngineExtractor {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl MultiEngineExtractor {
    pub fn new(engine_timeout: Duration) -> Self {
        Self { engine_timeout }
    }

    /// Extract one page. Engine failures are logged and never returned.
    pub async fn extract_page(
        &self,
        image: &NormalizedImage,
        availability: &EngineAvailability,
        page_number: usize,
    ) -> PageResult {
        self.extract_page_tracked(image, availability, page_number, &mut Vec::new())
            .await
    }

    /// Like [`extract_page`](Self::extract_page), skipping engines in
    /// `timed_out` and adding any engine that times out on this page.
    ///
    /// A timed-out in-process engine keeps running on its blocking worker,
    /// so calling it again would only queue behind the stuck call.
    pub async fn extract_page_tracked(
        &self,
        image: &NormalizedImage,
        availability: &EngineAvailability,
        page_number: usize,
        timed_out: &mut Vec<OcrBackendType>,
    ) -> PageResult {
        let mut candidates = Vec::new();
        let mut failed = Vec::new();

        for engine in availability.engines() {
            let backend = engine.backend_type();
            if timed_out.contains(&backend) {
                debug!("page {}: skipping {} after earlier timeout", page_number, backend);
                failed.push(backend);
                continue;
            }

            let run = tokio::time::timeout(self.engine_timeout, engine.ocr_image(image));
            let outcome = match run.await {
                Ok(result) => result,
                Err(_) => Err(OcrError::Timeout(self.engine_timeout)),
            };

            match outcome {
                Ok(result) => {
                    debug!(
                        "page {}: {} produced {} chars in {}ms",
                        page_number,
                        backend,
                        result.char_count(),
                        result.processing_time_ms
                    );
                    candidates.push(result);
                }
                Err(cause) => {
                    if matches!(cause, OcrError::Timeout(_)) {
                        timed_out.push(backend);
                    }
                    let failure = EngineExtractionFailed {
                        engine: backend,
                        cause,
                    };
                    warn!("page {}: {}", page_number, failure);
                    failed.push(backend);
                }
            }
        }

        let mut page = PageResult::empty(page_number);
        page.failed_engines = failed;

        match arbitrate(candidates) {
            Some(best) if best.char_count() > 0 => {
                debug!(
                    "page {}: {} won with {} chars",
                    page_number,
                    best.backend,
                    best.char_count()
                );
                page.engine = Some(best.backend);
                page.confidence = best.confidence;
                page.text = best.text;
            }
            _ => warn!("page {}: no engine extracted any text", page_number),
        }

        page
    }
}

/// Pick the candidate with the most characters.
///
/// Candidates are in registry order; a later one must be strictly longer
/// to displace the current best.
pub fn arbitrate(candidates: Vec<OcrResult>) -> Option<OcrResult> {
    let mut best: Option<OcrResult> = None;
    for candidate in candidates {
        let longer = best
            .as_ref()
            .map_or(true, |b| candidate.char_count() > b.char_count());
        if longer {
            best = Some(candidate);
        }
    }
    best
}
