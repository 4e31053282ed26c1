//! Backend discovery.
//!
//! Candidate engines and rasterizers are built from configured names, then
//! probed once. The survivors form an [`EngineAvailability`], which is
//! immutable and shared by every extraction afterwards.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::{OcrBackend, OcrBackendType, OcrConfig};
use super::magick::MagickTesseractBackend;
use super::rasterize::{
    MagickRasterizer, PdftoppmRasterizer, Rasterizer, RasterizerConfig, RasterizerKind,
};
use super::tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
use super::ocrs_backend::OcrsBackend;
#[cfg(feature = "ocr-paddle")]
use super::paddle_backend::PaddleBackend;

/// Why a backend was left out of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRejection {
    pub backend: String,
    pub reason: String,
    pub hint: String,
}

impl std::fmt::Display for BackendRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.reason)
    }
}

fn join_rejections(rejected: &[BackendRejection]) -> String {
    if rejected.is_empty() {
        return "none configured".to_string();
    }
    rejected
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fatal errors at pipeline construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No OCR engine available ({})", join_rejections(rejected))]
    NoEnginesAvailable { rejected: Vec<BackendRejection> },

    #[error("No PDF rasterizer available ({})", join_rejections(rejected))]
    NoRasterizerAvailable { rejected: Vec<BackendRejection> },
}

impl RegistryError {
    pub fn rejected(&self) -> &[BackendRejection] {
        match self {
            RegistryError::NoEnginesAvailable { rejected }
            | RegistryError::NoRasterizerAvailable { rejected } => rejected,
        }
    }
}

/// The usable engines and rasterizers, in preference order.
///
/// Always holds at least one of each.
#[derive(Clone)]
pub struct EngineAvailability {
    engines: Vec<Arc<dyn OcrBackend>>,
    rasterizers: Vec<Arc<dyn Rasterizer>>,
}

impl EngineAvailability {
    /// Build from already-constructed backends without probing them.
    pub fn from_parts(
        engines: Vec<Arc<dyn OcrBackend>>,
        rasterizers: Vec<Arc<dyn Rasterizer>>,
    ) -> Result<Self, RegistryError> {
        if rasterizers.is_empty() {
            return Err(RegistryError::NoRasterizerAvailable {
                rejected: Vec::new(),
            });
        }
        if engines.is_empty() {
            return Err(RegistryError::NoEnginesAvailable {
                rejected: Vec::new(),
            });
        }
        Ok(Self {
            engines,
            rasterizers,
        })
    }

    pub fn engines(&self) -> &[Arc<dyn OcrBackend>] {
        &self.engines
    }

    pub fn rasterizers(&self) -> &[Arc<dyn Rasterizer>] {
        &self.rasterizers
    }

    pub fn engine_types(&self) -> Vec<OcrBackendType> {
        self.engines.iter().map(|e| e.backend_type()).collect()
    }

    /// Keep only the listed engines, preserving registry order.
    pub fn restrict(&self, allowed: &[OcrBackendType]) -> Result<Self, RegistryError> {
        let engines: Vec<_> = self
            .engines
            .iter()
            .filter(|e| allowed.contains(&e.backend_type()))
            .cloned()
            .collect();

        if engines.is_empty() {
            let rejected = allowed
                .iter()
                .map(|t| BackendRejection {
                    backend: t.to_string(),
                    reason: "not detected on this host".to_string(),
                    hint: "run `studybuddy check` to see available engines".to_string(),
                })
                .collect();
            return Err(RegistryError::NoEnginesAvailable { rejected });
        }

        Ok(Self {
            engines,
            rasterizers: self.rasterizers.clone(),
        })
    }
}

impl std::fmt::Debug for EngineAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAvailability")
            .field("engines", &self.engine_types())
            .field(
                "rasterizers",
                &self.rasterizers.iter().map(|r| r.kind()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Whether a probed backend is an OCR engine or a rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendRole {
    Rasterizer,
    Engine,
}

/// Result of probing one candidate backend.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub name: String,
    pub role: BackendRole,
    /// Version string on success, failure reason otherwise.
    pub status: Result<String, String>,
    pub hint: String,
}

impl ProbeOutcome {
    pub fn is_available(&self) -> bool {
        self.status.is_ok()
    }

    fn rejection(&self) -> Option<BackendRejection> {
        self.status.as_ref().err().map(|reason| BackendRejection {
            backend: self.name.clone(),
            reason: reason.clone(),
            hint: self.hint.clone(),
        })
    }
}

/// Default upper bound for one availability probe.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one probe under `timeout`, flattening the result to a status.
async fn bounded_probe<F, E>(name: &str, timeout: Duration, probe: F) -> Result<String, String>
where
    F: std::future::Future<Output = Result<String, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!(
            "{} probe timed out after {}s",
            name,
            timeout.as_secs_f32()
        )),
    }
}

/// Candidate backends awaiting probing.
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrBackend>>,
    rasterizers: Vec<Arc<dyn Rasterizer>>,
    /// Known names that cannot be built in this binary.
    unbuildable: Vec<ProbeOutcome>,
    probe_timeout: Duration,
}

impl EngineRegistry {
    /// Use the given candidates as-is, in order.
    pub fn new(engines: Vec<Arc<dyn OcrBackend>>, rasterizers: Vec<Arc<dyn Rasterizer>>) -> Self {
        Self {
            engines,
            rasterizers,
            unbuildable: Vec::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Bound every probe, including in-process model loading, by `timeout`.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Build candidates from configured names. Unknown names are skipped.
    pub fn from_names<S: AsRef<str>>(
        engine_names: &[S],
        rasterizer_names: &[S],
        ocr_config: &OcrConfig,
        rasterizer_config: &RasterizerConfig,
    ) -> Self {
        let mut registry =
            Self::new(Vec::new(), Vec::new()).with_probe_timeout(ocr_config.probe_timeout);

        for name in rasterizer_names {
            let name = name.as_ref();
            match RasterizerKind::from_str(name) {
                Some(kind) if registry.rasterizers.iter().any(|r| r.kind() == kind) => {
                    debug!("Rasterizer {} listed twice, ignoring repeat", kind);
                }
                Some(kind) => registry
                    .rasterizers
                    .push(create_rasterizer(kind, rasterizer_config)),
                None => warn!("Unknown rasterizer '{}' in configuration", name),
            }
        }

        for name in engine_names {
            let name = name.as_ref();
            let Some(backend_type) = OcrBackendType::from_str(name) else {
                warn!("Unknown OCR engine '{}' in configuration", name);
                continue;
            };
            let listed = registry
                .engines
                .iter()
                .any(|e| e.backend_type() == backend_type)
                || registry.unbuildable.iter().any(|o| o.name == backend_type.as_str());
            if listed {
                debug!("OCR engine {} listed twice, ignoring repeat", backend_type);
                continue;
            }
            match create_engine(backend_type, ocr_config) {
                Ok(engine) => registry.engines.push(engine),
                Err(outcome) => registry.unbuildable.push(outcome),
            }
        }

        registry
    }

    /// Probe every candidate once, in order, each under the probe timeout.
    pub async fn probe_all(&self) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::new();

        for rasterizer in &self.rasterizers {
            let name = rasterizer.kind().to_string();
            let status = bounded_probe(&name, self.probe_timeout, rasterizer.probe()).await;
            outcomes.push(ProbeOutcome {
                name,
                role: BackendRole::Rasterizer,
                status,
                hint: rasterizer.availability_hint(),
            });
        }

        for engine in &self.engines {
            let name = engine.backend_type().to_string();
            let status = bounded_probe(&name, self.probe_timeout, engine.probe()).await;
            outcomes.push(ProbeOutcome {
                name,
                role: BackendRole::Engine,
                status,
                hint: engine.availability_hint(),
            });
        }
        outcomes.extend(self.unbuildable.iter().cloned());

        outcomes
    }

    /// Probe all candidates and keep the usable ones.
    pub async fn detect(&self) -> Result<EngineAvailability, RegistryError> {
        let outcomes = self.probe_all().await;

        for outcome in &outcomes {
            match &outcome.status {
                Ok(version) => info!("Detected {}: {}", outcome.name, version),
                Err(reason) => warn!(
                    "{} unavailable: {} ({})",
                    outcome.name, reason, outcome.hint
                ),
            }
        }

        self.select(&outcomes)
    }

    /// Keep the candidates that `outcomes` (from [`probe_all`](Self::probe_all))
    /// report as usable, without probing again.
    pub fn select(&self, outcomes: &[ProbeOutcome]) -> Result<EngineAvailability, RegistryError> {
        let usable = |name: &str| {
            outcomes
                .iter()
                .any(|o| o.name == name && o.is_available())
        };
        let rejected = |role: BackendRole| -> Vec<BackendRejection> {
            outcomes
                .iter()
                .filter(|o| o.role == role)
                .filter_map(ProbeOutcome::rejection)
                .collect()
        };

        let rasterizers: Vec<_> = self
            .rasterizers
            .iter()
            .filter(|r| usable(r.kind().as_str()))
            .cloned()
            .collect();
        if rasterizers.is_empty() {
            return Err(RegistryError::NoRasterizerAvailable {
                rejected: rejected(BackendRole::Rasterizer),
            });
        }

        let engines: Vec<_> = self
            .engines
            .iter()
            .filter(|e| usable(e.backend_type().as_str()))
            .cloned()
            .collect();
        if engines.is_empty() {
            return Err(RegistryError::NoEnginesAvailable {
                rejected: rejected(BackendRole::Engine),
            });
        }

        info!(
            "OCR pipeline initialized with {} engine(s) and {} rasterizer(s)",
            engines.len(),
            rasterizers.len()
        );

        Ok(EngineAvailability {
            engines,
            rasterizers,
        })
    }
}

fn create_rasterizer(kind: RasterizerKind, config: &RasterizerConfig) -> Arc<dyn Rasterizer> {
    match kind {
        RasterizerKind::Pdftoppm => Arc::new(PdftoppmRasterizer::new(config.clone())),
        RasterizerKind::ImageMagick => Arc::new(MagickRasterizer::new(config.clone())),
    }
}

/// Build an engine adapter, or explain why this binary cannot.
fn create_engine(
    backend_type: OcrBackendType,
    config: &OcrConfig,
) -> Result<Arc<dyn OcrBackend>, ProbeOutcome> {
    match backend_type {
        OcrBackendType::Tesseract => Ok(Arc::new(TesseractBackend::with_config(config.clone()))),
        OcrBackendType::MagickTesseract => {
            Ok(Arc::new(MagickTesseractBackend::with_config(config.clone())))
        }
        #[cfg(feature = "ocr-ocrs")]
        OcrBackendType::Ocrs => Ok(Arc::new(OcrsBackend::with_config(config.clone()))),
        #[cfg(feature = "ocr-paddle")]
        OcrBackendType::PaddleOcr => Ok(Arc::new(PaddleBackend::with_config(config.clone()))),
        #[allow(unreachable_patterns)]
        other => Err(not_compiled_in(other)),
    }
}

#[allow(dead_code)]
fn not_compiled_in(backend_type: OcrBackendType) -> ProbeOutcome {
    let feature = match backend_type {
        OcrBackendType::Ocrs => "ocr-ocrs",
        OcrBackendType::PaddleOcr => "ocr-paddle",
        _ => "default",
    };
    ProbeOutcome {
        name: backend_type.to_string(),
        role: BackendRole::Engine,
        status: Err("not compiled into this binary".to_string()),
        hint: format!("Rebuild with: cargo install studybuddy --features {}", feature),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::{OcrError, Recognition};
    use crate::ocr::page::{NormalizedImage, PageImage};
    use crate::ocr::rasterize::RasterizeError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEngine {
        backend_type: OcrBackendType,
        available: bool,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl OcrBackend for FakeEngine {
        fn backend_type(&self) -> OcrBackendType {
            self.backend_type
        }

        async fn probe(&self) -> Result<String, OcrError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.available {
                Ok("fake 1.0".to_string())
            } else {
                Err(OcrError::BackendNotAvailable("not installed".to_string()))
            }
        }

        fn availability_hint(&self) -> String {
            "install it".to_string()
        }

        async fn run_ocr(&self, _image: &NormalizedImage) -> Result<Recognition, OcrError> {
            Ok(Recognition::default())
        }
    }

    struct FakeRasterizer {
        available: bool,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        fn kind(&self) -> RasterizerKind {
            RasterizerKind::Pdftoppm
        }

        async fn probe(&self) -> Result<String, RasterizeError> {
            if self.available {
                Ok("pdftoppm version 24.02.0".to_string())
            } else {
                Err(RasterizeError::NoPages)
            }
        }

        fn availability_hint(&self) -> String {
            "install poppler".to_string()
        }

        async fn rasterize(
            &self,
            _pdf: &Path,
            _dpi: u32,
            _out_dir: &Path,
        ) -> Result<Vec<PageImage>, RasterizeError> {
            Ok(Vec::new())
        }
    }

    /// Never finishes its availability check, like a model load stuck on a slow disk.
    struct HangingEngine;

    #[async_trait]
    impl OcrBackend for HangingEngine {
        fn backend_type(&self) -> OcrBackendType {
            OcrBackendType::PaddleOcr
        }

        async fn probe(&self) -> Result<String, OcrError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("never".to_string())
        }

        fn availability_hint(&self) -> String {
            "check the model directory".to_string()
        }

        async fn run_ocr(&self, _image: &NormalizedImage) -> Result<Recognition, OcrError> {
            Ok(Recognition::default())
        }
    }

    fn fake_engine(backend_type: OcrBackendType, available: bool) -> Arc<FakeEngine> {
        Arc::new(FakeEngine {
            backend_type,
            available,
            probes: AtomicUsize::new(0),
        })
    }

    fn engine(backend_type: OcrBackendType, available: bool) -> Arc<dyn OcrBackend> {
        fake_engine(backend_type, available)
    }

    fn rasterizer(available: bool) -> Arc<dyn Rasterizer> {
        Arc::new(FakeRasterizer { available })
    }

    #[tokio::test]
    async fn test_detect_keeps_available_in_order() {
        let registry = EngineRegistry::new(
            vec![
                engine(OcrBackendType::MagickTesseract, true),
                engine(OcrBackendType::Ocrs, false),
                engine(OcrBackendType::Tesseract, true),
            ],
            vec![rasterizer(true)],
        );

        let availability = registry.detect().await.unwrap();
        assert_eq!(
            availability.engine_types(),
            vec![OcrBackendType::MagickTesseract, OcrBackendType::Tesseract]
        );
        assert_eq!(availability.rasterizers().len(), 1);
    }

    #[tokio::test]
    async fn test_no_engines_is_distinct_error() {
        let registry = EngineRegistry::new(
            vec![engine(OcrBackendType::Tesseract, false)],
            vec![rasterizer(true)],
        );

        let err = registry.detect().await.unwrap_err();
        match &err {
            RegistryError::NoEnginesAvailable { rejected } => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].backend, "tesseract");
                assert_eq!(rejected[0].hint, "install it");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("not installed"));
    }

    #[tokio::test]
    async fn test_no_rasterizer_is_distinct_error() {
        let registry = EngineRegistry::new(
            vec![engine(OcrBackendType::Tesseract, true)],
            vec![rasterizer(false)],
        );

        let err = registry.detect().await.unwrap_err();
        assert!(matches!(err, RegistryError::NoRasterizerAvailable { .. }));
        assert_eq!(err.rejected()[0].hint, "install poppler");
    }

    #[tokio::test]
    async fn test_hanging_engine_is_rejected_after_timeout() {
        let registry = EngineRegistry::new(
            vec![Arc::new(HangingEngine) as Arc<dyn OcrBackend>],
            vec![rasterizer(true)],
        )
        .with_probe_timeout(Duration::from_millis(50));

        let detected = tokio::time::timeout(Duration::from_secs(5), registry.detect())
            .await
            .expect("detect should finish once the engine times out");

        match detected {
            Err(RegistryError::NoEnginesAvailable { rejected }) => {
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].backend, "paddleocr");
                assert!(rejected[0].reason.contains("timed out"));
                assert_eq!(rejected[0].hint, "check the model directory");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hanging_engine_does_not_block_others() {
        let registry = EngineRegistry::new(
            vec![
                Arc::new(HangingEngine) as Arc<dyn OcrBackend>,
                engine(OcrBackendType::Tesseract, true),
            ],
            vec![rasterizer(true)],
        )
        .with_probe_timeout(Duration::from_millis(50));

        let availability = registry.detect().await.unwrap();
        assert_eq!(availability.engine_types(), vec![OcrBackendType::Tesseract]);
    }

    #[tokio::test]
    async fn test_select_reuses_earlier_outcomes() {
        let tesseract = fake_engine(OcrBackendType::Tesseract, true);
        let registry = EngineRegistry::new(
            vec![tesseract.clone() as Arc<dyn OcrBackend>],
            vec![rasterizer(true)],
        );

        let outcomes = registry.probe_all().await;
        let availability = registry.select(&outcomes).unwrap();

        assert_eq!(availability.engine_types(), vec![OcrBackendType::Tesseract]);
        assert_eq!(tesseract.probes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_names_skips_unknown_and_repeats() {
        let registry = EngineRegistry::from_names(
            &["easyocr", "tesseract", "magick", "tesseract"],
            &["pdftoppm", "ghostscript"],
            &OcrConfig::default(),
            &RasterizerConfig::default(),
        );

        let engines: Vec<_> = registry.engines.iter().map(|e| e.backend_type()).collect();
        assert_eq!(
            engines,
            vec![OcrBackendType::Tesseract, OcrBackendType::MagickTesseract]
        );
        assert_eq!(registry.rasterizers.len(), 1);
    }

    #[cfg(not(feature = "ocr-ocrs"))]
    #[tokio::test]
    async fn test_feature_gated_engine_reports_rebuild_hint() {
        let registry = EngineRegistry::from_names(
            &["ocrs"],
            &[],
            &OcrConfig::default(),
            &RasterizerConfig::default(),
        );
        let outcomes = registry.probe_all().await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].is_available());
        assert!(outcomes[0].hint.contains("ocr-ocrs"));
    }

    #[test]
    fn test_restrict_preserves_order() {
        let availability = EngineAvailability::from_parts(
            vec![
                engine(OcrBackendType::Tesseract, true),
                engine(OcrBackendType::MagickTesseract, true),
            ],
            vec![rasterizer(true)],
        )
        .unwrap();

        let restricted = availability
            .restrict(&[OcrBackendType::MagickTesseract])
            .unwrap();
        assert_eq!(
            restricted.engine_types(),
            vec![OcrBackendType::MagickTesseract]
        );
        assert!(availability.restrict(&[OcrBackendType::Ocrs]).is_err());
    }

    #[test]
    fn test_from_parts_requires_both_roles() {
        assert!(matches!(
            EngineAvailability::from_parts(vec![], vec![rasterizer(true)]),
            Err(RegistryError::NoEnginesAvailable { .. })
        ));
        assert!(matches!(
            EngineAvailability::from_parts(vec![engine(OcrBackendType::Tesseract, true)], vec![]),
            Err(RegistryError::NoRasterizerAvailable { .. })
        ));
    }
}
