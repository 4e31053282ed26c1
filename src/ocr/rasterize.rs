//! PDF rasterization backends.
//!
//! Each backend renders every page of a staged PDF into its own output
//! directory; [`ImageRasterizer`] tries them in preference order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::extractor::ExtractionError;
use super::model_utils::{
    check_binary, GHOSTSCRIPT_NOT_FOUND, MAGICK_NOT_FOUND, PDFTOPPM_NOT_FOUND,
};
use super::page::PageImage;
use super::process::{probe_version, run_tool, scratch_dir, tool_command, ToolError};
use super::registry::RegistryError;
use crate::models::Document;

/// Errors from a single rasterization backend.
#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("{delegate} unavailable: {source}")]
    MissingDelegate {
        delegate: &'static str,
        #[source]
        source: ToolError,
    },

    #[error("produced no pages")]
    NoPages,

    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page decoding worker failed: {0}")]
    Worker(String),
}

/// Known rasterization backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterizerKind {
    /// Poppler's `pdftoppm`.
    Pdftoppm,
    /// ImageMagick's `magick` (Ghostscript delegate).
    #[serde(rename = "imagemagick")]
    ImageMagick,
}

impl RasterizerKind {
    pub const ALL: [RasterizerKind; 2] = [RasterizerKind::Pdftoppm, RasterizerKind::ImageMagick];

    pub fn as_str(&self) -> &'static str {
        match self {
            RasterizerKind::Pdftoppm => "pdftoppm",
            RasterizerKind::ImageMagick => "imagemagick",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pdftoppm" | "poppler" => Some(RasterizerKind::Pdftoppm),
            "imagemagick" | "magick" => Some(RasterizerKind::ImageMagick),
            _ => None,
        }
    }
}

impl std::fmt::Display for RasterizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time bounds for rasterizer subprocesses.
#[derive(Debug, Clone)]
pub struct RasterizerConfig {
    /// Upper bound for rendering one whole document.
    pub timeout: Duration,
    /// Upper bound for an availability probe.
    pub probe_timeout: Duration,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(10),
        }
    }
}

/// A backend that turns a PDF on disk into page images.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    fn kind(&self) -> RasterizerKind;

    /// Check the backend can run here, returning its version string.
    async fn probe(&self) -> Result<String, RasterizeError>;

    /// Install instructions shown when the backend is unavailable.
    fn availability_hint(&self) -> String;

    /// Render every page of `pdf` at `dpi`, using `out_dir` for page files.
    ///
    /// Pages come back in document order.
    async fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<PageImage>, RasterizeError>;
}

/// Poppler `pdftoppm`.
pub struct PdftoppmRasterizer {
    config: RasterizerConfig,
}

impl PdftoppmRasterizer {
    pub fn new(config: RasterizerConfig) -> Self {
        Self { config }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new(RasterizerConfig::default())
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    fn kind(&self) -> RasterizerKind {
        RasterizerKind::Pdftoppm
    }

    async fn probe(&self) -> Result<String, RasterizeError> {
        Ok(probe_version("pdftoppm", "-v", self.config.probe_timeout).await?)
    }

    fn availability_hint(&self) -> String {
        if check_binary("pdftoppm") {
            "pdftoppm is available".to_string()
        } else {
            PDFTOPPM_NOT_FOUND.to_string()
        }
    }

    async fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        let mut cmd = tool_command("pdftoppm");
        cmd.arg("-png")
            .args(["-r", &dpi.to_string()])
            .arg(pdf)
            .arg(out_dir.join("page"));
        run_tool(&mut cmd, "pdftoppm", self.config.timeout).await?;

        load_pages(collect_page_files(out_dir, "page")?).await
    }
}

/// ImageMagick `magick`, reading PDFs through its Ghostscript delegate.
pub struct MagickRasterizer {
    config: RasterizerConfig,
    magick: &'static str,
    ghostscript: &'static str,
}

impl MagickRasterizer {
    pub fn new(config: RasterizerConfig) -> Self {
        Self {
            config,
            magick: "magick",
            ghostscript: "gs",
        }
    }
}

impl Default for MagickRasterizer {
    fn default() -> Self {
        Self::new(RasterizerConfig::default())
    }
}

#[async_trait]
impl Rasterizer for MagickRasterizer {
    fn kind(&self) -> RasterizerKind {
        RasterizerKind::ImageMagick
    }

    async fn probe(&self) -> Result<String, RasterizeError> {
        let version = probe_version(self.magick, "--version", self.config.probe_timeout).await?;
        let gs = probe_version(self.ghostscript, "--version", self.config.probe_timeout)
            .await
            .map_err(|source| RasterizeError::MissingDelegate {
                delegate: "Ghostscript",
                source,
            })?;
        Ok(format!("{} (Ghostscript {})", version, gs))
    }

    fn availability_hint(&self) -> String {
        if !check_binary(self.magick) {
            MAGICK_NOT_FOUND.to_string()
        } else if !check_binary(self.ghostscript) {
            GHOSTSCRIPT_NOT_FOUND.to_string()
        } else {
            "ImageMagick is available".to_string()
        }
    }

    async fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        out_dir: &Path,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        let mut cmd = tool_command(self.magick);
        cmd.args(["-density", &dpi.to_string()])
            .arg(pdf)
            .args(["-quality", "100", "-alpha", "remove", "-colorspace", "RGB"])
            .arg(out_dir.join("page_%03d.png"));
        run_tool(&mut cmd, self.magick, self.config.timeout).await?;

        load_pages(collect_page_files(out_dir, "page")?).await
    }
}

/// List `<prefix>[-_]<n>.png` files in `dir`, ordered by `n`.
///
/// Tools zero-pad inconsistently, so the index is parsed rather than
/// compared as a string.
pub fn collect_page_files(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if !is_png {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some(index) = page_index(stem, prefix) {
            pages.push((index, path));
        }
    }

    pages.sort_by_key(|(index, _)| *index);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_index(stem: &str, prefix: &str) -> Option<u32> {
    let rest = stem.strip_prefix(prefix)?;
    let digits = rest.trim_start_matches(['-', '_']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Decode page files off the async runtime.
async fn load_pages(paths: Vec<PathBuf>) -> Result<Vec<PageImage>, RasterizeError> {
    tokio::task::spawn_blocking(move || {
        paths
            .into_iter()
            .map(|path| {
                PageImage::open(&path).map_err(|source| RasterizeError::Decode { path, source })
            })
            .collect()
    })
    .await
    .map_err(|e| RasterizeError::Worker(e.to_string()))?
}

/// Converts a document into page images, falling back across backends.
pub struct ImageRasterizer {
    backends: Vec<Arc<dyn Rasterizer>>,
    scratch_root: Option<PathBuf>,
}

impl ImageRasterizer {
    /// Backends are tried in the order given.
    pub fn new(backends: Vec<Arc<dyn Rasterizer>>) -> Self {
        Self {
            backends,
            scratch_root: None,
        }
    }

    /// Put staging directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Rasterize every page of `document` at `dpi`.
    pub async fn rasterize(
        &self,
        document: &Document,
        dpi: u32,
    ) -> Result<Vec<PageImage>, ExtractionError> {
        let staging = scratch_dir(self.scratch_root.as_deref()).map_err(ExtractionError::Staging)?;
        let pdf_path = staging.path().join("input.pdf");
        tokio::fs::write(&pdf_path, document.bytes())
            .await
            .map_err(ExtractionError::Staging)?;

        let mut last_failure: Option<(RasterizerKind, RasterizeError)> = None;

        for backend in &self.backends {
            let kind = backend.kind();
            let out_dir = staging.path().join(kind.as_str());
            tokio::fs::create_dir_all(&out_dir)
                .await
                .map_err(ExtractionError::Staging)?;

            debug!("rasterizing {} with {} at {} dpi", document.name(), kind, dpi);
            let result = match backend.rasterize(&pdf_path, dpi, &out_dir).await {
                Ok(pages) if pages.is_empty() => Err(RasterizeError::NoPages),
                other => other,
            };

            match result {
                Ok(pages) => {
                    info!(
                        "Rasterized {} into {} page(s) with {}",
                        document.name(),
                        pages.len(),
                        kind
                    );
                    return Ok(pages);
                }
                Err(e) => {
                    warn!("{} failed on {}: {}", kind, document.name(), e);
                    last_failure = Some((kind, e));
                }
            }
        }

        match last_failure {
            Some((backend, source)) => Err(ExtractionError::RasterizationFailed { backend, source }),
            None => Err(ExtractionError::Registry(
                RegistryError::NoRasterizerAvailable { rejected: Vec::new() },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeRasterizer {
        kind: RasterizerKind,
        pages: Option<usize>,
        calls: AtomicUsize,
    }

    impl FakeRasterizer {
        fn new(kind: RasterizerKind, pages: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                pages,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        fn kind(&self) -> RasterizerKind {
            self.kind
        }

        async fn probe(&self) -> Result<String, RasterizeError> {
            Ok("fake".to_string())
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        async fn rasterize(
            &self,
            pdf: &Path,
            _dpi: u32,
            out_dir: &Path,
        ) -> Result<Vec<PageImage>, RasterizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(pdf.exists());
            assert!(out_dir.is_dir());
            match self.pages {
                Some(n) => Ok((0..n)
                    .map(|i| PageImage::new(RgbImage::from_pixel(2, 2, Rgb([i as u8; 3]))))
                    .collect()),
                None => Err(RasterizeError::Io(std::io::Error::other("corrupt pdf"))),
            }
        }
    }

    fn document() -> Document {
        Document::from_bytes(b"%PDF-1.4 fake".to_vec(), "notes.pdf")
    }

    #[test]
    fn test_page_files_sorted_numerically() {
        let dir = TempDir::new().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "notes.txt", "page-x.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = collect_page_files(dir.path(), "page").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["page-1.png", "page-2.png", "page-10.png"]);
    }

    #[test]
    fn test_page_index_handles_padding_and_separators() {
        assert_eq!(page_index("page-007", "page"), Some(7));
        assert_eq!(page_index("page_000", "page"), Some(0));
        assert_eq!(page_index("page", "page"), None);
        assert_eq!(page_index("cover-1", "page"), None);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in RasterizerKind::ALL {
            assert_eq!(RasterizerKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(
            RasterizerKind::from_str("magick"),
            Some(RasterizerKind::ImageMagick)
        );
    }

    fn magick_with(magick: &'static str, ghostscript: &'static str) -> MagickRasterizer {
        MagickRasterizer {
            config: RasterizerConfig {
                probe_timeout: Duration::from_secs(5),
                ..RasterizerConfig::default()
            },
            magick,
            ghostscript,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_magick_without_ghostscript_is_rejected() {
        let rasterizer = magick_with("true", "studybuddy-no-such-gs");

        let err = rasterizer.probe().await.unwrap_err();
        match err {
            RasterizeError::MissingDelegate { delegate, source } => {
                assert_eq!(delegate, "Ghostscript");
                assert!(matches!(source, ToolError::NotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rasterizer.availability_hint(), GHOSTSCRIPT_NOT_FOUND);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_magick_with_ghostscript_is_available() {
        let rasterizer = magick_with("true", "true");

        let version = rasterizer.probe().await.unwrap();
        assert!(version.contains("Ghostscript"));
        assert_eq!(rasterizer.availability_hint(), "ImageMagick is available");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_backend() {
        let broken = FakeRasterizer::new(RasterizerKind::Pdftoppm, None);
        let working = FakeRasterizer::new(RasterizerKind::ImageMagick, Some(3));
        let rasterizer = ImageRasterizer::new(vec![
            broken.clone() as Arc<dyn Rasterizer>,
            working.clone(),
        ]);

        let pages = rasterizer.rasterize(&document(), 300).await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].pixels().get_pixel(0, 0).0, [2, 2, 2]);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_pages_counts_as_failure() {
        let scratch = TempDir::new().unwrap();
        let empty = FakeRasterizer::new(RasterizerKind::Pdftoppm, Some(0));
        let rasterizer = ImageRasterizer::new(vec![empty as Arc<dyn Rasterizer>])
            .with_scratch_root(Some(scratch.path().to_path_buf()));

        let err = rasterizer.rasterize(&document(), 300).await.unwrap_err();
        match err {
            ExtractionError::RasterizationFailed { backend, source } => {
                assert_eq!(backend, RasterizerKind::Pdftoppm);
                assert!(matches!(source, RasterizeError::NoPages));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_all_failing_reports_last_backend() {
        let rasterizer = ImageRasterizer::new(vec![
            FakeRasterizer::new(RasterizerKind::Pdftoppm, None) as Arc<dyn Rasterizer>,
            FakeRasterizer::new(RasterizerKind::ImageMagick, None),
        ]);
        let err = rasterizer.rasterize(&document(), 150).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::RasterizationFailed {
                backend: RasterizerKind::ImageMagick,
                ..
            }
        ));
    }
}
