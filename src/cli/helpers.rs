//! Shared helper functions for CLI commands.

use std::path::Path;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};

use studybuddy::ocr::OcrBackendType;
use studybuddy::Document;

/// Read a PDF from disk, rejecting files that are not PDFs.
pub async fn load_pdf(path: &Path) -> anyhow::Result<Document> {
    let document = Document::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if !document.is_pdf() {
        bail!("{} is not a PDF", path.display());
    }
    Ok(document)
}

/// Parse `--engines` names, failing on the first unknown one.
pub fn parse_engines(names: &[String]) -> anyhow::Result<Vec<OcrBackendType>> {
    names
        .iter()
        .map(|name| {
            OcrBackendType::from_str(name).with_context(|| {
                let known: Vec<_> = OcrBackendType::ALL.iter().map(|t| t.as_str()).collect();
                format!("Unknown OCR engine '{}' (known: {})", name, known.join(", "))
            })
        })
        .collect()
}

/// Per-page progress bar; length is set once the page count is known.
pub fn page_progress_bar(label: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} pages {wide_msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());
    Ok(pb)
}

/// Write to `path`, or to stdout when no path is given.
pub async fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => {
            print!("{}", content);
            if !content.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_engines_accepts_aliases() {
        let engines = parse_engines(&["magick".to_string(), "tesseract".to_string()]).unwrap();
        assert_eq!(
            engines,
            vec![OcrBackendType::MagickTesseract, OcrBackendType::Tesseract]
        );
    }

    #[test]
    fn test_parse_engines_rejects_unknown() {
        let err = parse_engines(&["easyocr".to_string()]).unwrap_err();
        assert!(err.to_string().contains("easyocr"));
    }

    #[tokio::test]
    async fn test_load_pdf_rejects_non_pdf() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(load_pdf(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_write_output_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "--- Page 1 ---\nhi\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "--- Page 1 ---\nhi\n"
        );
    }
}
