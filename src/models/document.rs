//! Input documents submitted for extraction.

use std::path::Path;

/// Raw bytes of an uploaded PDF, plus a display name for logs.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    name: String,
}

impl Document {
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            bytes,
            name: name.into(),
        }
    }

    /// Read a document from disk, named after its file name.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { bytes, name })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the content sniffs as a PDF.
    pub fn is_pdf(&self) -> bool {
        infer::get(&self.bytes)
            .map(|kind| kind.mime_type() == "application/pdf")
            .unwrap_or(false)
    }
}
