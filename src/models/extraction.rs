//! Extraction results: per-page text and the joined document.

use serde::{Deserialize, Serialize};

use crate::ocr::OcrBackendType;

/// How pages with no recognized text appear in the joined output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPagePolicy {
    /// Leave the page out entirely.
    #[default]
    Omit,
    /// Keep the page marker with an empty body.
    Marker,
}

/// The arbitrated text of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
    /// Engine whose candidate won, if any produced text.
    pub engine: Option<OcrBackendType>,
    /// Confidence reported with the winning candidate.
    pub confidence: Option<f32>,
    /// Engines that failed or timed out on this page.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_engines: Vec<OcrBackendType>,
}

impl PageResult {
    pub fn empty(page_number: usize) -> Self {
        Self {
            page_number,
            text: String::new(),
            engine: None,
            confidence: None,
            failed_engines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// All pages of one document, in page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub name: String,
    pub pages: Vec<PageResult>,
    pub empty_pages: EmptyPagePolicy,
}

impl ExtractedDocument {
    pub fn new(
        name: impl Into<String>,
        pages: Vec<PageResult>,
        empty_pages: EmptyPagePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            pages,
            empty_pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Joined text: each page as `--- Page N ---\n{text}\n`, pages separated by `\n`.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .filter(|page| !page.is_empty() || self.empty_pages == EmptyPagePolicy::Marker)
            .map(|page| format!("--- Page {} ---\n{}\n", page.page_number, page.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Extracted text of both uploads, as handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyInputs {
    pub lecture_notes: String,
    pub past_exams: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: usize, text: &str) -> PageResult {
        PageResult {
            text: text.to_string(),
            engine: Some(OcrBackendType::Tesseract),
            ..PageResult::empty(n)
        }
    }

    #[test]
    fn test_text_joins_pages_with_markers() {
        let doc = ExtractedDocument::new(
            "notes.pdf",
            vec![page(1, "Entropy"), page(2, "Enthalpy")],
            EmptyPagePolicy::Omit,
        );
        assert_eq!(
            doc.text(),
            "--- Page 1 ---\nEntropy\n\n--- Page 2 ---\nEnthalpy\n"
        );
    }

    #[test]
    fn test_empty_pages_omitted_by_default() {
        let doc = ExtractedDocument::new(
            "notes.pdf",
            vec![PageResult::empty(1), page(2, "Q2"), page(3, "   ")],
            EmptyPagePolicy::default(),
        );
        assert_eq!(doc.text(), "--- Page 2 ---\nQ2\n");
    }

    #[test]
    fn test_marker_policy_keeps_empty_pages() {
        let doc = ExtractedDocument::new(
            "notes.pdf",
            vec![page(1, "Q1"), PageResult::empty(2)],
            EmptyPagePolicy::Marker,
        );
        assert_eq!(doc.text(), "--- Page 1 ---\nQ1\n\n--- Page 2 ---\n\n");
    }

    #[test]
    fn test_no_pages_is_empty_text() {
        let doc = ExtractedDocument::new("blank.pdf", vec![], EmptyPagePolicy::Omit);
        assert_eq!(doc.text(), "");
    }

    #[test]
    fn test_policy_serializes_snake_case() {
        let json = serde_json::to_string(&EmptyPagePolicy::Marker).unwrap();
        assert_eq!(json, "\"marker\"");
        let policy: EmptyPagePolicy = serde_json::from_str("\"omit\"").unwrap();
        assert_eq!(policy, EmptyPagePolicy::Omit);
    }
}
