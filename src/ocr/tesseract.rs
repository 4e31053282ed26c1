//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction. Output is
//! requested as TSV so per-word confidences are available; words are
//! regrouped into lines and each line is scored by its mean word
//! confidence before filtering.

use async_trait::async_trait;

use super::backend::{
    filter_detections, Detection, OcrBackend, OcrBackendType, OcrConfig, OcrError, Recognition,
};
use super::model_utils::{check_binary, TESSERACT_NOT_FOUND};
use super::page::NormalizedImage;
use super::process::{probe_version, run_tool, scratch_dir, tool_command, ToolError};

/// TSV row level for a single word.
const WORD_LEVEL: &str = "5";

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: OcrConfig::default(),
        }
    }

    /// Create a new Tesseract backend with custom configuration.
    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Arguments after `<image> stdout`: engine mode, language, whitelist, TSV output.
    fn engine_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["--oem", "3", "--psm", "6", "-l"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(self.config.language.clone());
        if let Some(whitelist) = &self.config.char_whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", whitelist));
        }
        args.push("tsv".to_string());
        args
    }

    /// Run Tesseract on a saved page image and return its TSV output.
    async fn run_tesseract_tsv(&self, image: &NormalizedImage) -> Result<String, OcrError> {
        let scratch = scratch_dir(self.config.scratch_root.as_deref())?;
        let image_path = scratch.path().join("page.png");
        image.save_png(&image_path)?;

        let mut cmd = tool_command("tesseract");
        cmd.arg(&image_path).arg("stdout").args(self.engine_args());

        let output = run_tool(&mut cmd, "tesseract", self.config.timeout)
            .await
            .map_err(not_found_hint)?;

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found_hint(e: ToolError) -> OcrError {
    match e {
        ToolError::NotFound { .. } => OcrError::BackendNotAvailable(TESSERACT_NOT_FOUND.to_string()),
        other => OcrError::Tool(other),
    }
}

/// Parse Tesseract TSV output into line detections in reading order.
///
/// Line confidence is the mean of its words' confidences, rescaled from
/// Tesseract's 0-100 to 0-1. Lines whose words carry no score get `None`.
pub fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, OcrError> {
    let mut rows = tsv.lines();
    match rows.next() {
        None => return Ok(Vec::new()),
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(OcrError::MalformedOutput(format!(
                "expected TSV header, got {:?}",
                other.chars().take(40).collect::<String>()
            )))
        }
    }

    let mut detections = Vec::new();
    let mut current_key: Option<(u32, u32, u32, u32)> = None;
    let mut words: Vec<String> = Vec::new();
    let mut scores: Vec<f32> = Vec::new();

    let mut flush = |words: &mut Vec<String>, scores: &mut Vec<f32>| {
        if !words.is_empty() {
            let confidence = if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f32>() / scores.len() as f32 / 100.0)
            };
            detections.push(Detection::new(words.join(" "), confidence));
        }
        words.clear();
        scores.clear();
    };

    for (index, row) in rows.enumerate() {
        if row.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = row.splitn(12, '\t').collect();
        if fields.len() < 11 {
            return Err(OcrError::MalformedOutput(format!(
                "TSV row {} has {} columns",
                index + 2,
                fields.len()
            )));
        }
        if fields[0] != WORD_LEVEL {
            continue;
        }

        let number = |i: usize| -> Result<u32, OcrError> {
            fields[i].trim().parse().map_err(|_| {
                OcrError::MalformedOutput(format!("TSV row {} column {} not a number", index + 2, i))
            })
        };
        let key = (number(1)?, number(2)?, number(3)?, number(4)?);
        let confidence: f32 = fields[10].trim().parse().map_err(|_| {
            OcrError::MalformedOutput(format!("TSV row {} has bad confidence", index + 2))
        })?;
        let text = fields.get(11).map(|t| t.trim()).unwrap_or("");

        if current_key != Some(key) {
            flush(&mut words, &mut scores);
            current_key = Some(key);
        }
        if text.is_empty() {
            continue;
        }
        words.push(text.to_string());
        if confidence >= 0.0 {
            scores.push(confidence);
        }
    }
    flush(&mut words, &mut scores);

    Ok(detections)
}

#[async_trait]
impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    async fn probe(&self) -> Result<String, OcrError> {
        probe_version("tesseract", "--version", self.config.probe_timeout)
            .await
            .map_err(not_found_hint)
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            TESSERACT_NOT_FOUND.to_string()
        } else {
            "Tesseract is available".to_string()
        }
    }

    async fn run_ocr(&self, image: &NormalizedImage) -> Result<Recognition, OcrError> {
        let tsv = self.run_tesseract_tsv(image).await?;
        Ok(filter_detections(parse_tsv(&tsv)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: u32, line: u32, word: u32, conf: f32, text: &str) -> String {
        format!("5\t1\t{block}\t1\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn test_engine_args_default_has_no_whitelist() {
        let args = TesseractBackend::new().engine_args();
        assert_eq!(args, vec!["--oem", "3", "--psm", "6", "-l", "eng", "tsv"]);
    }

    #[test]
    fn test_engine_args_pass_char_whitelist() {
        let backend = TesseractBackend::with_config(OcrConfig {
            char_whitelist: Some("0123456789abc".to_string()),
            ..OcrConfig::default()
        });

        let args = backend.engine_args();
        let c = args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(args[c + 1], "tessedit_char_whitelist=0123456789abc");
        assert_eq!(args.last().map(String::as_str), Some("tsv"));
    }

    #[test]
    fn test_parse_groups_words_into_lines() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t".to_string(),
            word(1, 1, 1, 96.0, "Lecture"),
            word(1, 1, 2, 90.0, "Notes"),
            word(1, 2, 1, 80.0, "Week"),
            word(1, 2, 2, 70.0, "3"),
        ]
        .join("\n");

        let detections = parse_tsv(&tsv).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text, "Lecture Notes");
        assert!((detections[0].confidence.unwrap() - 0.93).abs() < 1e-4);
        assert_eq!(detections[1].text, "Week 3");
    }

    #[test]
    fn test_low_confidence_lines_are_filtered() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 1, 91.0, "Intro"),
            word(2, 1, 1, 12.0, "xqz"),
        ]
        .join("\n");

        let recognition = filter_detections(parse_tsv(&tsv).unwrap());
        assert_eq!(recognition.text, "Intro");
    }

    #[test]
    fn test_empty_output_has_no_detections() {
        assert!(parse_tsv("").unwrap().is_empty());
        assert!(parse_tsv(HEADER).unwrap().is_empty());
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let err = parse_tsv("Some plain text output").unwrap_err();
        assert!(matches!(err, OcrError::MalformedOutput(_)));
    }

    #[test]
    fn test_short_row_is_malformed() {
        let tsv = format!("{HEADER}\n5\t1\t1");
        assert!(matches!(
            parse_tsv(&tsv).unwrap_err(),
            OcrError::MalformedOutput(_)
        ));
    }

    #[test]
    fn test_blank_word_text_is_skipped() {
        let tsv = [HEADER.to_string(), word(1, 1, 1, 95.0, " "), word(1, 1, 2, 95.0, "A")].join("\n");
        let detections = parse_tsv(&tsv).unwrap();
        assert_eq!(detections, vec![Detection::new("A", Some(0.95))]);
    }
}
