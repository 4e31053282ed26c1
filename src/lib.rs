//! studybuddy - multi-engine OCR extraction for scanned course material.
//!
//! Turns scanned lecture notes and past exams (PDF) into page-marked text
//! by running several OCR engines per page and keeping the best result.

// `from_str` helpers return Option rather than implementing FromStr.
#![allow(clippy::should_implement_trait)]

pub mod config;
pub mod models;
pub mod ocr;

pub use config::{ConfigError, Settings};
pub use models::{Document, EmptyPagePolicy, ExtractedDocument, PageResult, StudyInputs};
pub use ocr::{DocumentExtractor, EngineAvailability, EngineRegistry, ExtractionError};
