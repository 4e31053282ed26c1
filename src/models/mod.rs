//! Data models for studybuddy.

mod document;
mod extraction;

pub use document::Document;
pub use extraction::{EmptyPagePolicy, ExtractedDocument, PageResult, StudyInputs};
