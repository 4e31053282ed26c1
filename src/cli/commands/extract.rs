//! Extraction commands: `extract` and `prepare`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use indicatif::ProgressBar;

use studybuddy::{Document, DocumentExtractor, EmptyPagePolicy, ExtractedDocument, Settings};

use crate::cli::helpers::{load_pdf, page_progress_bar, parse_engines, write_output};

/// Arguments for `studybuddy extract`.
pub struct ExtractArgs {
    pub pdf: PathBuf,
    pub dpi: Option<u32>,
    pub engines: Vec<String>,
    pub keep_empty: bool,
    pub json: bool,
    pub output: Option<PathBuf>,
}

/// Build the pipeline, optionally restricted to `engines`.
async fn build_extractor(
    settings: &Settings,
    engines: &[String],
) -> anyhow::Result<DocumentExtractor> {
    let allowed = parse_engines(engines)?;
    let extractor = DocumentExtractor::from_settings(settings)
        .await
        .context("OCR pipeline unavailable (run `studybuddy check` for details)")?;

    if allowed.is_empty() {
        return Ok(extractor);
    }
    let restricted = extractor.availability().restrict(&allowed)?;
    Ok(extractor.with_availability(restricted))
}

async fn extract_with_bar(
    extractor: &DocumentExtractor,
    document: &Document,
    pb: &ProgressBar,
) -> anyhow::Result<ExtractedDocument> {
    let extracted = extractor
        .extract_with_progress(document, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await
        .with_context(|| format!("Failed to extract {}", document.name()))?;
    Ok(extracted)
}

/// Extract one PDF and print its text (or JSON).
pub async fn cmd_extract(mut settings: Settings, args: ExtractArgs) -> anyhow::Result<()> {
    if let Some(dpi) = args.dpi {
        settings.extraction.dpi = dpi;
    }
    if args.keep_empty {
        settings.extraction.empty_pages = EmptyPagePolicy::Marker;
    }
    settings.validate()?;

    let document = load_pdf(&args.pdf).await?;
    let extractor = build_extractor(&settings, &args.engines).await?;

    let pb = page_progress_bar(document.name())?;
    let extracted = extract_with_bar(&extractor, &document, &pb).await;
    pb.finish_and_clear();
    let extracted = extracted?;

    let empty = extracted.pages.iter().filter(|p| p.is_empty()).count();
    if empty > 0 {
        eprintln!(
            "{} {} of {} page(s) produced no text",
            style("!").yellow(),
            empty,
            extracted.page_count()
        );
    }

    let rendered = if args.json {
        serde_json::to_string_pretty(&extracted)?
    } else {
        extracted.text()
    };
    write_output(args.output.as_deref(), &rendered).await
}

/// Extract lecture notes and past exams into the summarizer's input JSON.
pub async fn cmd_prepare(
    mut settings: Settings,
    notes: &Path,
    exams: &Path,
    dpi: Option<u32>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(dpi) = dpi {
        settings.extraction.dpi = dpi;
    }
    settings.validate()?;

    let notes = load_pdf(notes).await?;
    let exams = load_pdf(exams).await?;
    let extractor = build_extractor(&settings, &[]).await?;

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Extracting {} and {}", notes.name(), exams.name()));
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    let inputs = extractor.extract_pair(&notes, &exams).await;
    pb.finish_and_clear();
    let inputs = inputs.context("Failed to extract study material")?;

    let rendered = serde_json::to_string_pretty(&inputs)?;
    write_output(output, &rendered).await
}
