//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod extract;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use studybuddy::Settings;

#[derive(Parser)]
#[command(name = "studybuddy")]
#[command(about = "Multi-engine OCR extraction for scanned lecture notes and past exams")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "STUDYBUDDY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract page-marked text from a scanned PDF
    Extract {
        /// PDF file to extract
        pdf: PathBuf,
        /// Rasterization resolution (overrides config)
        #[arg(long)]
        dpi: Option<u32>,
        /// Only use these OCR engines (comma-separated, e.g. tesseract,ocrs)
        #[arg(long, value_delimiter = ',')]
        engines: Vec<String>,
        /// Keep a marker for pages with no recognized text
        #[arg(long)]
        keep_empty: bool,
        /// Output per-page results as JSON
        #[arg(long)]
        json: bool,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract lecture notes and past exams into summarizer input JSON
    Prepare {
        /// Lecture notes PDF
        #[arg(long)]
        notes: PathBuf,
        /// Past exams PDF
        #[arg(long)]
        exams: PathBuf,
        /// Rasterization resolution (overrides config)
        #[arg(long)]
        dpi: Option<u32>,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check which rasterizers and OCR engines are usable on this host
    Check,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Extract {
            pdf,
            dpi,
            engines,
            keep_empty,
            json,
            output,
        } => {
            let args = extract::ExtractArgs {
                pdf,
                dpi,
                engines,
                keep_empty,
                json,
                output,
            };
            extract::cmd_extract(settings, args).await
        }
        Commands::Prepare {
            notes,
            exams,
            dpi,
            output,
        } => extract::cmd_prepare(settings, &notes, &exams, dpi, output.as_deref()).await,
        Commands::Check => check::cmd_check(&settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_engines_split_on_commas() {
        let cli = Cli::parse_from([
            "studybuddy",
            "-v",
            "extract",
            "notes.pdf",
            "--engines",
            "tesseract,imagemagick_tesseract",
            "--dpi",
            "200",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Extract { engines, dpi, .. } => {
                assert_eq!(engines, vec!["tesseract", "imagemagick_tesseract"]);
                assert_eq!(dpi, Some(200));
            }
            _ => panic!("expected extract"),
        }
    }

    #[test]
    fn test_config_path_reads_environment() {
        let cmd = Cli::command();
        let config = cmd
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(
            config.get_env(),
            Some(std::ffi::OsStr::new("STUDYBUDDY_CONFIG"))
        );
    }

    #[test]
    fn test_prepare_requires_both_documents() {
        assert!(Cli::try_parse_from(["studybuddy", "prepare", "--notes", "a.pdf"]).is_err());
    }
}
