//! `studybuddy check`: report backend availability.

use console::style;

use studybuddy::ocr::{BackendRole, EngineRegistry, ProbeOutcome};
use studybuddy::Settings;

fn by_role(outcomes: &[ProbeOutcome], role: BackendRole) -> Vec<&ProbeOutcome> {
    outcomes.iter().filter(|o| o.role == role).collect()
}

fn print_outcomes(title: &str, outcomes: &[&ProbeOutcome]) {
    println!("\n{}", style(title).cyan());
    for outcome in outcomes {
        match &outcome.status {
            Ok(version) => {
                println!(
                    "  {:<22} {} {}",
                    outcome.name,
                    style("✓ available").green(),
                    style(version).dim()
                );
            }
            Err(reason) => {
                println!(
                    "  {:<22} {} {}",
                    outcome.name,
                    style("✗ unavailable").red(),
                    reason
                );
                println!("  {:<22} {}", "", style(&outcome.hint).dim());
            }
        }
    }
}

/// Probe every configured backend and print a status table.
///
/// Fails when the pipeline could not be constructed.
pub async fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("OCR Pipeline Status").bold());
    println!("{}", "-".repeat(50));
    match &settings.source_path {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: {}", style("defaults (no config file)").dim()),
    }

    let registry = EngineRegistry::from_names(
        settings.engines.enabled.as_slice(),
        settings.rasterizers.order.as_slice(),
        &settings.ocr_config(),
        &settings.rasterizer_config(),
    );
    let outcomes = registry.probe_all().await;

    print_outcomes("Rasterizers:", &by_role(&outcomes, BackendRole::Rasterizer));
    print_outcomes("OCR Engines:", &by_role(&outcomes, BackendRole::Engine));
    println!();

    match registry.select(&outcomes) {
        Ok(availability) => {
            let engines: Vec<_> = availability
                .engine_types()
                .iter()
                .map(|t| t.to_string())
                .collect();
            println!(
                "{} Pipeline ready ({} engine(s): {})",
                style("✓").green(),
                engines.len(),
                engines.join(", ")
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            Err(e.into())
        }
    }
}
