//! CLI command implementations

pub mod abort;
pub mod create;
pub mod delete;
pub mod run;
pub mod status;

use crate::error::{CliError, Result};
use airlift_engine::config::EngineConfig;
use airlift_engine::entity::EntityStatusReport;
use airlift_engine::MigrationService;
use colored::{ColoredString, Colorize};
use uuid::Uuid;

/// Build the migration service from environment configuration
pub(crate) async fn open_service() -> Result<MigrationService> {
    let config = EngineConfig::load().map_err(|e| CliError::config(e.to_string()))?;
    Ok(MigrationService::new(config).await?)
}

pub(crate) fn parse_entity_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| CliError::invalid(format!("'{raw}' is not a valid entity id")))
}

/// Color a status word by its state
pub(crate) fn paint_status(status: &str) -> ColoredString {
    match status {
        "finished" => status.green(),
        "failed" => status.red(),
        "started" => status.cyan(),
        _ => status.normal(),
    }
}

/// Print an entity report with one line per tracker
pub(crate) fn print_report(report: &EntityStatusReport) {
    println!(
        "{} {}",
        report.kind.as_str().cyan().bold(),
        report.source_full_path.bold()
    );
    println!("  Id:          {}", report.id);
    println!("  Destination: {}", report.destination_slug);
    println!("  Status:      {}", paint_status(report.status.as_str()));
    if let Some(error) = &report.error {
        println!("  Error:       {}", error.red());
    }
    println!();

    for tracker in &report.trackers {
        print!(
            "  {:<14} {}",
            tracker.relation,
            paint_status(tracker.status.as_str())
        );
        if tracker.failed_records > 0 {
            print!("  ({} record(s) failed)", tracker.failed_records);
        }
        if let Some(error) = &tracker.error {
            print!("  {}", error.red());
        }
        println!();
    }
}
