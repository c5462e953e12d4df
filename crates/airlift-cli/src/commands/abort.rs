//! `airlift abort` command implementation
//!
//! Aborts a migration: cancels any in-process pipelines and fails every
//! unfinished tracker along with the entity.

use super::{open_service, parse_entity_id, print_report};
use crate::error::Result;
use colored::Colorize;

pub async fn run(entity: String) -> Result<()> {
    let id = parse_entity_id(&entity)?;
    let service = open_service().await?;

    let report = service.abort(id).await?;
    println!("{}", "Migration aborted.".yellow().bold());
    println!();
    print_report(&report);

    Ok(())
}
