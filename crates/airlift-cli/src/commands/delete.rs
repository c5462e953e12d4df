//! `airlift delete` command implementation
//!
//! Removes an entity together with its trackers, ledger entries and migrated
//! files. Shared LFS objects are kept; only the entity's links go.

use super::{open_service, parse_entity_id};
use crate::error::Result;
use colored::Colorize;
use std::io::{self, Write};

pub async fn run(entity: String, yes: bool) -> Result<()> {
    let id = parse_entity_id(&entity)?;
    let service = open_service().await?;

    let report = service.status(id).await?;
    println!(
        "{} {} ({})",
        report.kind.as_str(),
        report.source_full_path,
        report.id
    );
    println!();

    // Confirmation prompt (unless --yes flag is used)
    if !yes {
        println!(
            "{}",
            "This removes the entity, its trackers, ledger entries and migrated files.".yellow()
        );
        print!("Continue? [y/N]: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Deletion cancelled.");
            return Ok(());
        }
    }

    service.delete_entity(id).await?;
    println!("{}", "Entity deleted.".green());

    Ok(())
}
