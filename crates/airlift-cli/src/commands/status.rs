//! `airlift status` command implementation
//!
//! Shows one entity in detail, or lists every registered entity.

use super::{open_service, paint_status, parse_entity_id, print_report};
use crate::error::Result;
use colored::Colorize;

pub async fn run(entity: Option<String>, json: bool) -> Result<()> {
    let id = entity.as_deref().map(parse_entity_id).transpose()?;
    let service = open_service().await?;

    match id {
        Some(id) => {
            let report = service.status(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        None => {
            let entities = service.list_entities().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entities)?);
                return Ok(());
            }

            if entities.is_empty() {
                println!("No migration entities found.");
                println!("Run 'airlift create' to register one.");
                return Ok(());
            }

            println!("{}", "Migration entities:".cyan().bold());
            println!();
            for entity in &entities {
                println!(
                    "{}  {:<8} {}  {}",
                    entity.id,
                    entity.kind.as_str(),
                    entity.source_full_path,
                    paint_status(entity.status.as_str())
                );
            }
        }
    }

    Ok(())
}
