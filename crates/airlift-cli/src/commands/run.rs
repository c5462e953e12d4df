//! `airlift run` command implementation
//!
//! Drives every pending relation pipeline of an entity to completion.

use super::{open_service, parse_entity_id, print_report};
use crate::error::Result;
use crate::progress;
use airlift_engine::MigrationService;
use colored::Colorize;
use uuid::Uuid;

pub async fn run(entity: String) -> Result<()> {
    let id = parse_entity_id(&entity)?;
    let service = open_service().await?;
    execute(&service, id).await
}

/// Run the entity, aborting it cleanly on Ctrl-C
pub(crate) async fn execute(service: &MigrationService, id: Uuid) -> Result<()> {
    let spinner = progress::create_spinner(&format!("Migrating entity {id}"));

    let report = tokio::select! {
        result = service.run_entity(id) => {
            spinner.finish_and_clear();
            result?
        }
        _ = tokio::signal::ctrl_c() => {
            spinner.finish_and_clear();
            println!("{}", "Interrupt received, aborting migration...".yellow());
            service.abort(id).await?
        }
    };

    print_report(&report);
    Ok(())
}
