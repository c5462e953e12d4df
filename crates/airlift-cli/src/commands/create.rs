//! `airlift create` command implementation
//!
//! Registers a migration entity and one tracker per relation its kind
//! migrates.

use super::open_service;
use crate::error::Result;
use crate::KindArg;
use airlift_engine::entity::EntityKind;
use colored::Colorize;

pub async fn run(
    kind: KindArg,
    source: String,
    slug: Option<String>,
    start: bool,
) -> Result<()> {
    let kind = EntityKind::from(kind);
    let slug = match slug {
        Some(slug) => slug,
        None => source.rsplit('/').next().unwrap_or(&source).to_string(),
    };

    let service = open_service().await?;
    let entity = service.create_entity(kind, &source, &slug).await?;

    println!(
        "{} {} {} registered as {}",
        "Created:".green().bold(),
        kind.as_str(),
        source,
        entity.id
    );

    if start {
        println!();
        super::run::execute(&service, entity.id).await?;
    } else {
        println!("Run 'airlift run {}' to start the migration.", entity.id);
    }

    Ok(())
}
