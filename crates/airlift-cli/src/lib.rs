//! Airlift CLI Library
//!
//! Command-line interface for driving bulk migrations.
//!
//! # Overview
//!
//! - **Registration**: create a migration entity with its relation trackers
//!   (`airlift create`)
//! - **Execution**: run every pending relation pipeline (`airlift run`)
//! - **Monitoring**: inspect entity and tracker state (`airlift status`)
//! - **Control**: abort a running migration (`airlift abort`)
//! - **Cleanup**: remove an entity and its migrated data (`airlift delete`)

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use airlift_engine::entity::EntityKind;
use clap::{Parser, Subcommand, ValueEnum};

/// Airlift - bulk migration of groups and projects
#[derive(Parser, Debug)]
#[command(name = "airlift")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print CLI documentation as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a migration entity and its relation trackers
    Create {
        /// Kind of entity to migrate
        #[arg(value_enum)]
        kind: KindArg,

        /// Full path of the source group or project (e.g. "acme/widgets")
        source: String,

        /// Destination slug (defaults to the last source path segment)
        #[arg(short, long)]
        slug: Option<String>,

        /// Start the migration immediately after registering it
        #[arg(long)]
        run: bool,
    },

    /// Run every pending relation pipeline of an entity
    Run {
        /// Entity id
        entity: String,
    },

    /// Show one entity in detail, or list all entities
    Status {
        /// Entity id; omit to list all entities
        entity: Option<String>,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Abort a migration, failing all of its unfinished trackers
    Abort {
        /// Entity id
        entity: String,
    },

    /// Delete an entity along with its trackers, ledger entries and files
    Delete {
        /// Entity id
        entity: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Entity kind as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum KindArg {
    Group,
    Project,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Group => EntityKind::Group,
            KindArg::Project => EntityKind::Project,
        }
    }
}
