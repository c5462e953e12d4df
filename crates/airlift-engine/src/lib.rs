//! Airlift Migration Engine
//!
//! Pipeline-based bulk migration of groups and projects from a remote
//! installation, one relation at a time.
//!
//! # Architecture
//!
//! - **Entities and trackers**: a migration entity is one group or project;
//!   each of its relations gets a tracker row that records pipeline progress
//!   and survives restarts
//! - **Pipelines**: immutable extract/transform/load descriptors compiled
//!   into a registry at startup; the runner drives one tracker per invocation
//! - **Dedupe ledger**: SQLite-backed seen-record cache that makes tracker
//!   retries skip work already done
//! - **File transfer**: archive relations (uploads, LFS objects, wikis) are
//!   downloaded, decompressed and unpacked under per-run scratch directories
//!   with every member path validated before it touches disk
//!
//! # Example
//!
//! ```no_run
//! use airlift_engine::config::EngineConfig;
//! use airlift_engine::entity::EntityKind;
//! use airlift_engine::service::MigrationService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = MigrationService::new(EngineConfig::load()?).await?;
//!     let entity = service
//!         .create_entity(EntityKind::Group, "acme/widgets", "widgets")
//!         .await?;
//!     let report = service.run_entity(entity.id).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod destination;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod finisher;
pub mod loaders;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod transfer;
pub mod transformers;

pub use error::{AirliftError, Result};
pub use service::MigrationService;
