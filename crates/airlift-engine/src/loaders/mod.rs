//! Loading strategies
//!
//! One loader per destination shape: relational records keyed by a natural
//! unique constraint, uploaded files routed by path pattern, content-addressed
//! LFS objects, and wiki repository bundles handed to a git collaborator.

pub mod lfs;
pub mod record;
pub mod uploads;
pub mod wiki;

pub use lfs::LfsObjectsLoader;
pub use record::RecordLoader;
pub use uploads::UploadsLoader;
pub use wiki::{BundleImporter, VerifyingBundleImporter, WikiLoader};
