//! Airlift Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the airlift workspace:
//!
//! - **Logging**: tracing subscriber setup with console/file outputs
//! - **Checksums**: SHA-256 content addressing and verification
//! - **Error Handling**: shared error and result types
//!
//! # Example
//!
//! ```no_run
//! use airlift_common::checksum::compute_file_checksum;
//! use airlift_common::Result;
//!
//! fn digest_of(path: &str) -> Result<String> {
//!     compute_file_checksum(path)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
