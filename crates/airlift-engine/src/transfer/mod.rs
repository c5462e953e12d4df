//! Per-run scratch state for binary relations
//!
//! Each file-transfer run owns one private scratch directory holding the
//! downloaded archive, the inflated tar and the extracted tree. The directory
//! is created when extraction starts and removed when the run ends, on every
//! exit path. `TempDir` removal on drop backs up the explicit cleanup call.

pub mod archive;

use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Progress of the download/decompress/extract/load flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    Pending,
    Downloading,
    Decompressing,
    Extracting,
    /// Loading the given number of validated files
    Loading(u64),
    Done,
    Failed,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStep::Pending => write!(f, "pending"),
            TransferStep::Downloading => write!(f, "downloading"),
            TransferStep::Decompressing => write!(f, "decompressing"),
            TransferStep::Extracting => write!(f, "extracting"),
            TransferStep::Loading(files) => write!(f, "loading({files})"),
            TransferStep::Done => write!(f, "done"),
            TransferStep::Failed => write!(f, "failed"),
        }
    }
}

/// Scratch directory and progress for one file-transfer run
pub struct FileTransferState {
    scratch: TempDir,
    relation: String,
    step: TransferStep,
    rejected_members: u64,
}

impl FileTransferState {
    /// Create the scratch directory under `scratch_root`. The directory name
    /// carries the relation plus a random suffix so concurrent runs for the
    /// same entity never collide.
    pub fn create(scratch_root: &Path, relation: &str) -> Result<Self> {
        std::fs::create_dir_all(scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("airlift-{relation}-"))
            .tempdir_in(scratch_root)?;
        debug!(relation, scratch = %scratch.path().display(), "Created transfer scratch directory");

        Ok(Self {
            scratch,
            relation: relation.to_string(),
            step: TransferStep::Pending,
            rejected_members: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.scratch.path()
    }

    /// Download target: `<relation>.tar.gz`
    pub fn archive_path(&self) -> PathBuf {
        self.scratch.path().join(format!("{}.tar.gz", self.relation))
    }

    /// Inflated archive: `<relation>.tar`
    pub fn tar_path(&self) -> PathBuf {
        self.scratch.path().join(format!("{}.tar", self.relation))
    }

    /// Root of the validated extracted tree
    pub fn extracted_dir(&self) -> PathBuf {
        self.scratch.path().join("extracted")
    }

    pub fn step(&self) -> TransferStep {
        self.step
    }

    pub fn advance(&mut self, step: TransferStep) {
        debug!(relation = %self.relation, from = %self.step, to = %step, "Transfer step");
        self.step = step;
    }

    /// Count of archive members rejected by per-file validation
    pub fn rejected_members(&self) -> u64 {
        self.rejected_members
    }

    pub fn add_rejected(&mut self, count: u64) {
        self.rejected_members += count;
    }

    /// Remove the scratch directory. Errors are logged, not propagated: a
    /// leftover scratch directory must never mask the run's own outcome.
    pub fn cleanup(self) {
        let path = self.scratch.path().to_path_buf();
        if let Err(err) = self.scratch.close() {
            warn!(scratch = %path.display(), error = %err, "Failed to remove transfer scratch directory");
        } else {
            debug!(scratch = %path.display(), "Removed transfer scratch directory");
        }
    }
}
