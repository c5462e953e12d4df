//! Archive inflation and validated extraction
//!
//! Archives come from a remote installation and are untrusted. Inflation is
//! capped to bound decompression bombs, and every tar member is validated
//! before its content can reach a loader: the declared path must stay inside
//! the extraction root, only regular files are unpacked, and link members are
//! rejected outright. A rejected member fails that file alone; extraction
//! continues with the rest of the archive.
//!
//! All functions here do blocking filesystem I/O and are expected to run on a
//! blocking worker thread.

use crate::error::{AirliftError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// One archive member that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Resolved absolute path under the extraction root
    pub absolute: PathBuf,
    /// Member path relative to the extraction root, with `/` separators
    pub relative: String,
}

/// Outcome of extracting one archive
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Validated regular files, in archive order
    pub files: Vec<ExtractedFile>,
    /// Members rejected by validation
    pub rejected: u64,
}

/// Inflate a gzip file to `dest`, enforcing `max_bytes` on the inflated size
///
/// # Returns
/// Number of inflated bytes written
pub fn gunzip_file(src: &Path, dest: &Path, max_bytes: u64) -> Result<u64> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut output = BufWriter::new(File::create(dest)?);
    let mut buffer = [0u8; 64 * 1024];
    let mut written: u64 = 0;

    loop {
        let n = decoder.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > max_bytes {
            return Err(AirliftError::SizeLimit {
                what: format!("decompression of {}", src.display()),
                limit: max_bytes,
            });
        }
        output.write_all(&buffer[..n])?;
    }

    output.flush()?;
    debug!(src = %src.display(), bytes = written, "Inflated archive");
    Ok(written)
}

/// Unpack a tar archive into `dest_root`, validating every member
///
/// Directories are skipped (files create their own parents), link members and
/// members whose declared path would leave `dest_root` are rejected and
/// counted, and each unpacked file is re-resolved to confirm it landed inside
/// the root.
pub fn extract_validated(tar_path: &Path, dest_root: &Path) -> Result<ExtractionReport> {
    std::fs::create_dir_all(dest_root)?;
    let root = dest_root.canonicalize()?;

    let mut tar = tar::Archive::new(BufReader::new(File::open(tar_path)?));
    let mut report = ExtractionReport::default();

    for entry in tar.entries()? {
        let mut entry = entry?;

        let declared = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(err) => {
                warn!(error = %err, "Rejected archive member with unreadable path");
                report.rejected += 1;
                continue;
            }
        };

        let Some(relative) = contained_relative(&declared) else {
            warn!(path = %declared.display(), "Rejected archive member escaping the extraction root");
            report.rejected += 1;
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            debug!(path = %relative.display(), "Skipping directory member");
            continue;
        }
        if kind.is_symlink() || kind.is_hard_link() {
            warn!(path = %relative.display(), "Rejected link archive member");
            report.rejected += 1;
            continue;
        }
        if !kind.is_file() {
            warn!(path = %relative.display(), kind = ?kind, "Rejected special archive member");
            report.rejected += 1;
            continue;
        }

        let dest = root.join(&relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;

        // Re-resolve what actually landed on disk. The lexical check above
        // bounds the declared path; this bounds the real one.
        let resolved = dest.canonicalize()?;
        if !resolved.starts_with(&root) || !resolved.is_file() {
            std::fs::remove_file(&dest).ok();
            warn!(path = %relative.display(), "Rejected archive member resolving outside the extraction root");
            report.rejected += 1;
            continue;
        }

        report.files.push(ExtractedFile {
            absolute: resolved,
            relative: relative.to_string_lossy().replace('\\', "/"),
        });
    }

    debug!(
        files = report.files.len(),
        rejected = report.rejected,
        "Extracted archive"
    );
    Ok(report)
}

/// Normalize a declared member path to a root-relative path, or `None` when
/// any component could climb out of the root
fn contained_relative(declared: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in declared.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}
