//! SHA-256 checksum utilities
//!
//! Large binary payloads (LFS objects, uploaded files) are content-addressed
//! by their SHA-256 digest, so the same helpers serve both integrity checks
//! and object identity.

use crate::error::{CommonError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 hex digest of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 hex digest of any readable source, streaming
pub fn compute_checksum<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the SHA-256 hex digest of a file
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file)
}

/// Verify a file against an expected SHA-256 hex digest
///
/// Comparison is case-insensitive since upstream manifests are inconsistent
/// about digest casing.
pub fn verify_file_checksum(path: impl AsRef<Path>, expected: &str) -> Result<()> {
    let actual = compute_file_checksum(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
