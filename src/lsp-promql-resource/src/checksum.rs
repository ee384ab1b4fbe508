//! SHA256 verification for downloaded artifacts.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{ResourceError, ResourceResult};

/// Block size used when hashing files.
pub const BLOCK_SIZE: usize = 4096;

/// Calculate the SHA256 hash of a file, reading it in fixed-size blocks.
pub fn calculate_sha256(path: &Path) -> ResourceResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BLOCK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the SHA256 checksum of a file.
pub fn verify_sha256(path: &Path, expected: &str) -> ResourceResult<()> {
    let actual = calculate_sha256(path)?;

    // Normalize expected (remove any whitespace, lowercase)
    let expected = expected.trim().to_lowercase();

    if actual != expected {
        return Err(ResourceError::ChecksumMismatch { expected, actual });
    }

    Ok(())
}

/// Check a file against an expected hex digest.
///
/// Unreadable files never verify.
pub fn verify(expected: &str, path: &Path) -> bool {
    match verify_sha256(path, expected) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Checksum verification of {:?} failed: {}", path, e);
            false
        }
    }
}
