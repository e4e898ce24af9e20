//! Content digest verification.
//!
//! Staged content is checked against the manifest digest before it is
//! installed, and files already in the mirror are streamed through the same
//! digest to decide whether a fetch is needed at all.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::manifest::{FileDigest, ManifestEntry};

/// Buffer size for reading files during digest calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Whether `staged` is the content `file` declares.
///
/// A file with no chunks is verified by definition: there is no fetched
/// content to check.
pub fn verify(file: &ManifestEntry, staged: &[u8]) -> bool {
    if file.is_chunkless() {
        return true;
    }
    verify_digest(staged, &file.digest)
}

/// Whether `data` hashes to `expected`.
pub fn verify_digest(data: &[u8], expected: &FileDigest) -> bool {
    FileDigest::compute(data).matches(expected)
}

/// Stream a file from disk through the content digest.
pub fn file_digest(path: &Path) -> io::Result<FileDigest> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.into())
}

/// Whether an installed file already has the declared digest.
///
/// Missing or unreadable files count as changed.
pub fn is_unchanged(path: &Path, expected: &FileDigest) -> bool {
    match file_digest(path) {
        Ok(actual) => actual.matches(expected),
        Err(_) => false,
    }
}
