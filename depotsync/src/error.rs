//! Error types for depot synchronization.
//!
//! Every failure in this crate is scoped to a single file or a single
//! depot; nothing here is fatal to the running process.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Message used when a file failed without any chunk error being recorded,
/// which only happens when the assembled content does not match its digest.
pub const CHECKSUM_FAILED_MESSAGE: &str = "or checksum failed";

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for installing files into the mirror.
pub type InstallResult<T> = Result<T, InstallError>;

/// Result type for manifest sources.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors raised while loading pattern or sync configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The pattern source is not a `{depot id: [pattern, ...]}` document.
    #[error("malformed pattern source: {0}")]
    Malformed(String),

    /// A depot's combined pattern set failed to compile.
    #[error("invalid pattern for depot {depot_id}: {reason}")]
    InvalidPattern { depot_id: u32, reason: String },

    /// A sync configuration value could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// A single failed chunk fetch attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkFetchError {
    /// The transport reported a failure.
    #[error("{0}")]
    Transport(String),

    /// The transport could not be set up at all.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The transport returned a different number of bytes than declared.
    #[error("chunk {chunk_id} returned {actual} bytes, expected {expected}")]
    LengthMismatch {
        chunk_id: String,
        expected: u32,
        actual: usize,
    },

    /// The chunk does not fit inside the file's declared size.
    #[error("chunk {chunk_id} at offset {offset} exceeds file size {file_size}")]
    OutOfBounds {
        chunk_id: String,
        offset: u64,
        file_size: u64,
    },
}

/// A file's chunk acquisition gave up.
///
/// Carries exactly what the operator message needs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("only {successful_chunks} out of {total_chunks} chunks downloaded ({last_error})")]
pub struct AcquisitionFailure {
    pub successful_chunks: usize,
    pub total_chunks: usize,
    pub last_error: String,
}

impl AcquisitionFailure {
    /// Failure for a file whose chunks all arrived but whose content did not
    /// hash to the declared digest.
    pub fn digest_mismatch(total_chunks: usize) -> Self {
        Self {
            successful_chunks: total_chunks,
            total_chunks,
            last_error: CHECKSUM_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Errors raised while placing a verified file into the mirror.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The manifest path would escape the depot directory.
    #[error("refusing to install outside the depot directory: {0}")]
    InvalidPath(String),

    /// A directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    /// The staged temporary file could not be written.
    #[error("failed to write staged file in {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// The staged file could not be moved over the destination.
    #[error("failed to replace {}: {source}", path.display())]
    Rename { path: PathBuf, source: io::Error },

    /// The blocking install task did not complete.
    #[error("install task failed: {0}")]
    Task(String),
}

/// Errors raised by a manifest source.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be read.
    #[error("failed to read manifest {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The manifest document is not valid.
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// A digest field is not a valid hex digest.
    #[error("invalid digest {value:?}: {reason}")]
    InvalidDigest { value: String, reason: String },
}

/// The post-install hook could not be started.
#[derive(Debug, Error)]
#[error("failed to run post-install hook {}: {source}", path.display())]
pub struct HookError {
    pub path: PathBuf,
    pub source: io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_failure_display() {
        let err = AcquisitionFailure {
            successful_chunks: 2,
            total_chunks: 5,
            last_error: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "only 2 out of 5 chunks downloaded (connection reset)"
        );
    }

    #[test]
    fn test_digest_mismatch_failure() {
        let err = AcquisitionFailure::digest_mismatch(4);
        assert_eq!(err.successful_chunks, 4);
        assert_eq!(err.total_chunks, 4);
        assert_eq!(err.last_error, CHECKSUM_FAILED_MESSAGE);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidPattern {
            depot_id: 441,
            reason: "unclosed group".to_string(),
        };
        assert!(err.to_string().contains("depot 441"));
        assert!(err.to_string().contains("unclosed group"));
    }

    #[test]
    fn test_client_error_is_not_a_transport_failure() {
        let err = ChunkFetchError::Client("no TLS backend".to_string());
        assert_eq!(err.to_string(), "failed to create HTTP client: no TLS backend");
        assert!(!matches!(err, ChunkFetchError::Transport(_)));
    }

    #[test]
    fn test_result_aliases() {
        fn load() -> ConfigResult<u32> {
            Err(ConfigError::Malformed("empty".to_string()))
        }
        fn install() -> InstallResult<()> {
            Err(InstallError::InvalidPath("../x".to_string()))
        }
        fn manifest() -> ManifestResult<()> {
            Err(ManifestError::Parse("eof".to_string()))
        }
        assert!(load().is_err());
        assert!(install().is_err());
        assert!(manifest().is_err());
    }

    #[test]
    fn test_chunk_length_mismatch_display() {
        let err = ChunkFetchError::LengthMismatch {
            chunk_id: "ab12".to_string(),
            expected: 1024,
            actual: 10,
        };
        assert_eq!(err.to_string(), "chunk ab12 returned 10 bytes, expected 1024");
    }
}
