//! CLI error types.

use std::fmt;

use depotsync::{ChunkFetchError, ConfigError, ManifestError};

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(ConfigError),

    /// The manifest could not be loaded.
    Manifest(ManifestError),

    /// The chunk transport could not be created.
    Transport(ChunkFetchError),

    /// A command-line argument was invalid.
    InvalidArgument(String),

    /// Failed to create the Tokio runtime.
    RuntimeCreation(String),

    /// Some files of the depot failed to sync.
    SyncFailed { failed: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Manifest(e) => write!(f, "Manifest error: {}", e),
            CliError::Transport(e) => write!(f, "Transport error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::RuntimeCreation(msg) => write!(f, "Failed to create Tokio runtime: {}", msg),
            CliError::SyncFailed { failed } => write!(f, "{} file(s) failed to sync", failed),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Manifest(e) => Some(e),
            CliError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<ManifestError> for CliError {
    fn from(e: ManifestError) -> Self {
        CliError::Manifest(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_failed_display() {
        let err = CliError::SyncFailed { failed: 2 };
        assert_eq!(err.to_string(), "2 file(s) failed to sync");
    }

    #[test]
    fn test_from_config_error() {
        let err: CliError = ConfigError::Malformed("bad".to_string()).into();
        assert!(matches!(err, CliError::Config(_)));
        assert!(err.to_string().contains("Configuration error"));
    }
}
