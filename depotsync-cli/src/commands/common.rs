//! Common utilities shared across CLI commands.

use std::path::PathBuf;

use depotsync::{ConfigError, SyncConfig};

use crate::error::CliError;

/// Resolve sync settings: config file first, then CLI overrides.
///
/// An explicitly named config file must exist; without one the defaults
/// are used.
pub fn resolve_config(
    config_path: Option<PathBuf>,
    files_dir: Option<PathBuf>,
) -> Result<SyncConfig, CliError> {
    let config = match config_path {
        Some(path) => SyncConfig::from_ini(&path)?,
        None => SyncConfig::default(),
    };

    Ok(match files_dir {
        Some(dir) => config.with_files_dir(dir),
        None => config,
    })
}

/// Parse a hex-encoded depot key.
pub fn parse_depot_key(key: Option<&str>) -> Result<Vec<u8>, CliError> {
    match key {
        Some(key) => hex::decode(key.trim()).map_err(|e| {
            CliError::InvalidArgument(format!("depot key is not valid hex ({}): {}", e, key))
        }),
        None => Ok(Vec::new()),
    }
}

/// Whether a config error only means the pattern file is absent.
pub fn is_missing_file(e: &ConfigError) -> bool {
    matches!(e, ConfigError::NotFound { .. })
}
