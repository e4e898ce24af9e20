//! Configuration for depot syncing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use tracing::error;

use crate::acquire::DEFAULT_CHUNK_ATTEMPTS;
use crate::error::{ConfigError, ConfigResult};

/// Default root of the local mirror.
pub const DEFAULT_FILES_DIR: &str = "files";

/// Default directory for rotated log files, kept apart from the mirror.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Name of the pattern file inside the files directory.
pub const PATTERNS_FILE_NAME: &str = "files.json";

/// Name of the post-install script inside the files directory.
pub const HOOK_SCRIPT_NAME: &str = "update.sh";

/// Name of the scratch directory inside the files directory.
pub const SCRATCH_DIR_NAME: &str = ".staging";

/// Section of the INI file holding sync settings.
const INI_SECTION: &str = "sync";

/// Configuration for depot syncing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Root of the mirror; depots live in `<files_dir>/<depot id>`.
    pub files_dir: PathBuf,

    /// Where files are staged before being renamed into place.
    ///
    /// Must be on the same filesystem as `files_dir`.
    pub scratch_dir: PathBuf,

    /// JSON file mapping depot ids to file patterns.
    pub patterns_file: PathBuf,

    /// Script run with the depot id after files were installed.
    pub hook_script: PathBuf,

    /// Fetch attempts per chunk before a file is given up.
    pub chunk_attempts: usize,

    /// Timeout for a single chunk request.
    pub fetch_timeout: Duration,

    /// Where rotated log files are written.
    pub log_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_FILES_DIR))
    }
}

impl SyncConfig {
    /// Create a configuration rooted at `files_dir`, with every other path
    /// placed inside it.
    pub fn new(files_dir: PathBuf) -> Self {
        Self {
            scratch_dir: files_dir.join(SCRATCH_DIR_NAME),
            patterns_file: files_dir.join(PATTERNS_FILE_NAME),
            hook_script: files_dir.join(HOOK_SCRIPT_NAME),
            files_dir,
            chunk_attempts: DEFAULT_CHUNK_ATTEMPTS,
            fetch_timeout: Duration::from_secs(30),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }

    /// Load settings from the `[sync]` section of an INI file.
    ///
    /// Missing keys keep their defaults; unknown keys are ignored.
    pub fn from_ini(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        })?;
        Self::from_ini_document(&ini)
    }

    fn from_ini_document(ini: &Ini) -> ConfigResult<Self> {
        let Some(section) = ini.section(Some(INI_SECTION)) else {
            return Ok(Self::default());
        };

        let mut config = match section.get("files_dir") {
            Some(dir) => Self::new(PathBuf::from(dir)),
            None => Self::default(),
        };
        if let Some(dir) = section.get("scratch_dir") {
            config.scratch_dir = PathBuf::from(dir);
        }
        if let Some(file) = section.get("patterns_file") {
            config.patterns_file = PathBuf::from(file);
        }
        if let Some(script) = section.get("hook_script") {
            config.hook_script = PathBuf::from(script);
        }
        if let Some(dir) = section.get("log_dir") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(value) = section.get("chunk_attempts") {
            config.chunk_attempts = parse_number("chunk_attempts", value)?;
        }
        if let Some(value) = section.get("fetch_timeout_secs") {
            config.fetch_timeout = Duration::from_secs(parse_number("fetch_timeout_secs", value)?);
        }

        Ok(config)
    }

    /// Override the files directory, moving the derived paths with it.
    pub fn with_files_dir(self, files_dir: PathBuf) -> Self {
        Self {
            chunk_attempts: self.chunk_attempts,
            fetch_timeout: self.fetch_timeout,
            log_dir: self.log_dir,
            ..Self::new(files_dir)
        }
    }

    /// Set the chunk attempt budget.
    pub fn with_chunk_attempts(mut self, attempts: usize) -> Self {
        self.chunk_attempts = attempts;
        self
    }

    /// Set the chunk fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Create the files and scratch directories.
    ///
    /// Failure is logged, not returned: syncing can still report errors
    /// per file later.
    pub fn ensure_directories(&self) {
        for dir in [&self.files_dir, &self.scratch_dir] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!(dir = %dir.display(), error = %e, "Unable to create directory");
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
