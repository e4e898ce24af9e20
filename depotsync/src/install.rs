//! Atomic installation of verified files into the local mirror.
//!
//! Installed files live at `<files_dir>/<depot id>/<manifest path>`. New
//! content is first written to a temporary file in the scratch directory,
//! which sits on the same volume, and then renamed over the destination.
//! Readers of the destination therefore see either the old file or the new
//! one, never a partial write.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{InstallError, InstallResult};

/// Places verified files into the mirror.
#[derive(Debug, Clone)]
pub struct AtomicInstaller {
    files_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl AtomicInstaller {
    /// Create an installer writing under `files_dir`, staging in
    /// `scratch_dir`. Both should be on the same filesystem.
    pub fn new(files_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Final location of a manifest path within a depot.
    ///
    /// Rejects paths that are absolute or climb out of the depot directory.
    pub fn destination(&self, depot_id: u32, path: &str) -> InstallResult<PathBuf> {
        let mut dest = self.files_dir.join(depot_id.to_string());
        let mut pushed = 0usize;

        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => {
                    dest.push(part);
                    pushed += 1;
                }
                Component::CurDir => {}
                _ => return Err(InstallError::InvalidPath(path.to_string())),
            }
        }

        if pushed == 0 {
            return Err(InstallError::InvalidPath(path.to_string()));
        }
        Ok(dest)
    }

    /// Write `bytes` to a temporary file destined for `path`.
    ///
    /// Nothing at the destination changes until [`StagedFile::commit`].
    /// Dropping the staged file removes the temporary copy.
    pub fn stage(
        &self,
        depot_id: u32,
        path: &str,
        bytes: &[u8],
    ) -> InstallResult<StagedFile> {
        let destination = self.destination(depot_id, path)?;

        if let Some(parent) = destination.parent() {
            create_dir(parent)?;
        }
        create_dir(&self.scratch_dir)?;

        let write_err = |e: std::io::Error| InstallError::Write {
            path: self.scratch_dir.clone(),
            source: e,
        };
        let mut temp = NamedTempFile::new_in(&self.scratch_dir).map_err(write_err)?;
        temp.write_all(bytes).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;

        debug!(
            temp = %temp.path().display(),
            destination = %destination.display(),
            bytes = bytes.len(),
            "Staged file"
        );
        Ok(StagedFile { temp, destination })
    }

    /// Stage and commit in one step, returning the installed path.
    pub fn install(
        &self,
        depot_id: u32,
        path: &str,
        bytes: &[u8],
    ) -> InstallResult<PathBuf> {
        self.stage(depot_id, path, bytes)?.commit()
    }
}

/// A fully written temporary file waiting to replace its destination.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedFile {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Rename the staged file over the destination.
    pub fn commit(self) -> InstallResult<PathBuf> {
        let destination = self.destination;
        self.temp
            .persist(&destination)
            .map_err(|e| InstallError::Rename {
                path: destination.clone(),
                source: e.error,
            })?;
        Ok(destination)
    }
}

fn create_dir(path: &Path) -> InstallResult<()> {
    fs::create_dir_all(path).map_err(|e| InstallError::CreateDir {
        path: path.to_path_buf(),
        source: e,
    })
}
