//! Depot sync orchestration.
//!
//! For one depot update:
//! 1. select the manifest files the depot's patterns ask for
//! 2. for each file, in manifest order and one at a time:
//!    skip it if the installed copy already has the manifest digest,
//!    otherwise fetch its chunks, verify the digest and install it
//! 3. report failures and run the post-install hook if anything changed
//!
//! A failing file never stops the files after it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::acquire::ChunkAcquisitionCoordinator;
use crate::error::{AcquisitionFailure, InstallError, ManifestResult};
use crate::filter;
use crate::install::AtomicInstaller;
use crate::manifest::ManifestEntry;
use crate::patterns::SharedPatternRegistry;
use crate::report::{DepotSyncReport, FileOutcome, SyncOutcome, SyncReporter};
use crate::source::{ChunkTransport, DepotJob, ManifestSource};
use crate::verify;

/// Runs depot syncs against a shared pattern registry.
///
/// Holds no per-sync state, so one syncer can serve several depots at once.
#[derive(Clone)]
pub struct DepotSyncer {
    patterns: SharedPatternRegistry,
    coordinator: ChunkAcquisitionCoordinator,
    installer: AtomicInstaller,
    reporter: SyncReporter,
}

impl DepotSyncer {
    pub fn new(
        patterns: SharedPatternRegistry,
        transport: Arc<dyn ChunkTransport>,
        installer: AtomicInstaller,
        reporter: SyncReporter,
    ) -> Self {
        Self {
            patterns,
            coordinator: ChunkAcquisitionCoordinator::new(transport),
            installer,
            reporter,
        }
    }

    /// Set the per-chunk attempt budget.
    pub fn with_chunk_attempts(mut self, attempts: usize) -> Self {
        self.coordinator = self.coordinator.with_max_attempts(attempts);
        self
    }

    pub fn patterns(&self) -> &SharedPatternRegistry {
        &self.patterns
    }

    /// Whether a depot has any patterns and is worth syncing at all.
    pub fn is_tracked(&self, depot_id: u32) -> bool {
        self.patterns.is_tracked(depot_id)
    }

    /// Fetch the depot's manifest from `source` and sync it.
    pub async fn sync_from_source(
        &self,
        job: DepotJob,
        source: &dyn ManifestSource,
    ) -> ManifestResult<DepotSyncReport> {
        if !self.is_tracked(job.depot_id) {
            return Ok(DepotSyncReport::new(job.depot_id));
        }
        let manifest = source.manifest(job.depot_id).await?;
        Ok(self.sync_depot(job, &manifest.files).await)
    }

    /// Sync the selected files of `files` into the mirror.
    pub async fn sync_depot(&self, job: DepotJob, files: &[ManifestEntry]) -> DepotSyncReport {
        let registry = self.patterns.snapshot();
        let selected = filter::select(&registry, job.depot_id, files);
        let mut report = DepotSyncReport::new(job.depot_id);

        if selected.is_empty() {
            return report;
        }

        debug!(
            depot_id = job.depot_id,
            "Will download {} files from depot",
            selected.len()
        );

        let job = Arc::new(job);
        for file in selected {
            let outcome = self.sync_file(&job, file).await;
            report.outcomes.push(FileOutcome::new(file.path.clone(), outcome));
        }

        self.reporter.report(&job, &report);
        report
    }

    async fn sync_file(&self, job: &Arc<DepotJob>, file: &ManifestEntry) -> SyncOutcome {
        let destination = match self.installer.destination(job.depot_id, &file.path) {
            Ok(path) => path,
            Err(e) => return install_failed(e, 0, file.chunks.len()),
        };

        let expected = file.digest;
        let check_path = destination.clone();
        let unchanged =
            tokio::task::spawn_blocking(move || verify::is_unchanged(&check_path, &expected))
                .await
                .unwrap_or(false);
        if unchanged {
            debug!(file = %file.path, "File already matches the manifest");
            return SyncOutcome::Unchanged;
        }

        info!(
            depot_id = job.depot_id,
            file = %file.path,
            bytes = file.size,
            chunks = file.chunks.len(),
            "Downloading file"
        );

        let bytes = match self.coordinator.acquire(Arc::clone(job), file).await {
            Ok(bytes) => bytes,
            Err(failure) => return acquisition_failed(failure),
        };

        if !verify::verify(file, &bytes) {
            warn!(file = %file.path, "Assembled file does not match manifest digest");
            return acquisition_failed(AcquisitionFailure::digest_mismatch(file.chunks.len()));
        }

        let installer = self.installer.clone();
        let depot_id = job.depot_id;
        let path = file.path.clone();
        let installed =
            tokio::task::spawn_blocking(move || installer.install(depot_id, &path, &bytes))
                .await
                .map_err(|e| InstallError::Task(e.to_string()))
                .and_then(|result| result);

        match installed {
            Ok(dest) => {
                info!(
                    depot_id,
                    file = %file.path,
                    destination = %dest.display(),
                    "Installed file"
                );
                SyncOutcome::Installed
            }
            Err(e) => install_failed(e, file.chunks.len(), file.chunks.len()),
        }
    }
}

fn acquisition_failed(failure: AcquisitionFailure) -> SyncOutcome {
    SyncOutcome::Failed {
        reason: failure.last_error,
        chunks_succeeded: failure.successful_chunks,
        chunks_total: failure.total_chunks,
    }
}

fn install_failed(e: InstallError, chunks_succeeded: usize, chunks_total: usize) -> SyncOutcome {
    SyncOutcome::Failed {
        reason: e.to_string(),
        chunks_succeeded,
        chunks_total,
    }
}
