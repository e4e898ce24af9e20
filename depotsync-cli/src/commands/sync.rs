//! Sync command - mirror the selected files of one depot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use depotsync::logging::init_logging;
use depotsync::{
    AtomicInstaller, DepotJob, DepotSyncReport, DepotSyncer, HttpChunkTransport, JsonManifest,
    LogNotifier, ScriptHook, SharedPatternRegistry, SyncReporter,
};
use tracing::info;

use super::common::{parse_depot_key, resolve_config};
use crate::error::CliError;

/// Arguments for the sync command.
pub struct SyncArgs {
    pub depot: u32,
    pub manifest: PathBuf,
    pub server: String,
    pub token: Option<String>,
    pub key: Option<String>,
    pub app_id: u32,
    pub app_name: Option<String>,
    pub config: Option<PathBuf>,
    pub files_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Run the sync command.
pub fn run(args: SyncArgs) -> Result<(), CliError> {
    let config = resolve_config(args.config, args.files_dir)?;
    let depot_key = parse_depot_key(args.key.as_deref())?;

    // Logging comes first so directory failures below are recorded.
    create_log_dir(&config.log_dir);
    let _log_guard = init_logging(&config.log_dir, args.verbose);
    config.ensure_directories();

    let patterns = SharedPatternRegistry::default();
    // A missing or broken pattern file is already logged and leaves the
    // depot untracked.
    let _ = patterns.reload_from(&config.patterns_file);

    let manifest = JsonManifest::load(&args.manifest)?;
    let transport = HttpChunkTransport::new(config.fetch_timeout).map_err(CliError::Transport)?;

    let syncer = DepotSyncer::new(
        patterns,
        Arc::new(transport),
        AtomicInstaller::new(&config.files_dir, &config.scratch_dir),
        SyncReporter::new(
            Arc::new(LogNotifier),
            Arc::new(ScriptHook::new(&config.hook_script)),
        ),
    )
    .with_chunk_attempts(config.chunk_attempts);

    let mut job = DepotJob::new(args.depot, args.server).with_depot_key(depot_key);
    if let Some(token) = args.token {
        job = job.with_cdn_token(token);
    }
    if let Some(name) = args.app_name {
        job = job.with_app(args.app_id, name);
    }

    if !syncer.is_tracked(job.depot_id) {
        println!(
            "Depot {} has no file patterns in {}, nothing to do",
            job.depot_id,
            config.patterns_file.display()
        );
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::RuntimeCreation(e.to_string()))?;

    info!(depot_id = job.depot_id, files_dir = %config.files_dir.display(), "Starting depot sync");
    let report = runtime.block_on(syncer.sync_from_source(job, &manifest))?;

    println!("{}", summary_line(&report));

    match report.failed() {
        0 => Ok(()),
        failed => Err(CliError::SyncFailed { failed }),
    }
}

/// Create the log directory before any subscriber exists to report failure.
fn create_log_dir(dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Warning: cannot create log directory {}: {}", dir.display(), e);
    }
}

/// One-line summary of a depot sync.
fn summary_line(report: &DepotSyncReport) -> String {
    format!(
        "Depot {}: {} installed, {} unchanged, {} failed",
        report.depot_id,
        report.installed(),
        report.unchanged(),
        report.failed()
    )
}
