//! DepotSync - selective mirroring of depot files from chunked content sources
//!
//! Given a depot manifest, this library picks the files a depot's patterns
//! ask for, fetches their chunks concurrently with per-chunk retries,
//! verifies each assembled file against its manifest digest, and atomically
//! installs it into a local mirror.
//!
//! # Architecture
//!
//! ```text
//! DepotSyncer (sync)
//!     │
//!     ├── SharedPatternRegistry (patterns) ── filter::select
//!     │
//!     ├── ChunkAcquisitionCoordinator (acquire)
//!     │       ├── ChunkTransport (trait)
//!     │       └── StagingArena (staging)
//!     │
//!     ├── verify
//!     │
//!     ├── AtomicInstaller (install)
//!     │
//!     └── SyncReporter (report)
//!             ├── OperatorNotifier (trait)
//!             └── PostInstallHook (trait)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use depotsync::{
//!     AtomicInstaller, DepotJob, DepotSyncer, HttpChunkTransport, JsonManifest, LogNotifier,
//!     ScriptHook, SharedPatternRegistry, SyncConfig, SyncReporter,
//! };
//!
//! let config = SyncConfig::default();
//! let patterns = SharedPatternRegistry::default();
//! let _ = patterns.reload_from(&config.patterns_file);
//!
//! let syncer = DepotSyncer::new(
//!     patterns,
//!     Arc::new(HttpChunkTransport::new(config.fetch_timeout)?),
//!     AtomicInstaller::new(&config.files_dir, &config.scratch_dir),
//!     SyncReporter::new(Arc::new(LogNotifier), Arc::new(ScriptHook::new(&config.hook_script))),
//! );
//!
//! let manifest = JsonManifest::load("manifest.json".as_ref())?;
//! let report = syncer
//!     .sync_from_source(DepotJob::new(441, "http://cdn.example.com"), &manifest)
//!     .await?;
//! ```

pub mod acquire;
pub mod config;
pub mod error;
pub mod filter;
pub mod http;
pub mod install;
pub mod logging;
pub mod manifest;
pub mod patterns;
pub mod report;
pub mod source;
pub mod staging;
pub mod sync;
pub mod verify;

pub use acquire::{ChunkAcquisitionCoordinator, DEFAULT_CHUNK_ATTEMPTS};
pub use config::SyncConfig;
pub use error::{
    AcquisitionFailure, ChunkFetchError, ConfigError, ConfigResult, HookError, InstallError,
    InstallResult, ManifestError, ManifestResult,
};
pub use http::HttpChunkTransport;
pub use install::{AtomicInstaller, StagedFile};
pub use manifest::{ChunkDescriptor, DepotManifest, FileDigest, JsonManifest, ManifestEntry};
pub use patterns::{DepotMatcher, PatternRegistry, PatternRule, SharedPatternRegistry};
pub use report::{
    DepotSyncReport, FileOutcome, LogNotifier, NoopHook, ScriptHook, SyncOutcome, SyncReporter,
};
pub use source::{
    BoxFuture, ChunkTransport, DepotJob, ManifestSource, OperatorNotifier, PostInstallHook,
};
pub use staging::StagingArena;
pub use sync::DepotSyncer;
