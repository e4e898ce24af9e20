//! Concurrent chunk acquisition for a single file.
//!
//! Every chunk of the file gets its own task. Each task makes up to
//! `max_attempts` fetches through the [`ChunkTransport`] and copies a
//! successful result into the shared [`StagingArena`] at the chunk's
//! offset.
//!
//! # Failure Handling
//!
//! When a chunk runs out of attempts the file has failed. The task cancels
//! the shared [`CancellationToken`] and seals the arena:
//! - attempts that have not started yet see the token and stop
//! - attempts already in flight finish, but their bytes are discarded
//!
//! The coordinator always waits for every task before returning.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AcquisitionFailure, ChunkFetchError, CHECKSUM_FAILED_MESSAGE};
use crate::manifest::{ChunkDescriptor, ManifestEntry};
use crate::source::{ChunkTransport, DepotJob};
use crate::staging::{StagingArena, WriteOutcome};

/// Attempts per chunk: the first fetch plus five retries.
pub const DEFAULT_CHUNK_ATTEMPTS: usize = 6;

/// State shared by all chunk tasks of one file.
struct FileAcquisition {
    job: Arc<DepotJob>,
    transport: Arc<dyn ChunkTransport>,
    arena: StagingArena,
    cancel: CancellationToken,
    succeeded: AtomicUsize,
    last_error: Mutex<Option<String>>,
    max_attempts: usize,
    path: String,
    total_chunks: usize,
}

impl FileAcquisition {
    /// Fetch one chunk, retrying until it lands or the budget is spent.
    async fn acquire_chunk(&self, chunk: &ChunkDescriptor) {
        for attempt in 1..=self.max_attempts {
            if self.cancel.is_cancelled() {
                debug!(
                    file = %self.path,
                    chunk = %chunk.id,
                    "Skipping chunk, file acquisition already failed"
                );
                return;
            }

            match self.fetch_and_write(chunk).await {
                Ok(WriteOutcome::Written) => {
                    let done = self.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(
                        file = %self.path,
                        "Downloaded chunk ({}/{})",
                        done,
                        self.total_chunks
                    );
                    return;
                }
                Ok(WriteOutcome::Discarded) => {
                    debug!(
                        file = %self.path,
                        chunk = %chunk.id,
                        "Discarded chunk that arrived after failure"
                    );
                    return;
                }
                Err(e) => {
                    debug!(
                        file = %self.path,
                        chunk = %chunk.id,
                        attempt,
                        error = %e,
                        "Chunk fetch attempt failed"
                    );
                    *self.last_error.lock() = Some(e.to_string());
                }
            }
        }

        warn!(
            file = %self.path,
            chunk = %chunk.id,
            attempts = self.max_attempts,
            "Chunk exhausted its retry budget"
        );
        self.cancel.cancel();
        self.arena.seal();
    }

    async fn fetch_and_write(
        &self,
        chunk: &ChunkDescriptor,
    ) -> Result<WriteOutcome, ChunkFetchError> {
        let bytes = self.transport.fetch_chunk(&self.job, chunk).await?;
        if bytes.len() != chunk.length as usize {
            return Err(ChunkFetchError::LengthMismatch {
                chunk_id: chunk.id.clone(),
                expected: chunk.length,
                actual: bytes.len(),
            });
        }
        self.arena.write_at(&chunk.id, chunk.offset, &bytes)
    }
}

/// Fans out chunk fetches for one file and assembles the result.
#[derive(Clone)]
pub struct ChunkAcquisitionCoordinator {
    transport: Arc<dyn ChunkTransport>,
    max_attempts: usize,
}

impl ChunkAcquisitionCoordinator {
    pub fn new(transport: Arc<dyn ChunkTransport>) -> Self {
        Self {
            transport,
            max_attempts: DEFAULT_CHUNK_ATTEMPTS,
        }
    }

    /// Set the per-chunk attempt budget (minimum 1).
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Fetch every chunk of `file` and return its assembled bytes.
    ///
    /// Succeeds only if every chunk was written. A file without chunks
    /// yields a zero-filled buffer of its declared size.
    pub async fn acquire(
        &self,
        job: Arc<DepotJob>,
        file: &ManifestEntry,
    ) -> Result<Vec<u8>, AcquisitionFailure> {
        let total_chunks = file.chunks.len();
        let too_large = |reason: String| AcquisitionFailure {
            successful_chunks: 0,
            total_chunks,
            last_error: format!("cannot stage {} bytes: {}", file.size, reason),
        };
        let size = usize::try_from(file.size).map_err(|e| too_large(e.to_string()))?;
        let arena = StagingArena::new(size).map_err(|e| too_large(e.to_string()))?;

        let state = Arc::new(FileAcquisition {
            job,
            transport: Arc::clone(&self.transport),
            arena,
            cancel: CancellationToken::new(),
            succeeded: AtomicUsize::new(0),
            last_error: Mutex::new(None),
            max_attempts: self.max_attempts,
            path: file.path.clone(),
            total_chunks,
        });

        let tasks: Vec<_> = file
            .chunks
            .iter()
            .cloned()
            .map(|chunk| {
                let state = Arc::clone(&state);
                tokio::spawn(async move { state.acquire_chunk(&chunk).await })
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                // A panicked task never wrote its chunk; treat the file as failed.
                warn!(file = %file.path, error = %e, "Chunk task did not complete");
                state.cancel.cancel();
                state.arena.seal();
                *state.last_error.lock() = Some(e.to_string());
            }
        }

        let state = match Arc::try_unwrap(state) {
            Ok(state) => state,
            Err(_) => {
                return Err(AcquisitionFailure {
                    successful_chunks: 0,
                    total_chunks,
                    last_error: "chunk tasks still hold the staging region".to_string(),
                })
            }
        };

        let successful_chunks = state.succeeded.load(Ordering::SeqCst);
        if state.cancel.is_cancelled() || successful_chunks != total_chunks {
            return Err(AcquisitionFailure {
                successful_chunks,
                total_chunks,
                last_error: state
                    .last_error
                    .into_inner()
                    .unwrap_or_else(|| CHECKSUM_FAILED_MESSAGE.to_string()),
            });
        }

        Ok(state.arena.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileDigest;
    use crate::source::BoxFuture;
    use bytes::Bytes;
    use std::collections::HashMap;

    /// Transport that fails each chunk a fixed number of times first.
    struct FlakyTransport {
        content: Vec<u8>,
        failures: HashMap<String, usize>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl FlakyTransport {
        fn new(content: &[u8], failures: &[(&str, usize)]) -> Self {
            Self {
                content: content.to_vec(),
                failures: failures
                    .iter()
                    .map(|(id, n)| (id.to_string(), *n))
                    .collect(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, id: &str) -> usize {
            self.calls.lock().get(id).copied().unwrap_or(0)
        }
    }

    impl ChunkTransport for FlakyTransport {
        fn fetch_chunk<'a>(
            &'a self,
            _job: &'a DepotJob,
            chunk: &'a ChunkDescriptor,
        ) -> BoxFuture<'a, Result<Bytes, ChunkFetchError>> {
            Box::pin(async move {
                let call = {
                    let mut calls = self.calls.lock();
                    let n = calls.entry(chunk.id.clone()).or_insert(0);
                    *n += 1;
                    *n
                };
                if call <= self.failures.get(&chunk.id).copied().unwrap_or(0) {
                    return Err(ChunkFetchError::Transport(format!(
                        "timeout fetching {} (attempt {})",
                        chunk.id, call
                    )));
                }
                let start = chunk.offset as usize;
                let end = start + chunk.length as usize;
                Ok(Bytes::copy_from_slice(&self.content[start..end]))
            })
        }
    }

    fn file_of(content: &[u8], chunk_len: usize) -> ManifestEntry {
        let chunks = content
            .chunks(chunk_len)
            .enumerate()
            .map(|(i, c)| {
                ChunkDescriptor::new(format!("c{}", i), (i * chunk_len) as u64, c.len() as u32)
            })
            .collect();
        ManifestEntry::new(
            "bin/data.bin",
            content.len() as u64,
            FileDigest::compute(content),
            chunks,
        )
    }

    fn job() -> Arc<DepotJob> {
        Arc::new(DepotJob::new(441, "http://cdn.test"))
    }

    #[tokio::test]
    async fn test_acquire_assembles_chunks_by_offset() {
        let content = b"The quick brown fox jumps over the lazy dog".to_vec();
        let transport = Arc::new(FlakyTransport::new(&content, &[]));
        let coordinator = ChunkAcquisitionCoordinator::new(transport);

        let bytes = coordinator.acquire(job(), &file_of(&content, 8)).await.unwrap();

        assert_eq!(bytes, content);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_acquire_many_chunks_in_parallel() {
        let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let transport = Arc::new(FlakyTransport::new(&content, &[("c3", 2), ("c17", 1)]));
        let coordinator = ChunkAcquisitionCoordinator::new(transport);

        let bytes = coordinator.acquire(job(), &file_of(&content, 64)).await.unwrap();

        assert_eq!(bytes, content);
    }

    #[tokio::test]
    async fn test_chunk_succeeding_on_sixth_attempt_is_accepted() {
        let content = b"abcdefgh".to_vec();
        let transport = Arc::new(FlakyTransport::new(&content, &[("c0", 5)]));
        let coordinator = ChunkAcquisitionCoordinator::new(Arc::clone(&transport) as _);

        let bytes = coordinator.acquire(job(), &file_of(&content, 8)).await.unwrap();

        assert_eq!(bytes, content);
        assert_eq!(transport.calls("c0"), 6);
    }

    #[tokio::test]
    async fn test_chunk_failing_six_times_fails_file() {
        let content = b"aaaabbbbcccc".to_vec();
        let transport = Arc::new(FlakyTransport::new(&content, &[("c2", 6)]));
        let coordinator = ChunkAcquisitionCoordinator::new(Arc::clone(&transport) as _);

        let failure = coordinator
            .acquire(job(), &file_of(&content, 4))
            .await
            .unwrap_err();

        assert_eq!(failure.total_chunks, 3);
        assert_eq!(failure.successful_chunks, 2);
        assert_eq!(failure.last_error, "timeout fetching c2 (attempt 6)");
        assert_eq!(transport.calls("c2"), 6);
    }

    /// Transport where `held` waits until `failing` has used up its budget,
    /// `failing` always errors, and anything else succeeds.
    struct GatedTransport {
        release: tokio::sync::Notify,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl GatedTransport {
        fn new() -> Self {
            Self {
                release: tokio::sync::Notify::new(),
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls(&self, id: &str) -> usize {
            self.calls.lock().get(id).copied().unwrap_or(0)
        }
    }

    impl ChunkTransport for GatedTransport {
        fn fetch_chunk<'a>(
            &'a self,
            _job: &'a DepotJob,
            chunk: &'a ChunkDescriptor,
        ) -> BoxFuture<'a, Result<Bytes, ChunkFetchError>> {
            Box::pin(async move {
                let call = {
                    let mut calls = self.calls.lock();
                    let n = calls.entry(chunk.id.clone()).or_insert(0);
                    *n += 1;
                    *n
                };
                match chunk.id.as_str() {
                    "held" => {
                        self.release.notified().await;
                        Ok(Bytes::from(vec![b'h'; chunk.length as usize]))
                    }
                    "failing" => {
                        if call == DEFAULT_CHUNK_ATTEMPTS {
                            self.release.notify_one();
                        }
                        Err(ChunkFetchError::Transport(format!("reset (attempt {})", call)))
                    }
                    _ => Ok(Bytes::from(vec![b'x'; chunk.length as usize])),
                }
            })
        }
    }

    #[tokio::test]
    async fn test_failure_cancels_pending_chunks_and_drops_stragglers() {
        let transport = Arc::new(GatedTransport::new());
        let coordinator = ChunkAcquisitionCoordinator::new(Arc::clone(&transport) as _);
        let file = ManifestEntry::new(
            "bin/gated.bin",
            12,
            FileDigest::empty(),
            vec![
                ChunkDescriptor::new("held", 0, 4),
                ChunkDescriptor::new("failing", 4, 4),
                ChunkDescriptor::new("later", 8, 4),
            ],
        );

        let failure = coordinator.acquire(job(), &file).await.unwrap_err();

        // The held chunk was in flight when the file failed: its bytes
        // arrived after sealing and do not count.
        assert_eq!(transport.calls("held"), 1);
        // The last chunk had not started and was never fetched.
        assert_eq!(transport.calls("later"), 0);
        assert_eq!(transport.calls("failing"), DEFAULT_CHUNK_ATTEMPTS);
        assert_eq!(failure.successful_chunks, 0);
        assert_eq!(failure.total_chunks, 3);
        assert_eq!(failure.last_error, "reset (attempt 6)");
    }

    #[tokio::test]
    async fn test_custom_attempt_budget() {
        let content = b"abcd".to_vec();
        let transport = Arc::new(FlakyTransport::new(&content, &[("c0", 2)]));
        let coordinator =
            ChunkAcquisitionCoordinator::new(Arc::clone(&transport) as _).with_max_attempts(2);

        assert!(coordinator.acquire(job(), &file_of(&content, 4)).await.is_err());
        assert_eq!(transport.calls("c0"), 2);
    }

    #[tokio::test]
    async fn test_zero_attempt_budget_is_clamped() {
        let transport = Arc::new(FlakyTransport::new(b"", &[]));
        let coordinator = ChunkAcquisitionCoordinator::new(transport).with_max_attempts(0);
        assert_eq!(coordinator.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_unallocatable_file_fails_without_fetching() {
        let transport = Arc::new(FlakyTransport::new(b"", &[]));
        let coordinator = ChunkAcquisitionCoordinator::new(Arc::clone(&transport) as _);
        let file = ManifestEntry::new(
            "huge.bin",
            u64::MAX,
            FileDigest::empty(),
            vec![ChunkDescriptor::new("c0", 0, 4)],
        );

        let failure = coordinator.acquire(job(), &file).await.unwrap_err();

        assert_eq!(failure.successful_chunks, 0);
        assert_eq!(failure.total_chunks, 1);
        assert!(failure.last_error.starts_with("cannot stage"));
        assert_eq!(transport.calls("c0"), 0);
    }

    #[tokio::test]
    async fn test_zero_chunk_file_needs_no_fetch() {
        let transport = Arc::new(FlakyTransport::new(b"", &[]));
        let coordinator = ChunkAcquisitionCoordinator::new(transport);
        let file = ManifestEntry::new("empty.txt", 0, FileDigest::empty(), Vec::new());

        let bytes = coordinator.acquire(job(), &file).await.unwrap();

        assert!(bytes.is_empty());
    }

    /// Transport that always returns two bytes, whatever was asked for.
    struct ShortTransport;

    impl ChunkTransport for ShortTransport {
        fn fetch_chunk<'a>(
            &'a self,
            _job: &'a DepotJob,
            _chunk: &'a ChunkDescriptor,
        ) -> BoxFuture<'a, Result<Bytes, ChunkFetchError>> {
            Box::pin(async { Ok(Bytes::from_static(b"ab")) })
        }
    }

    #[tokio::test]
    async fn test_short_chunk_counts_as_failed_attempt() {
        let coordinator =
            ChunkAcquisitionCoordinator::new(Arc::new(ShortTransport)).with_max_attempts(2);
        let file = ManifestEntry::new(
            "short.bin",
            4,
            FileDigest::empty(),
            vec![ChunkDescriptor::new("c0", 0, 4)],
        );

        let failure = coordinator.acquire(job(), &file).await.unwrap_err();

        assert_eq!(failure.successful_chunks, 0);
        assert_eq!(failure.last_error, "chunk c0 returned 2 bytes, expected 4");
    }

    #[tokio::test]
    async fn test_chunk_beyond_declared_size_fails() {
        let content = b"abcdefgh".to_vec();
        let transport = Arc::new(FlakyTransport::new(&content, &[]));
        let coordinator = ChunkAcquisitionCoordinator::new(transport).with_max_attempts(1);
        let file = ManifestEntry::new(
            "overflow.bin",
            4,
            FileDigest::empty(),
            vec![ChunkDescriptor::new("c0", 4, 4)],
        );

        let failure = coordinator.acquire(job(), &file).await.unwrap_err();

        assert_eq!(failure.successful_chunks, 0);
        assert!(failure.last_error.contains("exceeds file size 4"));
    }
}
