//! HTTP chunk transport.
//!
//! Fetches chunks from a content mirror laid out as
//! `<server>/depot/<depot id>/chunk/<chunk id>`, appending the CDN token as
//! the query string when the job carries one. The mirror is expected to
//! serve chunk content already decrypted and decompressed.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;

use crate::error::ChunkFetchError;
use crate::manifest::ChunkDescriptor;
use crate::source::{BoxFuture, ChunkTransport, DepotJob};

/// Chunk transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: Client,
    timeout: Duration,
}

impl HttpChunkTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ChunkFetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChunkFetchError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// URL of a chunk on the job's server.
    pub fn chunk_url(job: &DepotJob, chunk: &ChunkDescriptor) -> String {
        let mut url = format!(
            "{}/depot/{}/chunk/{}",
            job.server.trim_end_matches('/'),
            job.depot_id,
            chunk.id
        );
        if let Some(token) = job.cdn_token.as_deref().filter(|t| !t.is_empty()) {
            url.push('?');
            url.push_str(token.trim_start_matches('?'));
        }
        url
    }
}

impl ChunkTransport for HttpChunkTransport {
    fn fetch_chunk<'a>(
        &'a self,
        job: &'a DepotJob,
        chunk: &'a ChunkDescriptor,
    ) -> BoxFuture<'a, Result<Bytes, ChunkFetchError>> {
        Box::pin(async move {
            let url = Self::chunk_url(job, chunk);
            let response = self.client.get(&url).send().await.map_err(|e| {
                if e.is_timeout() {
                    ChunkFetchError::Transport(format!(
                        "request to {} timed out after {}s",
                        url,
                        self.timeout.as_secs()
                    ))
                } else {
                    ChunkFetchError::Transport(format!("Request failed: {}", e))
                }
            })?;

            if !response.status().is_success() {
                return Err(ChunkFetchError::Transport(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            response
                .bytes()
                .await
                .map_err(|e| ChunkFetchError::Transport(format!("Failed to read response: {}", e)))
        })
    }
}
