//! Traits for the external collaborators of a depot sync.
//!
//! The sync engine never talks to a CDN, a manifest service, a chat relay or
//! a deploy script directly. Each of those is reached through one of the
//! traits below so callers can plug in real clients and tests can plug in
//! scripted ones.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so the traits can be used as
//! `Arc<dyn ChunkTransport>` and friends.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::{ChunkFetchError, HookError, ManifestResult};
use crate::manifest::{ChunkDescriptor, DepotManifest};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything the transport needs to know about the depot being synced.
///
/// Created by whoever triggers the sync (usually a depot update event).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepotJob {
    /// Depot being synced.
    pub depot_id: u32,
    /// App the depot belongs to.
    pub parent_app_id: u32,
    /// Human-readable name of the parent app, used in operator messages.
    pub app_name: String,
    /// Content server to fetch chunks from.
    pub server: String,
    /// Access token for the content server.
    pub cdn_token: Option<String>,
    /// Depot decryption key.
    pub depot_key: Vec<u8>,
}

impl DepotJob {
    pub fn new(depot_id: u32, server: impl Into<String>) -> Self {
        Self {
            depot_id,
            server: server.into(),
            ..Default::default()
        }
    }

    pub fn with_app(mut self, parent_app_id: u32, app_name: impl Into<String>) -> Self {
        self.parent_app_id = parent_app_id;
        self.app_name = app_name.into();
        self
    }

    pub fn with_cdn_token(mut self, token: impl Into<String>) -> Self {
        self.cdn_token = Some(token.into());
        self
    }

    pub fn with_depot_key(mut self, key: Vec<u8>) -> Self {
        self.depot_key = key;
        self
    }

    /// Name used to label operator messages.
    pub fn display_name(&self) -> String {
        if self.app_name.is_empty() {
            format!("depot {}", self.depot_id)
        } else {
            self.app_name.clone()
        }
    }
}

/// Fetches a single chunk from a content delivery source.
///
/// Implementations are expected to enforce their own request timeout; the
/// engine retries failed attempts but never times them out itself.
pub trait ChunkTransport: Send + Sync {
    /// Fetch the decrypted bytes of one chunk.
    fn fetch_chunk<'a>(
        &'a self,
        job: &'a DepotJob,
        chunk: &'a ChunkDescriptor,
    ) -> BoxFuture<'a, Result<Bytes, ChunkFetchError>>;
}

/// Supplies the manifest of a depot.
pub trait ManifestSource: Send + Sync {
    /// Fetch the current manifest for `depot_id`.
    fn manifest(&self, depot_id: u32) -> BoxFuture<'_, ManifestResult<DepotManifest>>;
}

/// Receives operator-facing failure messages.
pub trait OperatorNotifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notified once per depot after at least one file was installed.
pub trait PostInstallHook: Send + Sync {
    fn depot_updated(&self, depot_id: u32) -> Result<(), HookError>;
}
