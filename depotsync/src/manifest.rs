//! Depot manifest types.
//!
//! A manifest lists every file of a depot at one version together with its
//! size, content digest and chunk layout. Entries are immutable once loaded.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use sha1::{Digest, Sha1};

use crate::error::{ManifestError, ManifestResult};
use crate::source::{BoxFuture, ManifestSource};

/// Length in bytes of a content digest.
pub const DIGEST_LEN: usize = 20;

/// SHA-1 digest of a file's full content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; DIGEST_LEN]);

impl FileDigest {
    /// Digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha1::digest(data).into())
    }

    /// Digest of the empty byte sequence.
    pub fn empty() -> Self {
        Self::compute(&[])
    }

    /// Compare every byte without stopping at the first difference.
    pub fn matches(&self, other: &FileDigest) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl From<Sha1> for FileDigest {
    fn from(hasher: Sha1) -> Self {
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileDigest({})", self)
    }
}

impl FromStr for FileDigest {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| ManifestError::InvalidDigest {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl<'de> Deserialize<'de> for FileDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One independently fetchable byte range of a file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkDescriptor {
    /// Content id of the chunk, as the transport addresses it.
    pub id: String,
    /// Byte offset of the chunk within the file.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub length: u32,
}

impl ChunkDescriptor {
    pub fn new(id: impl Into<String>, offset: u64, length: u32) -> Self {
        Self {
            id: id.into(),
            offset,
            length,
        }
    }
}

/// One file listed in a depot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the depot root, always with forward slashes.
    #[serde(deserialize_with = "deserialize_path")]
    pub path: String,
    /// Declared total size in bytes.
    pub size: u64,
    /// Declared digest of the full content.
    #[serde(rename = "sha1")]
    pub digest: FileDigest,
    /// Chunks in manifest order.
    #[serde(default)]
    pub chunks: Vec<ChunkDescriptor>,
}

impl ManifestEntry {
    pub fn new(
        path: &str,
        size: u64,
        digest: FileDigest,
        chunks: Vec<ChunkDescriptor>,
    ) -> Self {
        Self {
            path: normalize_path(path),
            size,
            digest,
            chunks,
        }
    }

    /// Whether the file has no chunks to fetch.
    pub fn is_chunkless(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// All files of one depot at one version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DepotManifest {
    pub files: Vec<ManifestEntry>,
}

impl DepotManifest {
    pub fn new(files: Vec<ManifestEntry>) -> Self {
        Self { files }
    }

    /// Parse a manifest JSON document.
    pub fn from_json(json: &str) -> ManifestResult<Self> {
        serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))
    }
}

/// Convert a manifest path to forward-slash form.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

fn deserialize_path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|p| normalize_path(&p))
}

/// Manifest source backed by a JSON document on disk.
///
/// The same document is returned for every depot id; the caller picks the
/// file matching the depot it syncs.
#[derive(Debug, Clone)]
pub struct JsonManifest {
    manifest: DepotManifest,
}

impl JsonManifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            manifest: DepotManifest::from_json(&json)?,
        })
    }

    pub fn from_manifest(manifest: DepotManifest) -> Self {
        Self { manifest }
    }
}

impl ManifestSource for JsonManifest {
    fn manifest(&self, _depot_id: u32) -> BoxFuture<'_, ManifestResult<DepotManifest>> {
        let manifest = self.manifest.clone();
        Box::pin(async move { Ok(manifest) })
    }
}
