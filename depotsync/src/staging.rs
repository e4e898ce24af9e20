//! In-memory staging region for a file being assembled from chunks.
//!
//! Chunk tasks write into disjoint ranges of one buffer. Writes are
//! serialized by a single mutex held only for the copy. Once the arena is
//! sealed (a sibling chunk failed for good), further writes are dropped so
//! late results can never alter what the failed acquisition left behind.

use std::collections::TryReserveError;

use parking_lot::Mutex;

use crate::error::ChunkFetchError;

/// Result of a write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The bytes were copied into the arena.
    Written,
    /// The arena was sealed; the bytes were dropped.
    Discarded,
}

#[derive(Debug)]
struct ArenaState {
    data: Vec<u8>,
    sealed: bool,
}

/// Offset-addressed byte buffer sized to a file's declared total size.
#[derive(Debug)]
pub struct StagingArena {
    state: Mutex<ArenaState>,
    size: u64,
}

impl StagingArena {
    /// Allocate a zero-filled arena of `size` bytes.
    ///
    /// Fails instead of aborting when the allocation cannot be satisfied,
    /// since `size` comes straight from the manifest.
    pub fn new(size: usize) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)?;
        data.resize(size, 0);
        Ok(Self {
            state: Mutex::new(ArenaState {
                data,
                sealed: false,
            }),
            size: size as u64,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy `bytes` into the arena at `offset`.
    pub fn write_at(
        &self,
        chunk_id: &str,
        offset: u64,
        bytes: &[u8],
    ) -> Result<WriteOutcome, ChunkFetchError> {
        let out_of_bounds = || ChunkFetchError::OutOfBounds {
            chunk_id: chunk_id.to_string(),
            offset,
            file_size: self.size,
        };
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|end| *end <= self.size)
            .ok_or_else(out_of_bounds)?;

        let mut state = self.state.lock();
        if state.sealed {
            return Ok(WriteOutcome::Discarded);
        }
        state.data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(WriteOutcome::Written)
    }

    /// Refuse all further writes.
    pub fn seal(&self) {
        self.state.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Take the assembled bytes, consuming the arena.
    pub fn into_bytes(self) -> Vec<u8> {
        self.state.into_inner().data
    }
}
