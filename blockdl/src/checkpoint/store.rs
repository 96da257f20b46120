//! JSON breakpoint store kept next to the output file.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CheckpointRecord, CheckpointSink};
use crate::error::{DownloadError, DownloadResult};

/// Extension appended to the output path for the store file.
pub const STORE_EXTENSION: &str = "blockdl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreState {
    url: String,
    total_length: u64,
    block_size: u64,
    blocks: Vec<CheckpointRecord>,
}

/// Latest checkpoint of every block of one download, persisted as JSON.
///
/// Writes go to a temporary sibling first and are renamed into place so a
/// crash mid-write never leaves a truncated store behind.
#[derive(Debug)]
pub struct BreakpointStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    // Serialises temp-file writes from concurrent workers.
    write_lock: Mutex<()>,
}

impl BreakpointStore {
    /// Store path for a given output file (`<output>.blockdl`).
    pub fn path_for(output: &Path) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(".");
        name.push(STORE_EXTENSION);
        PathBuf::from(name)
    }

    /// Create a store for a fresh plan and write it to disk.
    pub fn create(
        path: PathBuf,
        url: &str,
        total_length: u64,
        block_size: u64,
        blocks: Vec<CheckpointRecord>,
    ) -> DownloadResult<Self> {
        let store = Self {
            path,
            state: Mutex::new(StoreState {
                url: url.to_string(),
                total_length,
                block_size,
                blocks,
            }),
            write_lock: Mutex::new(()),
        };
        store.persist()?;
        Ok(store)
    }

    /// Load an existing store, or `None` if the file does not exist.
    pub fn open(path: &Path) -> DownloadResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| DownloadError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        let state: StoreState =
            serde_json::from_str(&content).map_err(|e| DownloadError::CorruptStore {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(Some(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
        }))
    }

    /// Whether this store belongs to the same remote file.
    pub fn matches(&self, url: &str, total_length: u64) -> bool {
        let state = self.state.lock();
        state.url == url && state.total_length == total_length && !state.blocks.is_empty()
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Source URL recorded in the store.
    pub fn url(&self) -> String {
        self.state.lock().url.clone()
    }

    /// Total file length recorded in the store.
    pub fn total_length(&self) -> u64 {
        self.state.lock().total_length
    }

    /// Nominal block size recorded in the store.
    pub fn block_size(&self) -> u64 {
        self.state.lock().block_size
    }

    /// Snapshot of all block records, ordered by block index.
    pub fn records(&self) -> Vec<CheckpointRecord> {
        let mut records = self.state.lock().blocks.clone();
        records.sort_by_key(|r| r.block_index);
        records
    }

    /// Record for one block.
    pub fn record(&self, block_index: u32) -> Option<CheckpointRecord> {
        self.state
            .lock()
            .blocks
            .iter()
            .find(|r| r.block_index == block_index)
            .copied()
    }

    /// Bytes still missing across all blocks.
    pub fn remaining_bytes(&self) -> u64 {
        self.state.lock().blocks.iter().map(|r| r.remaining).sum()
    }

    /// Apply a record in memory. Records older than the current one are ignored.
    ///
    /// Returns whether the record was applied.
    pub fn apply(&self, record: &CheckpointRecord) -> bool {
        let mut state = self.state.lock();
        match state
            .blocks
            .iter_mut()
            .find(|r| r.block_index == record.block_index)
        {
            Some(existing) if existing.start_offset > record.start_offset => false,
            Some(existing) => {
                *existing = *record;
                true
            }
            None => {
                state.blocks.push(*record);
                true
            }
        }
    }

    /// Write the current state to disk.
    pub fn persist(&self) -> DownloadResult<()> {
        let _guard = self.write_lock.lock();
        let json = {
            let state = self.state.lock();
            serde_json::to_vec_pretty(&*state).map_err(|e| DownloadError::CorruptStore {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };

        let tmp = self.path.with_extension(format!("{}.tmp", STORE_EXTENSION));
        fs::write(&tmp, &json).map_err(|e| DownloadError::WriteFailed {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| DownloadError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Delete the store file after a completed download.
    pub fn remove(&self) -> DownloadResult<()> {
        Self::discard(&self.path)
    }

    /// Delete whatever store file is at `path`, readable or not.
    pub fn discard(path: &Path) -> DownloadResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::WriteFailed {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

impl CheckpointSink for BreakpointStore {
    fn save_breakpoint(&self, record: &CheckpointRecord) {
        if !self.apply(record) {
            debug!(block = record.block_index, "Ignoring stale breakpoint");
            return;
        }
        if let Err(e) = self.persist() {
            warn!(error = %e, block = record.block_index, "Failed to persist breakpoint");
        }
    }
}
