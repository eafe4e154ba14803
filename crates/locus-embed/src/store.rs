//! Append-only vector log backing the embedding cache
//!
//! Layout: an 8-byte magic and a little-endian `u32` version, then records,
//! each a little-endian `u32` length followed by a bincode payload naming the
//! node, the provider that produced the vector and when. A record cut short
//! at the end of the file (a crash mid-append) is dropped on open; a complete
//! record that fails to decode is corruption.

use crate::error::CacheError;
use locus_core::NodeId;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Vector log file inside the cache directory
pub const EMBEDDINGS_FILE: &str = "embeddings.bin";

const MAGIC: &[u8; 8] = b"LOCUSEMB";
pub(crate) const LOG_VERSION: u32 = 2;
const HEADER_LEN: usize = 12;

/// One stored vector with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub id: NodeId,
    pub provider: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub vector: Vec<f32>,
}

#[derive(Debug)]
pub(crate) struct EmbeddingLog {
    path: PathBuf,
    file: File,
}

impl EmbeddingLog {
    /// Open (or create) the log in `dir` and replay it. Later records for
    /// the same id win.
    pub(crate) fn open(dir: &Path) -> Result<(Self, Vec<Record>), CacheError> {
        std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;
        let path = dir.join(EMBEDDINGS_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CacheError::io(&path, e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| CacheError::io(&path, e))?;

        let mut log = EmbeddingLog { path, file };
        if bytes.is_empty() {
            log.write_header()?;
            return Ok((log, Vec::new()));
        }
        log.check_header(&bytes)?;

        let (records, valid_len) = replay(&log.path, &bytes)?;
        if valid_len < bytes.len() {
            tracing::warn!(
                path = %log.path.display(),
                dropped_bytes = bytes.len() - valid_len,
                "truncated record at end of embedding log dropped"
            );
            log.file
                .set_len(valid_len as u64)
                .map_err(|e| CacheError::io(&log.path, e))?;
        }
        log.file
            .seek(SeekFrom::End(0))
            .map_err(|e| CacheError::io(&log.path, e))?;
        Ok((log, records))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub(crate) fn append(&mut self, record: &Record) -> Result<(), CacheError> {
        let payload = bincode::serialize(record).map_err(|e| self.io_error(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| self.io_error(format!("record too large: {} bytes", payload.len())))?;

        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        self.file
            .write_all(&frame)
            .and_then(|()| self.file.sync_data())
            .map_err(|e| CacheError::io(&self.path, e))
    }

    /// Drop every record, keeping the header.
    pub(crate) fn reset(&mut self) -> Result<(), CacheError> {
        self.file
            .set_len(HEADER_LEN as u64)
            .and_then(|()| self.file.seek(SeekFrom::End(0)).map(|_| ()))
            .map_err(|e| CacheError::io(&self.path, e))
    }

    fn write_header(&mut self) -> Result<(), CacheError> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&LOG_VERSION.to_le_bytes());
        self.file
            .write_all(&header)
            .and_then(|()| self.file.sync_data())
            .map_err(|e| CacheError::io(&self.path, e))
    }

    fn check_header(&self, bytes: &[u8]) -> Result<(), CacheError> {
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
            return Err(self.corrupt(0, "not an embedding log"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[8..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != LOG_VERSION {
            return Err(self.corrupt(
                8,
                format!("unsupported log version {version} (expected {LOG_VERSION})"),
            ));
        }
        Ok(())
    }

    fn io_error(&self, reason: String) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            reason,
        }
    }

    fn corrupt(&self, offset: usize, reason: impl Into<String>) -> CacheError {
        CacheError::Corrupt {
            path: self.path.clone(),
            offset: offset as u64,
            reason: reason.into(),
        }
    }
}

/// Decode records after the header. Returns them with the length of the
/// intact prefix.
fn replay(path: &Path, bytes: &[u8]) -> Result<(Vec<Record>, usize), CacheError> {
    let mut records = Vec::new();
    let mut offset = HEADER_LEN;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < 4 {
            break;
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&rest[..4]);
        let len = u32::from_le_bytes(len) as usize;
        if rest.len() - 4 < len {
            break;
        }
        let record: Record =
            bincode::deserialize(&rest[4..4 + len]).map_err(|e| CacheError::Corrupt {
                path: path.to_path_buf(),
                offset: offset as u64,
                reason: e.to_string(),
            })?;
        records.push(record);
        offset += 4 + len;
    }
    Ok((records, offset))
}
