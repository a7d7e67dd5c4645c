// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only log backing the KV store: one record per `Put`/`Delete`,
//! framed as a 4-byte big-endian length prefix + JSON (`spec.md` §4.1).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fish_core::Kind;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub kind: Kind,
    pub id: String,
    pub seq: u64,
    pub tombstone: bool,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// The on-disk append log plus its open file handle.
pub struct Log {
    path: PathBuf,
    file: File,
}

impl Log {
    /// Open (creating if absent) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        Ok(Log { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, returning its byte offset. Flushes and syncs
    /// before returning so a crash after this call cannot lose the write.
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        let offset = self.file.metadata()?.len();
        let payload = serde_json::to_vec(record)?;
        let len = u32::try_from(payload.len())
            .map_err(|_| StoreError::Corrupt { offset, reason: "record too large".into() })?;
        self.file.write_all(&len.to_be_bytes())?;
        self.file.write_all(&payload)?;
        self.file.sync_data()?;
        Ok(offset)
    }

    /// Replay every well-formed record from the start of the log.
    ///
    /// A partial write at the tail (length prefix present but payload
    /// bytes short, or no length prefix at all) is treated as an
    /// interrupted write-in-progress and silently truncated away — this
    /// is the expected shape of a crash mid-append. A corrupt record in
    /// the *middle* of the log (well-framed but not valid JSON, or
    /// followed by more data than it claims) is reported as an error:
    /// the caller refuses to start rather than silently drop history.
    pub fn replay(path: impl AsRef<Path>) -> Result<(Self, Vec<LogRecord>)> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(OpenOptions::new().create(true).read(true).open(&path)?);
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            match reader.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Partial tail write: truncate it away and stop replaying.
                    truncate_to(&path, offset)?;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            let record: LogRecord = serde_json::from_slice(&payload).map_err(|e| StoreError::Corrupt {
                offset,
                reason: e.to_string(),
            })?;
            offset += 4 + len as u64;
            records.push(record);
        }

        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        Ok((Log { path, file }, records))
    }

    /// Atomically replace this log's file with a freshly written one
    /// containing `records`, rotating the previous file to a `.bak` path
    /// first so compaction is safe against a crash mid-swap.
    pub fn rewrite(&mut self, records: &[LogRecord]) -> Result<()> {
        let tmp_path = self.path.with_extension("compact.tmp");
        {
            let mut tmp = OpenOptions::new().create(true).write(true).truncate(true).open(&tmp_path)?;
            for record in records {
                let payload = serde_json::to_vec(record)?;
                let len = payload.len() as u32;
                tmp.write_all(&len.to_be_bytes())?;
                tmp.write_all(&payload)?;
            }
            tmp.sync_all()?;
        }
        let bak_path = crate::backup::rotate_bak_path(&self.path);
        if self.path.exists() {
            std::fs::rename(&self.path, &bak_path)?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().create(true).read(true).append(true).open(&self.path)?;
        Ok(())
    }
}

fn truncate_to(path: &Path, len: u64) -> Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    let mut f = file;
    f.seek(SeekFrom::Start(len))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(kind: Kind, id: &str, seq: u64, tombstone: bool) -> LogRecord {
        LogRecord { kind, id: id.to_string(), seq, tombstone, payload: b"{}".to_vec() }
    }

    #[test]
    fn appended_records_replay_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log");
        {
            let mut log = Log::open(&path).expect("open");
            log.append(&rec(Kind::Node, "a", 1, false)).expect("append");
            log.append(&rec(Kind::Node, "b", 2, false)).expect("append");
        }
        let (_log, records) = Log::replay(&path).expect("replay");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
    }

    #[test]
    fn partial_tail_write_is_truncated_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log");
        {
            let mut log = Log::open(&path).expect("open");
            log.append(&rec(Kind::Node, "a", 1, false)).expect("append");
        }
        // Simulate a crash mid-write: a length prefix claiming more bytes
        // than actually follow it.
        {
            let mut f = OpenOptions::new().append(true).open(&path).expect("open append");
            f.write_all(&100u32.to_be_bytes()).expect("write");
            f.write_all(b"short").expect("write");
        }
        let (_log, records) = Log::replay(&path).expect("replay should not fail");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "a");
    }

    #[test]
    fn rewrite_drops_superseded_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log");
        let mut log = Log::open(&path).expect("open");
        log.append(&rec(Kind::Node, "a", 1, false)).expect("append");
        log.append(&rec(Kind::Node, "a", 2, true)).expect("append");
        log.rewrite(&[rec(Kind::Node, "b", 3, false)]).expect("rewrite");
        let (_log, records) = Log::replay(&path).expect("replay");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "b");
    }
}
