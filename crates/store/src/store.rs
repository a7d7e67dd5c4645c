// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single-writer KV store: `Put`/`Get`/`List`/`Delete`/`Txn`, plus the
//! `CleanupDB`/`CompactDB` background loops (`spec.md` §4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fish_core::event::{Bus, ChangeEvent, ChangeType};
use fish_core::Kind;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, StoreError};
use crate::log::{Log, LogRecord};

/// What a caller wants done to one key, within a [`Txn`].
#[derive(Debug, Clone)]
pub enum Mutation {
    Put(Vec<u8>),
    Delete,
}

#[derive(Debug, Clone)]
pub struct TxnOp {
    pub kind: Kind,
    pub id: String,
    pub mutation: Mutation,
}

impl TxnOp {
    pub fn put(kind: Kind, id: impl Into<String>, bytes: Vec<u8>) -> Self {
        TxnOp { kind, id: id.into(), mutation: Mutation::Put(bytes) }
    }

    pub fn delete(kind: Kind, id: impl Into<String>) -> Self {
        TxnOp { kind, id: id.into(), mutation: Mutation::Delete }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    seq: u64,
    tombstone: bool,
    payload: Vec<u8>,
}

type Index = HashMap<(Kind, String), IndexEntry>;

enum WriterCmd {
    Txn { ops: Vec<TxnOp>, reply: oneshot::Sender<Result<Vec<u64>>> },
    Compact { reply: oneshot::Sender<Result<usize>> },
}

pub struct Store {
    index: Arc<RwLock<Index>>,
    writer_tx: mpsc::Sender<WriterCmd>,
    _writer_task: JoinHandle<()>,
}

/// Lets `CleanupDB` ask whether an Application is resolved and all its
/// dependents are already tombstoned, without `fish-store` depending on
/// `fish-engine` (`spec.md` §4.1).
pub trait ResolutionOracle: Send + Sync {
    fn is_resolved_and_clean(&self, application_id: &str) -> bool;
}

impl Store {
    /// Replay the log at `path` (creating it if absent) and start the
    /// dedicated writer task.
    pub fn open(path: impl AsRef<Path>, bus: Arc<Bus>) -> Result<Arc<Self>> {
        let (log, records) = Log::replay(path.as_ref())?;
        let mut index: Index = HashMap::new();
        let mut max_seq = 0u64;
        for record in records {
            max_seq = max_seq.max(record.seq);
            index.insert(
                (record.kind, record.id.clone()),
                IndexEntry { seq: record.seq, tombstone: record.tombstone, payload: record.payload },
            );
        }
        let index = Arc::new(RwLock::new(index));
        let seq_counter = Arc::new(AtomicU64::new(max_seq));
        let (tx, rx) = mpsc::channel(256);
        let writer_task = tokio::spawn(run_writer(log, Arc::clone(&index), seq_counter, bus, rx));
        Ok(Arc::new(Store { index, writer_tx: tx, _writer_task: writer_task }))
    }

    pub async fn put(&self, kind: Kind, id: impl Into<String>, bytes: Vec<u8>) -> Result<u64> {
        let id = id.into();
        let seqs = self.txn(vec![TxnOp::put(kind, id, bytes)]).await?;
        Ok(seqs[0])
    }

    pub async fn delete(&self, kind: Kind, id: impl Into<String>) -> Result<u64> {
        let id = id.into();
        let seqs = self.txn(vec![TxnOp::delete(kind, id)]).await?;
        Ok(seqs[0])
    }

    pub fn get(&self, kind: Kind, id: &str) -> Result<Vec<u8>> {
        let guard = self.index.read();
        match guard.get(&(kind, id.to_string())) {
            Some(entry) if !entry.tombstone => Ok(entry.payload.clone()),
            _ => Err(StoreError::NotFound { kind: kind.to_string(), id: id.to_string() }),
        }
    }

    /// Point-in-time snapshot of every live record of `kind` passing `filter`.
    pub fn list(&self, kind: Kind, filter: impl Fn(&str, &[u8]) -> bool) -> Vec<(String, Vec<u8>)> {
        let guard = self.index.read();
        guard
            .iter()
            .filter(|((k, _), entry)| *k == kind && !entry.tombstone)
            .filter(|((_, id), entry)| filter(id, &entry.payload))
            .map(|((_, id), entry)| (id.clone(), entry.payload.clone()))
            .collect()
    }

    pub async fn txn(&self, ops: Vec<TxnOp>) -> Result<Vec<u64>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.writer_tx
            .send(WriterCmd::Txn { ops, reply: reply_tx })
            .await
            .map_err(|_| StoreError::Corrupt { offset: 0, reason: "writer task gone".into() })?;
        reply_rx.await.map_err(|_| StoreError::Corrupt { offset: 0, reason: "writer task gone".into() })?
    }

    /// CleanupDB: tombstone every Application the oracle reports as
    /// resolved with all dependents already gone (`spec.md` §4.1).
    pub async fn cleanup_once(&self, oracle: &dyn ResolutionOracle) -> Result<usize> {
        let ids: Vec<String> = self.list(Kind::Application, |_, _| true).into_iter().map(|(id, _)| id).collect();
        let mut tombstoned = 0usize;
        for id in ids {
            if oracle.is_resolved_and_clean(&id) {
                self.delete(Kind::Application, id).await?;
                tombstoned += 1;
            }
        }
        tracing::info!(tombstoned, "fish.cleanupdb=completed");
        Ok(tombstoned)
    }

    /// CompactDB: rewrite the log with only live records, dropping
    /// tombstones from the log and the index (`spec.md` §4.1).
    pub async fn compact_once(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.writer_tx
            .send(WriterCmd::Compact { reply: reply_tx })
            .await
            .map_err(|_| StoreError::Corrupt { offset: 0, reason: "writer task gone".into() })?;
        let keys = reply_rx.await.map_err(|_| StoreError::Corrupt { offset: 0, reason: "writer task gone".into() })??;
        tracing::info!(keys, "database.compactdb=after database.keys={keys}");
        Ok(keys)
    }

    pub fn spawn_cleanup_loop(
        self: &Arc<Self>,
        interval: Duration,
        oracle: Arc<dyn ResolutionOracle>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = store.cleanup_once(oracle.as_ref()).await {
                            tracing::warn!(%error, "cleanup pass failed");
                        }
                    }
                }
            }
        })
    }

    pub fn spawn_compact_loop(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = store.compact_once().await {
                            tracing::warn!(%error, "compaction pass failed");
                        }
                    }
                }
            }
        })
    }
}

async fn run_writer(
    mut log: Log,
    index: Arc<RwLock<Index>>,
    seq_counter: Arc<AtomicU64>,
    bus: Arc<Bus>,
    mut rx: mpsc::Receiver<WriterCmd>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Txn { ops, reply } => {
                let result = apply_txn(&mut log, &index, &seq_counter, &bus, ops);
                let _ = reply.send(result);
            }
            WriterCmd::Compact { reply } => {
                let result = compact(&mut log, &index);
                let _ = reply.send(result);
            }
        }
    }
}

fn apply_txn(
    log: &mut Log,
    index: &Arc<RwLock<Index>>,
    seq_counter: &AtomicU64,
    bus: &Bus,
    ops: Vec<TxnOp>,
) -> Result<Vec<u64>> {
    let mut seqs = Vec::with_capacity(ops.len());
    let mut events = Vec::with_capacity(ops.len());
    {
        let mut guard = index.write();
        for op in &ops {
            let seq = seq_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let key = (op.kind, op.id.clone());
            let existed = guard.get(&key).map(|e| !e.tombstone).unwrap_or(false);
            let (tombstone, payload) = match &op.mutation {
                Mutation::Put(bytes) => (false, bytes.clone()),
                Mutation::Delete => (true, Vec::new()),
            };
            log.append(&LogRecord { kind: op.kind, id: op.id.clone(), seq, tombstone, payload: payload.clone() })?;
            guard.insert(key, IndexEntry { seq, tombstone, payload: payload.clone() });
            let change = match (&op.mutation, existed) {
                (Mutation::Delete, _) => ChangeType::Removed,
                (Mutation::Put(_), true) => ChangeType::Updated,
                (Mutation::Put(_), false) => ChangeType::Created,
            };
            events.push(ChangeEvent {
                kind: op.kind,
                change,
                id: op.id.clone(),
                object_data: if tombstone { Vec::new() } else { payload },
                seq,
            });
            seqs.push(seq);
        }
    }
    for event in events {
        bus.publish(event);
    }
    Ok(seqs)
}

fn compact(log: &mut Log, index: &Arc<RwLock<Index>>) -> Result<usize> {
    let mut guard = index.write();
    guard.retain(|_, entry| !entry.tombstone);
    let records: Vec<LogRecord> = guard
        .iter()
        .map(|((kind, id), entry)| LogRecord {
            kind: *kind,
            id: id.clone(),
            seq: entry.seq,
            tombstone: false,
            payload: entry.payload.clone(),
        })
        .collect();
    let keys = records.len();
    log.rewrite(&records)?;
    Ok(keys)
}

/// Path to the KV store's log file within a node's data directory
/// (`spec.md` §6: `fish_data/log`).
pub fn default_log_path(data_dir: impl AsRef<Path>) -> PathBuf {
    data_dir.as_ref().join("log")
}
