// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node Controller (`spec.md` §4.8): maintenance mode, held only in
//! memory so it never survives a restart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Gates the Scheduler's admission loop. `enabled = true` means the
/// Scheduler must not elect any NEW Application.
pub struct NodeController {
    maintenance: AtomicBool,
    tx: watch::Sender<bool>,
}

impl NodeController {
    pub fn new() -> (Arc<Self>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Arc::new(NodeController { maintenance: AtomicBool::new(false), tx }), rx)
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.maintenance.store(enabled, Ordering::SeqCst);
        let _ = self.tx.send(enabled);
    }
}
