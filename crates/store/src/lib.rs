// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fish-store: the append-only, single-writer KV store (`spec.md` §4.1)
//! underneath every other Fish node crate.

mod backup;
mod error;
mod log;
mod store;

pub use error::{Result, StoreError};
pub use store::{default_log_path, Mutation, ResolutionOracle, Store, TxnOp};

/// Keys left behind after a quiet compaction run following full
/// resolution of every user Application: one seeded `admin` user, the
/// three seeded roles, and the node record (`spec.md` §4.1, §9). A
/// deployment's `SEED_KEY_COUNT` is this plus however many Labels a user
/// has created, since Labels are never auto-cleaned.
pub const SEED_KEY_COUNT: usize = 5;
