// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record not found: {kind}/{id}")]
    NotFound { kind: String, id: String },
    #[error("log corrupted at byte offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
