// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] fish_store::StoreError),
    #[error(transparent)]
    Driver(#[from] fish_drivers::DriverError),
    #[error(transparent)]
    Core(#[from] fish_core::FishError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
