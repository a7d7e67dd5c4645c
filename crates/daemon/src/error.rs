// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] fish_core::FishError),
    #[error(transparent)]
    Store(#[from] fish_store::StoreError),
    #[error(transparent)]
    Engine(#[from] fish_engine::EngineError),
    #[error(transparent)]
    Driver(#[from] fish_drivers::DriverError),
    #[error(transparent)]
    Protocol(#[from] fish_wire::ProtocolError),
    #[error("config error: {0}")]
    Config(String),
    #[error("identity error: {0}")]
    Identity(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
