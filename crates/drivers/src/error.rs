// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors a [`crate::Driver`] call can return (`spec.md` §4.2, §7).
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver instance has no remaining capacity")]
    NoCapacity,
    #[error("driver failed: {0}")]
    DriverFailed(String),
    #[error("unknown driver instance: {0}")]
    UnknownInstance(String),
    #[error("driver call timed out after {0:?}")]
    Timeout(std::time::Duration),
}
