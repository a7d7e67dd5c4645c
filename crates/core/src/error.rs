// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the node (`spec.md` §7).

use thiserror::Error;

/// The seven error kinds the core distinguishes.
///
/// `NoCapacity` is internal-only: the Scheduler consumes it to leave an
/// Application in NEW rather than surfacing it anywhere. Everything else
/// is user-visible or logged by background loops per the propagation
/// policy in `spec.md` §7.
#[derive(Debug, Error)]
pub enum FishError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Consumed internally by the Scheduler; never returned to a user.
    #[error("no capacity available")]
    NoCapacity,

    #[error("driver failed: {0}")]
    DriverFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FishError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FishError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FishError>;
