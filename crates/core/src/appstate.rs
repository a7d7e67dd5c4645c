// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ApplicationState: the append-only per-Application status log
//! (`spec.md` §3, §4.5).

use crate::application::ApplicationId;
use crate::define_uid;
use crate::macros::simple_display;
use serde::{Deserialize, Serialize};

define_uid! {
    pub struct ApplicationStateId;
}

/// The lifecycle state machine from `spec.md` §4.5:
///
/// ```text
/// NEW  --elect--> ELECTED --allocate ok--> ALLOCATED
///                          \--fail--> ERROR
/// ALLOCATED --deallocate/expiry--> DEALLOCATE
/// DEALLOCATE --deallocate ok--> DEALLOCATED
///            --fail (budget exhausted)--> ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    New,
    Elected,
    Allocated,
    Deallocate,
    Deallocated,
    Error,
}

simple_display! {
    ApplicationStatus {
        New => "NEW",
        Elected => "ELECTED",
        Allocated => "ALLOCATED",
        Deallocate => "DEALLOCATE",
        Deallocated => "DEALLOCATED",
        Error => "ERROR",
    }
}

impl ApplicationStatus {
    /// An Application is "resolved" iff its newest state is one of these
    /// (`spec.md` §3 invariants, §4.5).
    pub fn is_resolved(&self) -> bool {
        matches!(self, ApplicationStatus::Deallocated | ApplicationStatus::Error)
    }

    /// Whether an ApplicationResource should exist while in this state
    /// (`spec.md` §3: "exactly one ApplicationResource ... while in
    /// {ALLOCATED, DEALLOCATE}").
    pub fn holds_resource(&self) -> bool {
        matches!(self, ApplicationStatus::Allocated | ApplicationStatus::Deallocate)
    }
}

/// One entry in an Application's state log. Newest by `created_at_ms`
/// (ties broken by insertion order, since the store assigns increasing
/// sequence numbers) is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub uid: ApplicationStateId,
    pub application_uid: ApplicationId,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub description: String,
    pub created_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_states_are_exactly_deallocated_and_error() {
        assert!(ApplicationStatus::Deallocated.is_resolved());
        assert!(ApplicationStatus::Error.is_resolved());
        assert!(!ApplicationStatus::New.is_resolved());
        assert!(!ApplicationStatus::Elected.is_resolved());
        assert!(!ApplicationStatus::Allocated.is_resolved());
        assert!(!ApplicationStatus::Deallocate.is_resolved());
    }

    #[test]
    fn display_matches_spec_literals() {
        assert_eq!(ApplicationStatus::New.to_string(), "NEW");
        assert_eq!(ApplicationStatus::Deallocated.to_string(), "DEALLOCATED");
    }
}
