// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ApplicationTask: a user-defined command to run on a resource when
//! its Application reaches a given state (`spec.md` §3, §4.6).

use crate::application::ApplicationId;
use crate::appstate::ApplicationStatus;
use crate::define_uid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_uid! {
    pub struct ApplicationTaskId;
}

/// Literal result payload recorded when the driver doesn't support the
/// requested task (`spec.md` §4.2, §4.6, §6) — tests assert this exact
/// string, so it's a named constant rather than inlined at call sites.
pub const TASK_NOT_AVAILABLE: &str = r#"{"error":"task not available in driver"}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationTask {
    pub uid: ApplicationTaskId,
    pub application_uid: ApplicationId,
    pub task: String,
    pub when: ApplicationStatus,
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub result: HashMap<String, serde_json::Value>,
    pub created_at_ms: u64,
    /// 0 means not yet executed (`spec.md` §3: "executedAt != 0 indicates
    /// completion").
    #[serde(default)]
    pub executed_at_ms: u64,
}

impl ApplicationTask {
    pub fn is_executed(&self) -> bool {
        self.executed_at_ms != 0
    }

    /// Build the task-not-available result map as the literal JSON object
    /// tests compare against, not just the raw string.
    pub fn task_not_available_result() -> HashMap<String, serde_json::Value> {
        let mut m = HashMap::new();
        m.insert("error".to_string(), serde_json::Value::String("task not available in driver".to_string()));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_available_result_serializes_to_literal_string() {
        let result = ApplicationTask::task_not_available_result();
        let json = serde_json::to_string(&result).expect("serialize");
        assert_eq!(json, TASK_NOT_AVAILABLE);
    }

    #[test]
    fn is_executed_tracks_zero_sentinel() {
        let mut t = ApplicationTask {
            uid: ApplicationTaskId::from_uid(crate::id::Uid::random()),
            application_uid: ApplicationId::from_uid(crate::id::Uid::random()),
            task: "snapshot".into(),
            when: ApplicationStatus::Allocated,
            input: HashMap::new(),
            result: HashMap::new(),
            created_at_ms: 1,
            executed_at_ms: 0,
        };
        assert!(!t.is_executed());
        t.executed_at_ms = 42;
        assert!(t.is_executed());
    }
}
