// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label: an immutable, versioned resource specification template
//! (`spec.md` §3).

use crate::define_uid;
use crate::resources::Resources;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_uid! {
    pub struct LabelId;
}

/// One entry in a Label's `definitions` list: a driver name to target
/// plus the resources to request from it. Definitions are ordered —
/// the Scheduler tries them in order and the first one that fits wins
/// (`spec.md` §4.4 step 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelDefinition {
    /// Driver config key, e.g. `"test"` or `"test/prod"`.
    pub driver: String,
    pub resources: Resources,
    #[serde(default)]
    pub authentication: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LabelDefinition {
    pub fn new(driver: impl Into<String>, resources: Resources) -> Self {
        Self { driver: driver.into(), resources, authentication: HashMap::new(), metadata: HashMap::new() }
    }
}

/// A versioned Label. Immutable once created; a new version is a new
/// record with the same `name` and an incremented `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub uid: LabelId,
    pub name: String,
    pub version: u32,
    pub definitions: Vec<LabelDefinition>,
    pub creator: String,
    pub created_at_ms: u64,
}

impl Label {
    /// Validate the invariants `spec.md` §7 `InvalidArgument` cases cover:
    /// non-empty name, version >= 1, at least one definition.
    pub fn validate(name: &str, version: u32, definitions: &[LabelDefinition]) -> Result<(), String> {
        if name.is_empty() {
            return Err("label name must not be empty".into());
        }
        if version < 1 {
            return Err("label version must be >= 1".into());
        }
        if definitions.is_empty() {
            return Err("label must have at least one definition".into());
        }
        Ok(())
    }
}
