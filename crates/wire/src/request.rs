// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use fish_core::Kind;
use serde::{Deserialize, Serialize};

use super::Query;

/// Request from an RPC client to the node (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    Ping,

    Hello {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    Query {
        query: Query,
    },

    /// `StreamingService::Subscribe` — returns a live-from-now stream of
    /// [`super::StreamMessage`] for the requested kinds (`spec.md` §6).
    Subscribe {
        kinds: Vec<Kind>,
    },

    LabelCreate {
        name: String,
        version: u32,
        definitions: Vec<fish_core::LabelDefinition>,
    },

    LabelRemove {
        id: String,
    },

    ApplicationCreate {
        label_uid: String,
        owner: String,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },

    ApplicationDeallocate {
        id: String,
    },

    ApplicationTaskCreate {
        application_id: String,
        task: String,
        when: fish_core::ApplicationStatus,
        #[serde(default)]
        input: HashMap<String, serde_json::Value>,
    },

    NodeSetMaintenance {
        enabled: bool,
    },

    Shutdown,
}
