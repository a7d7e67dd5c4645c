// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application: a user-submitted request to allocate resources per a
//! Label (`spec.md` §3).

use crate::define_uid;
use crate::label::LabelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_uid! {
    pub struct ApplicationId;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub uid: ApplicationId,
    pub label_uid: LabelId,
    pub owner: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at_ms: u64,
}
