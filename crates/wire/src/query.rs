// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only query types (`spec.md` §6 `LabelService`/`ApplicationService`/
//! `NodeService` list/get operations).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Query {
    ListLabels,
    GetLabel { id: String },
    ListApplications,
    GetApplication { id: String },
    GetApplicationState { application_id: String },
    GetApplicationResource { application_id: String },
    ListApplicationTasks { application_id: String },
    ListNodes,
}
