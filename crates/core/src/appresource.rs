// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ApplicationResource: the concrete allocation bound to a driver
//! (`spec.md` §3).

use crate::application::ApplicationId;
use crate::define_uid;
use crate::resources::Resources;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

define_uid! {
    pub struct ApplicationResourceId;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResource {
    pub uid: ApplicationResourceId,
    pub application_uid: ApplicationId,
    /// Driver config key this resource was allocated from, e.g. `"test/prod"`.
    pub driver_instance: String,
    /// Driver-opaque handle for the allocated resource.
    pub identifier: String,
    /// Index into the winning Label's `definitions` list.
    pub definition_index: usize,
    /// Copied from the winning Label definition at allocation time, so
    /// the Capacity Accountant can rebuild its totals from the
    /// ApplicationResource event stream alone (`spec.md` §4.3) without
    /// re-reading the (possibly since-removed) Label.
    pub resources: Resources,
    #[serde(default)]
    pub authentication: HashMap<String, String>,
    pub created_at_ms: u64,
}
