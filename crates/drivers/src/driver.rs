// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Driver` capability contract (`spec.md` §4.2): every backend a
//! Label can target implements this, named by its config key.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use fish_core::{ApplicationStatus, LabelDefinition, Resources};
use serde_json::Value;

use crate::error::DriverError;

/// Liveness of an allocated resource, as reported by its driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Running,
    Gone,
    Error,
}

/// One concrete backend a Label definition can target (`spec.md` §4.2).
///
/// Implementors are addressed by their config key, e.g. `test` or
/// `test/prod` — distinct instances of the same driver kind with
/// independent capacities, not distinct trait impls.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// The config key this instance was loaded under, e.g. `test/prod`.
    fn name(&self) -> &str;

    fn available_tasks(&self) -> HashSet<String>;

    fn capacity(&self) -> Resources;

    /// Default per-call timeout the caller should wrap this driver's
    /// calls in, absent an explicit override (`spec.md` §5: "default 60s").
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    /// Bind a concrete resource for `def`. May take seconds. Returns the
    /// driver-opaque identifier plus any authentication details the
    /// caller should persist on the `ApplicationResource`.
    async fn allocate(
        &self,
        def: &LabelDefinition,
        app_metadata: &HashMap<String, Value>,
    ) -> Result<(String, HashMap<String, String>), DriverError>;

    async fn status(&self, identifier: &str) -> Result<DriverStatus, DriverError>;

    /// Run `task_name` against `identifier`. `when` is the Application
    /// status the task was scheduled for, so a driver whose result
    /// depends on which lifecycle point triggered it (`spec.md` §4.6 S4:
    /// a `snapshot` task's result names the state it ran in) can tell
    /// them apart. If the task isn't in [`Driver::available_tasks`],
    /// returns the literal `{"error":"task not available in driver"}`
    /// result and `Ok` — the task is recorded as executed with a failure
    /// payload rather than retried (`spec.md` §4.2, §4.6).
    async fn run_task(
        &self,
        task_name: &str,
        identifier: &str,
        input: &HashMap<String, Value>,
        when: ApplicationStatus,
    ) -> Result<HashMap<String, Value>, DriverError> {
        if !self.available_tasks().contains(task_name) {
            return Ok(fish_core::ApplicationTask::task_not_available_result());
        }
        self.run_known_task(task_name, identifier, input, when).await
    }

    /// Called by the default [`Driver::run_task`] only for tasks already
    /// confirmed present in [`Driver::available_tasks`].
    async fn run_known_task(
        &self,
        task_name: &str,
        identifier: &str,
        input: &HashMap<String, Value>,
        when: ApplicationStatus,
    ) -> Result<HashMap<String, Value>, DriverError>;

    async fn deallocate(&self, identifier: &str) -> Result<(), DriverError>;
}
