// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-tree `test` driver: a reference backend with no real side
//! effects, used by the S1-S8 scenarios (`spec.md` §8) and by anything
//! exercising the scheduler without a live provider.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fish_core::{ApplicationStatus, LabelDefinition, Resources};
use serde_json::Value;

use crate::driver::{Driver, DriverStatus};
use crate::error::DriverError;

/// Config for one `test`/`test/<qualifier>` instance (`spec.md` §6:
/// `drivers.providers.<name> → cpu_limit, ram_limit`).
#[derive(Debug, Clone)]
pub struct TestDriverConfig {
    pub name: String,
    /// `None` means unlimited, matching `spec.md` S1's "unlimited" config.
    pub cpu_limit: Option<u32>,
    pub ram_limit: Option<u32>,
    pub tasks: HashSet<String>,
    /// Artificial latency before `allocate` resolves, for exercising the
    /// Scheduler's async suspension points in tests.
    pub allocate_latency: Duration,
    pub task_latency: Duration,
}

impl TestDriverConfig {
    pub fn unlimited(name: impl Into<String>) -> Self {
        TestDriverConfig {
            name: name.into(),
            cpu_limit: None,
            ram_limit: None,
            tasks: HashSet::new(),
            allocate_latency: Duration::ZERO,
            task_latency: Duration::ZERO,
        }
    }

    pub fn bounded(name: impl Into<String>, cpu_limit: u32, ram_limit: u32) -> Self {
        TestDriverConfig { cpu_limit: Some(cpu_limit), ram_limit: Some(ram_limit), ..Self::unlimited(name) }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.tasks.insert(task.into());
        self
    }
}

pub struct TestDriver {
    config: TestDriverConfig,
    next_identifier: AtomicU64,
}

impl TestDriver {
    pub fn new(config: TestDriverConfig) -> Self {
        TestDriver { config, next_identifier: AtomicU64::new(1) }
    }
}

#[async_trait]
impl Driver for TestDriver {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn available_tasks(&self) -> HashSet<String> {
        self.config.tasks.clone()
    }

    fn capacity(&self) -> Resources {
        Resources::new(self.config.cpu_limit.unwrap_or(u32::MAX), self.config.ram_limit.unwrap_or(u32::MAX))
    }

    async fn allocate(
        &self,
        _def: &LabelDefinition,
        _app_metadata: &HashMap<String, Value>,
    ) -> Result<(String, HashMap<String, String>), DriverError> {
        if !self.config.allocate_latency.is_zero() {
            tokio::time::sleep(self.config.allocate_latency).await;
        }
        let n = self.next_identifier.fetch_add(1, Ordering::SeqCst);
        Ok((format!("{}-resource-{n}", self.config.name), HashMap::new()))
    }

    async fn status(&self, _identifier: &str) -> Result<DriverStatus, DriverError> {
        Ok(DriverStatus::Running)
    }

    async fn run_known_task(
        &self,
        task_name: &str,
        _identifier: &str,
        _input: &HashMap<String, Value>,
        when: ApplicationStatus,
    ) -> Result<HashMap<String, Value>, DriverError> {
        if !self.config.task_latency.is_zero() {
            tokio::time::sleep(self.config.task_latency).await;
        }
        if task_name == "snapshot" {
            let mut result = HashMap::new();
            result.insert("snapshots".to_string(), Value::Array(vec![Value::String("test-snapshot".to_string())]));
            result.insert("when".to_string(), Value::String(when.to_string()));
            return Ok(result);
        }
        let mut result = HashMap::new();
        result.insert("task".to_string(), Value::String(task_name.to_string()));
        result.insert("ok".to_string(), Value::Bool(true));
        Ok(result)
    }

    async fn deallocate(&self, _identifier: &str) -> Result<(), DriverError> {
        Ok(())
    }
}
