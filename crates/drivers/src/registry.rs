// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DriverRegistry`: the set of configured driver instances, each with
//! its own capacity and per-instance allocate mutex (`spec.md` §4.2,
//! §4.4: "only one `Allocate` runs per driver-instance at a time").

use std::collections::HashMap;
use std::sync::Arc;

use fish_core::Resources;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::driver::Driver;
use crate::error::DriverError;

struct Instance {
    driver: Arc<dyn Driver>,
    allocate_lock: Arc<Mutex<()>>,
}

/// The set of driver instances loaded from `drivers.providers.*`
/// config, keyed by their config key (e.g. `test`, `test/dev`).
#[derive(Default)]
pub struct DriverRegistry {
    instances: HashMap<String, Instance>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        DriverRegistry { instances: HashMap::new() }
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        self.instances.insert(name, Instance { driver, allocate_lock: Arc::new(Mutex::new(())) });
    }

    pub fn get(&self, instance: &str) -> Option<Arc<dyn Driver>> {
        self.instances.get(instance).map(|i| Arc::clone(&i.driver))
    }

    pub fn capacity(&self, instance: &str) -> Option<Resources> {
        self.instances.get(instance).map(|i| i.driver.capacity())
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.instances.keys().cloned().collect()
    }

    /// Acquire the named instance's allocate mutex, serializing
    /// `Allocate` calls per driver-instance while leaving distinct
    /// instances free to proceed in parallel (`spec.md` §4.4).
    pub async fn lock_allocate(&self, instance: &str) -> Result<OwnedMutexGuard<()>, DriverError> {
        let entry = self.instances.get(instance).ok_or_else(|| DriverError::UnknownInstance(instance.to_string()))?;
        Ok(Arc::clone(&entry.allocate_lock).lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_driver::{TestDriver, TestDriverConfig};

    #[tokio::test]
    async fn registered_instance_is_retrievable_by_name() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
        assert!(registry.get("test").is_some());
        assert!(registry.get("test/prod").is_none());
    }

    #[tokio::test]
    async fn distinct_instances_have_independent_capacity() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::bounded("test/dev", 4, 8))));
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::bounded("test/prod", 8, 16))));
        assert_eq!(registry.capacity("test/dev"), Some(Resources::new(4, 8)));
        assert_eq!(registry.capacity("test/prod"), Some(Resources::new(8, 16)));
    }

    #[tokio::test]
    async fn allocate_lock_serializes_same_instance_calls() {
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
        let registry = Arc::new(registry);

        let first_guard = registry.lock_allocate("test").await.expect("lock");
        let registry2 = Arc::clone(&registry);
        let second_attempt = tokio::spawn(async move { registry2.lock_allocate("test").await.map(|_| ()) });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!second_attempt.is_finished());
        drop(first_guard);
        second_attempt.await.expect("join").expect("lock");
    }

    #[tokio::test]
    async fn unknown_instance_is_an_error() {
        let registry = DriverRegistry::new();
        assert!(matches!(registry.lock_allocate("missing").await, Err(DriverError::UnknownInstance(_))));
    }
}
