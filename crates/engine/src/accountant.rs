// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capacity Accountant (`spec.md` §4.3): the only authority on driver
//! capacity, kept in sync purely by consuming the ApplicationResource
//! event stream so it is never ahead of persisted truth.

use std::collections::HashMap;
use std::sync::Arc;

use fish_core::event::{Bus, ChangeType};
use fish_core::{ApplicationResource, Kind, Resources};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

pub struct CapacityAccountant {
    used: RwLock<HashMap<String, Resources>>,
}

impl Default for CapacityAccountant {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityAccountant {
    pub fn new() -> Self {
        CapacityAccountant { used: RwLock::new(HashMap::new()) }
    }

    pub fn used(&self, driver_instance: &str) -> Resources {
        self.used.read().get(driver_instance).copied().unwrap_or_default()
    }

    /// `Fits(driverInstance, def)`: true iff admitting `resources` would
    /// keep the instance's live total at or under `capacity`.
    pub fn fits(&self, driver_instance: &str, resources: &Resources, capacity: &Resources) -> bool {
        let used = self.used(driver_instance);
        resources.fits(&used, capacity)
    }

    fn credit(&self, driver_instance: &str, resources: &Resources) {
        let mut guard = self.used.write();
        let entry = guard.entry(driver_instance.to_string()).or_default();
        *entry = entry.checked_add(resources);
    }

    fn debit(&self, driver_instance: &str, resources: &Resources) {
        let mut guard = self.used.write();
        let entry = guard.entry(driver_instance.to_string()).or_default();
        *entry = entry.saturating_sub(resources);
    }

    fn apply_object_data(&self, change: ChangeType, object_data: &[u8]) {
        match change {
            ChangeType::Created => {
                if let Ok(resource) = serde_json::from_slice::<ApplicationResource>(object_data) {
                    self.credit(&resource.driver_instance, &resource.resources);
                }
            }
            ChangeType::Removed | ChangeType::Updated => {
                // Removed events carry no payload (`spec.md` §4.7); a
                // Removed ApplicationResource is looked up by the caller
                // before deletion and passed to `debit` directly via
                // `record_removed`. Updated never happens for this kind
                // (ApplicationResource is create/delete only).
            }
        }
    }

    /// Rebuild totals from a full point-in-time snapshot, e.g. at boot
    /// before the live subscription is in place.
    pub fn seed(&self, live_resources: &[ApplicationResource]) {
        let mut guard = self.used.write();
        guard.clear();
        for resource in live_resources {
            let entry = guard.entry(resource.driver_instance.clone()).or_default();
            *entry = entry.checked_add(&resource.resources);
        }
    }

    /// Explicit debit for a resource known to have been removed (the
    /// Bus's `Removed` event carries no payload to recover this from).
    pub fn record_removed(&self, driver_instance: &str, resources: &Resources) {
        self.debit(driver_instance, resources);
    }

    /// Spawn the task that keeps this accountant in sync with the Bus's
    /// ApplicationResource CREATED events for the lifetime of `self`.
    /// Removed events are handled by [`CapacityAccountant::record_removed`],
    /// called by the Lifecycle Engine at the point it deletes the record
    /// (it already has the `Resources` value in hand there).
    pub fn spawn_listener(self: &Arc<Self>, bus: Arc<Bus>) -> JoinHandle<()> {
        let accountant = Arc::clone(self);
        let mut rx = bus.subscribe(Kind::ApplicationResource);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => accountant.apply_object_data(event.change, &event.object_data),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
