// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful shutdown drain (`spec.md` §5): stop intake, drain in-flight
//! Allocates up to a bound, force-deallocate every live resource, stop
//! the background loops, run one final CompactDB pass.

use std::sync::Arc;
use std::time::Duration;

use fish_core::{ApplicationResource, Clock, Kind};
use fish_drivers::DriverRegistry;
use fish_engine::{CapacityAccountant, LifecycleEngine};
use fish_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ShutdownSequence<C: Clock> {
    store: Arc<Store>,
    drivers: Arc<DriverRegistry>,
    accountant: Arc<CapacityAccountant>,
    lifecycle: Arc<LifecycleEngine<C>>,
    cancel: CancellationToken,
}

impl<C: Clock> ShutdownSequence<C> {
    pub fn new(
        store: Arc<Store>,
        drivers: Arc<DriverRegistry>,
        accountant: Arc<CapacityAccountant>,
        lifecycle: Arc<LifecycleEngine<C>>,
        cancel: CancellationToken,
    ) -> Self {
        ShutdownSequence { store, drivers, accountant, lifecycle, cancel }
    }

    /// Run the full drain. `drain_timeout` bounds how long to wait for
    /// any Allocate already in flight on each driver instance before
    /// moving on regardless.
    pub async fn run(&self, drain_timeout: Duration) {
        self.cancel.cancel();
        info!("fish.shutdown=intake_stopped");

        for instance in self.drivers.instance_names() {
            match tokio::time::timeout(drain_timeout, self.drivers.lock_allocate(&instance)).await {
                Ok(Ok(_guard)) => {}
                Ok(Err(error)) => warn!(%instance, %error, "fish.shutdown=drain_lock_failed"),
                Err(_) => warn!(%instance, "fish.shutdown=drain_timed_out"),
            }
        }
        info!("fish.shutdown=drained");

        let live: Vec<ApplicationResource> = self
            .store
            .list(Kind::ApplicationResource, |_, _| true)
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_slice(&payload).ok())
            .collect();
        for resource in live {
            let Some(driver) = self.drivers.get(&resource.driver_instance) else {
                warn!(application=%resource.application_uid, "fish.shutdown=driver_missing");
                continue;
            };
            if let Err(error) = self.lifecycle.run_deallocate(resource, driver, &self.accountant).await {
                warn!(%error, "fish.shutdown=force_deallocate_failed");
            }
        }
        info!("fish.shutdown=deallocated");

        match self.store.compact_once().await {
            Ok(keys) => info!(database.keys = keys, "fish.shutdown=compacted"),
            Err(error) => warn!(%error, "fish.shutdown=compact_failed"),
        }
    }
}
