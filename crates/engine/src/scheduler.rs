// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Election Loop (`spec.md` §4.4): picks a driver instance for each
//! NEW Application, in oldest-created-first order, and drives it
//! through `ELECTED` to `ALLOCATED`/`ERROR`.

use std::sync::Arc;
use std::time::Duration;

use fish_core::event::{Bus, ChangeType};
use fish_core::{Application, ApplicationResource, ApplicationResourceId, Clock, IdGenerator, Kind, Label};
use fish_drivers::DriverRegistry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::accountant::CapacityAccountant;
use crate::error::EngineError;
use crate::lifecycle::LifecycleEngine;
use fish_store::Store;

/// One pass of the Election Loop, and its periodic driver (`spec.md`
/// §4.4: "runs on a tick, and wakes early on NEW or freed-capacity
/// events so newly-fitting Applications don't wait a full tick").
pub struct Scheduler<C: Clock> {
    store: Arc<Store>,
    drivers: Arc<DriverRegistry>,
    accountant: Arc<CapacityAccountant>,
    lifecycle: Arc<LifecycleEngine<C>>,
    id_gen: IdGenerator,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(
        store: Arc<Store>,
        drivers: Arc<DriverRegistry>,
        accountant: Arc<CapacityAccountant>,
        lifecycle: Arc<LifecycleEngine<C>>,
        id_gen: IdGenerator,
    ) -> Self {
        Scheduler { store, drivers, accountant, lifecycle, id_gen }
    }

    fn new_applications(&self) -> Vec<Application> {
        let mut apps: Vec<Application> = self
            .store
            .list(Kind::Application, |_, _| true)
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_slice::<Application>(&payload).ok())
            .filter(|app| match self.lifecycle.latest_state(&app.uid) {
                None => true,
                Some(state) => state.status == fish_core::ApplicationStatus::New,
            })
            .collect();
        // Oldest-created-first, UID bytes as the tiebreak (`spec.md`
        // §4.4 step 1).
        apps.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.uid.as_uid().as_bytes().cmp(b.uid.as_uid().as_bytes())));
        apps
    }

    fn label_for(&self, label_uid: fish_core::LabelId) -> Option<Label> {
        self.store.get(Kind::Label, &label_uid.to_string()).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Try every definition on `label` in order; the first that fits on
    /// its driver instance wins (`spec.md` §4.4 step 2-3).
    fn pick_definition(&self, label: &Label) -> Option<usize> {
        label.definitions.iter().position(|def| {
            self.drivers
                .capacity(&def.driver)
                .map(|capacity| self.accountant.fits(&def.driver, &def.resources, &capacity))
                .unwrap_or(false)
        })
    }

    /// Run one election pass: elect, allocate, write ALLOCATED/ERROR for
    /// every NEW Application that currently has a fitting driver.
    pub async fn run_once(&self) -> Result<usize, EngineError> {
        let mut elected = 0usize;
        for app in self.new_applications() {
            let Some(label) = self.label_for(app.label_uid) else {
                warn!(application=%app.uid, "fish.scheduler=label_missing");
                continue;
            };
            let Some(def_index) = self.pick_definition(&label) else {
                continue;
            };
            let def = &label.definitions[def_index];
            let driver_instance = def.driver.clone();
            let Some(driver) = self.drivers.get(&driver_instance) else {
                continue;
            };

            self.lifecycle.write_elected(app.uid).await?;
            elected += 1;

            let guard = self.drivers.lock_allocate(&driver_instance).await?;
            let outcome = tokio::time::timeout(driver.call_timeout(), driver.allocate(def, &app.metadata)).await;
            drop(guard);

            match outcome {
                Ok(Ok((identifier, authentication))) => {
                    let resource = ApplicationResource {
                        uid: ApplicationResourceId::generate(&self.id_gen),
                        application_uid: app.uid,
                        driver_instance,
                        identifier,
                        definition_index: def_index,
                        resources: def.resources,
                        authentication,
                        created_at_ms: self.lifecycle.epoch_ms(),
                    };
                    self.lifecycle.write_allocated(app.uid, resource).await?;
                    info!(application=%app.uid, "fish.scheduler=allocated");
                }
                Ok(Err(err)) => {
                    self.lifecycle.write_error(app.uid, err.to_string()).await?;
                    warn!(application=%app.uid, error=%err, "fish.scheduler=allocate_failed");
                }
                Err(_) => {
                    self.lifecycle.write_error(app.uid, "allocate timed out").await?;
                    warn!(application=%app.uid, "fish.scheduler=allocate_timed_out");
                }
            }
        }
        Ok(elected)
    }

    /// Spawn the periodic loop: a 1s tick plus wake-ups on NEW
    /// Applications and freed capacity (`spec.md` §4.4).
    pub fn spawn_loop(
        self: Arc<Self>,
        tick: Duration,
        bus: Arc<Bus>,
        maintenance: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut app_events = bus.subscribe(Kind::Application);
            let mut resource_events = bus.subscribe(Kind::ApplicationResource);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    event = app_events.recv() => {
                        if matches!(event, Ok(e) if e.change == ChangeType::Created) {
                            // fall through to a run below
                        } else if event.is_err() {
                            continue;
                        }
                    }
                    event = resource_events.recv() => {
                        if matches!(event, Ok(e) if e.change == ChangeType::Removed) {
                            // fall through to a run below
                        } else if event.is_err() {
                            continue;
                        }
                    }
                }
                if *maintenance.borrow() {
                    continue;
                }
                if let Err(err) = self.run_once().await {
                    warn!(error=%err, "fish.scheduler=run_failed");
                }
            }
        })
    }
}
