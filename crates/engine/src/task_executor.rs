// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Task Executor (`spec.md` §4.6): runs each ApplicationTask once
//! its Application reaches the task's `when` state, serialized per
//! Application but parallel across Applications.

use std::collections::HashMap;
use std::sync::Arc;

use fish_core::event::{Bus, ChangeType};
use fish_core::{Application, ApplicationId, ApplicationState, ApplicationTask, Clock, Kind};
use fish_drivers::{Driver, DriverRegistry};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::EngineError;
use crate::lifecycle::LifecycleEngine;
use fish_store::{Store, TxnOp};

/// Watches ApplicationState CREATED events and runs every
/// unexecuted, matching-`when` ApplicationTask.
pub struct TaskExecutor<C: Clock> {
    store: Arc<Store>,
    drivers: Arc<DriverRegistry>,
    lifecycle: Arc<LifecycleEngine<C>>,
    /// One lock per Application so its tasks run strictly in order
    /// while different Applications execute concurrently (`spec.md`
    /// §4.6: "serialized per Application, parallel across them").
    app_locks: Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: Clock> TaskExecutor<C> {
    pub fn new(store: Arc<Store>, drivers: Arc<DriverRegistry>, lifecycle: Arc<LifecycleEngine<C>>) -> Self {
        TaskExecutor { store, drivers, lifecycle, app_locks: Mutex::new(HashMap::new()) }
    }

    fn lock_for(&self, application_id: ApplicationId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.app_locks.lock().entry(application_id).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
    }

    fn pending_tasks(&self, application_id: ApplicationId, current_status: fish_core::ApplicationStatus) -> Vec<ApplicationTask> {
        let mut tasks: Vec<ApplicationTask> = self
            .store
            .list(Kind::ApplicationTask, |_, payload| {
                serde_json::from_slice::<ApplicationTask>(payload)
                    .map(|t| t.application_uid == application_id && t.when == current_status && !t.is_executed())
                    .unwrap_or(false)
            })
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_slice::<ApplicationTask>(&payload).ok())
            .collect();
        tasks.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.uid.as_uid().as_bytes().cmp(b.uid.as_uid().as_bytes())));
        tasks
    }

    /// Run every pending task for `application_id` at `current_status`,
    /// in order, holding that Application's lock for the whole batch.
    pub async fn run_pending(&self, application_id: ApplicationId, current_status: fish_core::ApplicationStatus) -> Result<usize, EngineError> {
        let lock = self.lock_for(application_id);
        let _guard = lock.lock().await;

        let Some(resource) = self.lifecycle.live_resource(&application_id) else {
            return Ok(0);
        };
        let Some(driver) = self.drivers.get(&resource.driver_instance) else {
            return Ok(0);
        };

        let mut ran = 0usize;
        for task in self.pending_tasks(application_id, current_status) {
            self.run_one(&task, &resource.identifier, Arc::clone(&driver)).await?;
            ran += 1;
        }
        Ok(ran)
    }

    async fn run_one(&self, task: &ApplicationTask, identifier: &str, driver: Arc<dyn Driver>) -> Result<(), EngineError> {
        let outcome = tokio::time::timeout(driver.call_timeout(), driver.run_task(&task.task, identifier, &task.input, task.when)).await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                warn!(task=%task.uid, error=%err, "fish.task_executor=task_failed");
                let mut m = HashMap::new();
                m.insert("error".to_string(), serde_json::Value::String(err.to_string()));
                m
            }
            Err(_) => {
                warn!(task=%task.uid, "fish.task_executor=task_timed_out");
                let mut m = HashMap::new();
                m.insert("error".to_string(), serde_json::Value::String("task timed out".into()));
                m
            }
        };

        let mut updated = task.clone();
        updated.result = result;
        updated.executed_at_ms = self.lifecycle.epoch_ms();
        let payload = serde_json::to_vec(&updated)?;
        self.store.txn(vec![TxnOp::put(Kind::ApplicationTask, updated.uid.to_string(), payload)]).await?;
        Ok(())
    }

    fn application(&self, application_id: ApplicationId) -> Option<Application> {
        self.store.get(Kind::Application, &application_id.to_string()).ok().and_then(|b| serde_json::from_slice(&b).ok())
    }

    fn spawn_run(self: &Arc<Self>, application_id: ApplicationId, current_status: fish_core::ApplicationStatus) {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = executor.run_pending(application_id, current_status).await {
                warn!(error=%err, "fish.task_executor=run_failed");
            }
        });
    }

    /// Spawn the watcher: on every ApplicationState CREATED event, run
    /// pending tasks for that state; on every ApplicationTask CREATED
    /// event, check the owning Application's *current* state in case the
    /// task was created after that state was already entered (no further
    /// ApplicationState event will ever fire for it otherwise). Each
    /// match spawns its own `tokio::spawn` so cross-Application work
    /// overlaps.
    pub fn spawn_loop(self: Arc<Self>, bus: Arc<Bus>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut state_rx = bus.subscribe(Kind::ApplicationState);
            let mut task_rx = bus.subscribe(Kind::ApplicationTask);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = state_rx.recv() => {
                        let Ok(event) = event else {
                            if matches!(event, Err(tokio::sync::broadcast::error::RecvError::Closed)) {
                                break;
                            }
                            continue;
                        };
                        if event.change != ChangeType::Created {
                            continue;
                        }
                        let Ok(state) = serde_json::from_slice::<ApplicationState>(&event.object_data) else { continue };
                        if self.application(state.application_uid).is_none() {
                            continue;
                        }
                        self.spawn_run(state.application_uid, state.status);
                    }
                    event = task_rx.recv() => {
                        let Ok(event) = event else {
                            if matches!(event, Err(tokio::sync::broadcast::error::RecvError::Closed)) {
                                break;
                            }
                            continue;
                        };
                        if event.change != ChangeType::Created {
                            continue;
                        }
                        let Ok(task) = serde_json::from_slice::<ApplicationTask>(&event.object_data) else { continue };
                        let Some(state) = self.lifecycle.latest_state(&task.application_uid) else { continue };
                        if state.status != task.when {
                            continue;
                        }
                        self.spawn_run(task.application_uid, state.status);
                    }
                }
            }
        })
    }
}
