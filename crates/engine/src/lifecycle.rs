// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle Engine (`spec.md` §4.5): the state machine's transition
//! writers, deallocate retry/backoff, and lifetime expiry.

use std::sync::Arc;
use std::time::Duration;

use fish_core::event::Bus;
use fish_core::{
    ApplicationId, ApplicationResource, ApplicationState, ApplicationStateId, ApplicationStatus,
    Clock, IdGenerator, Kind,
};
use fish_drivers::{Driver, DriverRegistry};
use fish_store::{ResolutionOracle, Store, TxnOp};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::accountant::CapacityAccountant;
use crate::error::EngineError;

/// Deallocate retry/backoff policy (`spec.md` §4.5: "at most N, default
/// 5, exponential backoff").
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub deallocate_retry_budget: u32,
    pub backoff_base: Duration,
    /// `0` disables lifetime expiry (`spec.md` §4.5).
    pub default_resource_lifetime_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            deallocate_retry_budget: 5,
            backoff_base: Duration::from_millis(200),
            default_resource_lifetime_ms: 0,
        }
    }
}

pub struct LifecycleEngine<C: Clock> {
    store: Arc<Store>,
    clock: C,
    config: LifecycleConfig,
    id_gen: IdGenerator,
}

impl<C: Clock> LifecycleEngine<C> {
    pub fn new(store: Arc<Store>, clock: C, config: LifecycleConfig, id_gen: IdGenerator) -> Self {
        LifecycleEngine { store, clock, config, id_gen }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn epoch_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// The newest `ApplicationState` for `application_id`, if any.
    pub fn latest_state(&self, application_id: &ApplicationId) -> Option<ApplicationState> {
        let records = self.store.list(Kind::ApplicationState, |_, payload| {
            serde_json::from_slice::<ApplicationState>(payload)
                .map(|s| s.application_uid == *application_id)
                .unwrap_or(false)
        });
        records
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_slice::<ApplicationState>(&payload).ok())
            .max_by_key(|s| s.created_at_ms)
    }

    /// The live `ApplicationResource` for `application_id`, if one exists
    /// (`spec.md` §3: at most one while ALLOCATED/DEALLOCATE).
    pub fn live_resource(&self, application_id: &ApplicationId) -> Option<ApplicationResource> {
        let records = self.store.list(Kind::ApplicationResource, |_, payload| {
            serde_json::from_slice::<ApplicationResource>(payload)
                .map(|r| r.application_uid == *application_id)
                .unwrap_or(false)
        });
        records.into_iter().find_map(|(_, payload)| serde_json::from_slice::<ApplicationResource>(&payload).ok())
    }

    fn state_record(&self, application_id: ApplicationId, status: ApplicationStatus, description: String) -> ApplicationState {
        ApplicationState {
            uid: ApplicationStateId::generate(&self.id_gen),
            application_uid: application_id,
            status,
            description,
            created_at_ms: self.clock.epoch_ms(),
        }
    }

    /// Write `ELECTED` (`spec.md` §4.4 step 4).
    pub async fn write_elected(&self, application_id: ApplicationId) -> Result<(), EngineError> {
        let state = self.state_record(application_id, ApplicationStatus::Elected, String::new());
        let payload = serde_json::to_vec(&state)?;
        self.store.txn(vec![TxnOp::put(Kind::ApplicationState, state.uid.to_string(), payload)]).await?;
        Ok(())
    }

    /// Write `ALLOCATED` and persist the winning `ApplicationResource` in
    /// one Txn (`spec.md` §5: "committed in one Txn, so subscribers never
    /// see a stale state/resource pair").
    pub async fn write_allocated(&self, application_id: ApplicationId, resource: ApplicationResource) -> Result<(), EngineError> {
        let state = self.state_record(application_id, ApplicationStatus::Allocated, String::new());
        let resource_payload = serde_json::to_vec(&resource)?;
        let state_payload = serde_json::to_vec(&state)?;
        self.store
            .txn(vec![
                TxnOp::put(Kind::ApplicationResource, resource.uid.to_string(), resource_payload),
                TxnOp::put(Kind::ApplicationState, state.uid.to_string(), state_payload),
            ])
            .await?;
        Ok(())
    }

    /// Write `ERROR`, dropping any resource slot reserved for this
    /// attempt so capacity is never leaked (`spec.md` §4.4 step 5).
    pub async fn write_error(&self, application_id: ApplicationId, description: impl Into<String>) -> Result<(), EngineError> {
        let state = self.state_record(application_id, ApplicationStatus::Error, description.into());
        let payload = serde_json::to_vec(&state)?;
        self.store.txn(vec![TxnOp::put(Kind::ApplicationState, state.uid.to_string(), payload)]).await?;
        Ok(())
    }

    /// Request deallocation. A no-op on an already-resolved Application
    /// (`spec.md` §4.5: "idempotent").
    pub async fn request_deallocate(&self, application_id: ApplicationId) -> Result<(), EngineError> {
        if let Some(state) = self.latest_state(&application_id) {
            if state.status.is_resolved() {
                return Ok(());
            }
        }
        let state = self.state_record(application_id, ApplicationStatus::Deallocate, String::new());
        let payload = serde_json::to_vec(&state)?;
        self.store.txn(vec![TxnOp::put(Kind::ApplicationState, state.uid.to_string(), payload)]).await?;
        Ok(())
    }

    /// `default_resource_lifetime > 0 && now - allocatedAt > lifetime`.
    pub fn is_lifetime_expired(&self, allocated_at_ms: u64) -> bool {
        self.config.default_resource_lifetime_ms > 0
            && self.clock.epoch_ms().saturating_sub(allocated_at_ms) > self.config.default_resource_lifetime_ms
    }

    /// Drive one Application's DEALLOCATE through to DEALLOCATED or
    /// ERROR, retrying `driver.deallocate` up to the configured budget
    /// with exponential backoff (`spec.md` §4.5).
    pub async fn run_deallocate(
        &self,
        resource: ApplicationResource,
        driver: Arc<dyn Driver>,
        accountant: &CapacityAccountant,
    ) -> Result<(), EngineError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(driver.call_timeout(), driver.deallocate(&resource.identifier)).await;
            let succeeded = matches!(outcome, Ok(Ok(())));
            if succeeded || attempt >= self.config.deallocate_retry_budget {
                let status = if succeeded { ApplicationStatus::Deallocated } else { ApplicationStatus::Error };
                let description =
                    if succeeded { String::new() } else { format!("deallocate failed after {attempt} attempts") };
                let state = self.state_record(resource.application_uid, status, description);
                let state_payload = serde_json::to_vec(&state)?;
                self.store
                    .txn(vec![
                        TxnOp::delete(Kind::ApplicationResource, resource.uid.to_string()),
                        TxnOp::put(Kind::ApplicationState, state.uid.to_string(), state_payload),
                    ])
                    .await?;
                accountant.record_removed(&resource.driver_instance, &resource.resources);
                return Ok(());
            }
            tokio::time::sleep(self.config.backoff_base * 2u32.pow(attempt - 1)).await;
        }
    }

    fn all_live_resources(&self) -> Vec<ApplicationResource> {
        self.store
            .list(Kind::ApplicationResource, |_, _| true)
            .into_iter()
            .filter_map(|(_, payload)| serde_json::from_slice::<ApplicationResource>(&payload).ok())
            .collect()
    }

    /// One sweep of `ALLOCATED` resources whose lifetime has expired:
    /// request their deallocation (`spec.md` §4.5: "deallocate req /
    /// lifetime expiry" both lead to `DEALLOCATE`).
    async fn sweep_expired(&self) -> Result<(), EngineError> {
        for resource in self.all_live_resources() {
            if self.is_lifetime_expired(resource.created_at_ms) {
                self.request_deallocate(resource.application_uid).await?;
            }
        }
        Ok(())
    }

    /// Drive every `DEALLOCATE`d Application's resource through to
    /// `DEALLOCATED`/`ERROR` via its driver.
    async fn drain_deallocate(&self, drivers: &DriverRegistry, accountant: &CapacityAccountant) -> Result<(), EngineError> {
        for resource in self.all_live_resources() {
            let Some(state) = self.latest_state(&resource.application_uid) else { continue };
            if state.status != ApplicationStatus::Deallocate {
                continue;
            }
            let Some(driver) = drivers.get(&resource.driver_instance) else {
                warn!(application=%resource.application_uid, "fish.lifecycle=driver_missing");
                continue;
            };
            self.run_deallocate(resource, driver, accountant).await?;
        }
        Ok(())
    }

    /// Spawn the periodic loop driving `DEALLOCATE` and lifetime expiry
    /// (`spec.md` §4.5): a tick plus an early wake on every new
    /// `ApplicationState` so a requested deallocate doesn't wait a full
    /// tick.
    pub fn spawn_loop(
        self: Arc<Self>,
        tick: Duration,
        drivers: Arc<DriverRegistry>,
        accountant: Arc<CapacityAccountant>,
        bus: Arc<Bus>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut state_events = bus.subscribe(Kind::ApplicationState);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    event = state_events.recv() => {
                        if event.is_err() {
                            continue;
                        }
                    }
                }
                if let Err(err) = self.sweep_expired().await {
                    warn!(error=%err, "fish.lifecycle=sweep_failed");
                }
                if let Err(err) = self.drain_deallocate(&drivers, &accountant).await {
                    warn!(error=%err, "fish.lifecycle=drain_failed");
                }
            }
        })
    }
}

/// Adapts a [`LifecycleEngine`] to `fish-store`'s [`ResolutionOracle`]
/// for the `CleanupDB` loop (`spec.md` §4.1).
pub struct LifecycleResolutionOracle<C: Clock> {
    engine: Arc<LifecycleEngine<C>>,
}

impl<C: Clock> LifecycleResolutionOracle<C> {
    pub fn new(engine: Arc<LifecycleEngine<C>>) -> Self {
        LifecycleResolutionOracle { engine }
    }
}

impl<C: Clock> ResolutionOracle for LifecycleResolutionOracle<C> {
    fn is_resolved_and_clean(&self, application_id: &str) -> bool {
        let Ok(uid) = application_id.parse::<fish_core::id::Uid>() else { return false };
        let app_id = ApplicationId::from_uid(uid);
        let resolved = self.engine.latest_state(&app_id).map(|s| s.status.is_resolved()).unwrap_or(false);
        resolved && self.engine.live_resource(&app_id).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fish_core::event::Bus;
    use fish_core::{FakeClock, Resources};
    use fish_drivers::{TestDriver, TestDriverConfig};

    async fn engine() -> (Arc<Store>, LifecycleEngine<FakeClock>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Arc::new(Bus::new());
        let store = Store::open(dir.path().join("log"), bus).expect("open");
        let engine =
            LifecycleEngine::new(Arc::clone(&store), FakeClock::new(), LifecycleConfig::default(), IdGenerator::new([0; 6]));
        (store, engine)
    }

    fn app_id() -> ApplicationId {
        ApplicationId::from_uid(fish_core::id::Uid::random())
    }

    #[tokio::test]
    async fn elect_then_allocate_produces_expected_states() {
        let (_store, engine) = engine().await;
        let id = app_id();
        engine.write_elected(id).await.expect("elect");
        assert_eq!(engine.latest_state(&id).unwrap().status, ApplicationStatus::Elected);

        let resource = ApplicationResource {
            uid: fish_core::ApplicationResourceId::generate(&fish_core::IdGenerator::new([0; 6])),
            application_uid: id,
            driver_instance: "test".into(),
            identifier: "r1".into(),
            definition_index: 0,
            resources: Resources::new(1, 1),
            authentication: Default::default(),
            created_at_ms: 1,
        };
        engine.write_allocated(id, resource).await.expect("allocate");
        assert_eq!(engine.latest_state(&id).unwrap().status, ApplicationStatus::Allocated);
        assert!(engine.live_resource(&id).is_some());
    }

    #[tokio::test]
    async fn request_deallocate_on_resolved_application_is_a_noop() {
        let (_store, engine) = engine().await;
        let id = app_id();
        engine.write_error(id, "boom").await.expect("error");
        engine.request_deallocate(id).await.expect("no-op");
        assert_eq!(engine.latest_state(&id).unwrap().status, ApplicationStatus::Error);
    }

    #[tokio::test]
    async fn run_deallocate_succeeds_and_frees_capacity() {
        let (_store, engine) = engine().await;
        let accountant = CapacityAccountant::new();
        let driver: Arc<dyn Driver> = Arc::new(TestDriver::new(TestDriverConfig::unlimited("test")));
        let resource = ApplicationResource {
            uid: fish_core::ApplicationResourceId::generate(&fish_core::IdGenerator::new([0; 6])),
            application_uid: app_id(),
            driver_instance: "test".into(),
            identifier: "r1".into(),
            definition_index: 0,
            resources: Resources::new(2, 2),
            authentication: Default::default(),
            created_at_ms: 1,
        };
        let app_uid = resource.application_uid;
        accountant.seed(std::slice::from_ref(&resource));
        engine.run_deallocate(resource, driver, &accountant).await.expect("deallocate");
        assert_eq!(engine.latest_state(&app_uid).unwrap().status, ApplicationStatus::Deallocated);
        assert_eq!(accountant.used("test"), Resources::default());
    }

    #[test]
    fn lifetime_expiry_respects_zero_disables() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let bus = Arc::new(Bus::new());
        let store = Store::open(dir.path().join("log"), bus).expect("open");
        let clock = FakeClock::new();
        let engine = LifecycleEngine::new(Arc::clone(&store), clock.clone(), LifecycleConfig::default(), IdGenerator::new([0; 6]));
        assert!(!engine.is_lifetime_expired(0));

        let engine = LifecycleEngine::new(
            store,
            clock.clone(),
            LifecycleConfig { default_resource_lifetime_ms: 1000, ..LifecycleConfig::default() },
            IdGenerator::new([0; 6]),
        );
        let allocated_at = clock.epoch_ms();
        assert!(!engine.is_lifetime_expired(allocated_at));
        clock.advance(Duration::from_secs(2));
        assert!(engine.is_lifetime_expired(allocated_at));
    }

    #[tokio::test]
    async fn spawn_loop_drains_a_requested_deallocate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bus = Arc::new(Bus::new());
        let store = Store::open(dir.path().join("log"), bus.clone()).expect("open");
        let engine =
            Arc::new(LifecycleEngine::new(Arc::clone(&store), FakeClock::new(), LifecycleConfig::default(), IdGenerator::new([0; 6])));

        let accountant = Arc::new(CapacityAccountant::new());
        let mut registry = DriverRegistry::new();
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
        let drivers = Arc::new(registry);

        let id = app_id();
        let resource = ApplicationResource {
            uid: fish_core::ApplicationResourceId::generate(&fish_core::IdGenerator::new([0; 6])),
            application_uid: id,
            driver_instance: "test".into(),
            identifier: "r1".into(),
            definition_index: 0,
            resources: Resources::new(1, 1),
            authentication: Default::default(),
            created_at_ms: 1,
        };
        engine.write_allocated(id, resource).await.expect("seed allocated");
        accountant.seed(&[engine.live_resource(&id).expect("live")]);
        engine.request_deallocate(id).await.expect("request deallocate");

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&engine).spawn_loop(
            Duration::from_millis(10),
            Arc::clone(&drivers),
            Arc::clone(&accountant),
            bus,
            cancel.clone(),
        );

        for _ in 0..50 {
            if engine.latest_state(&id).map(|s| s.status) == Some(ApplicationStatus::Deallocated) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.latest_state(&id).unwrap().status, ApplicationStatus::Deallocated);
        assert!(engine.live_resource(&id).is_none());

        cancel.cancel();
        let _ = handle.await;
    }
}
