// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios driven purely over the wire, against a real
//! `fishd` RPC listener with its scheduler/lifecycle/task-executor
//! loops running (`spec.md` §8).

use std::sync::Arc;
use std::time::Duration;

use fish_core::event::Bus;
use fish_core::{seed_admin, seed_roles, ApplicationStatus, FakeClock, IdGenerator, Kind, Node, NodeId, Resources};
use fish_daemon::listener::{self, ListenCtx};
use fish_daemon::NodeController;
use fish_drivers::{DriverRegistry, TestDriver, TestDriverConfig};
use fish_engine::{CapacityAccountant, LifecycleConfig, LifecycleEngine, Scheduler, TaskExecutor};
use fish_store::Store;
use fish_wire::{Query, Request, Response};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(10);

struct Harness {
    address: String,
    clock: FakeClock,
    cancel: CancellationToken,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn spawn_node(drivers: DriverRegistry, lifecycle_config: LifecycleConfig) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let bus = Arc::new(Bus::new());
    let store = Store::open(dir.path().join("log"), Arc::clone(&bus)).expect("open store");

    let admin = seed_admin("unused-hash");
    store.put(Kind::User, admin.name.clone(), serde_json::to_vec(&admin).unwrap()).await.unwrap();
    for role in seed_roles() {
        store.put(Kind::Role, role.name.clone(), serde_json::to_vec(&role).unwrap()).await.unwrap();
    }

    let id_gen = IdGenerator::new([0; 6]);
    let clock = FakeClock::new();
    let drivers = Arc::new(drivers);
    let accountant = Arc::new(CapacityAccountant::new());
    let lifecycle = Arc::new(LifecycleEngine::new(Arc::clone(&store), clock.clone(), lifecycle_config, id_gen.clone()));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&drivers),
        Arc::clone(&accountant),
        Arc::clone(&lifecycle),
        id_gen.clone(),
    ));
    let task_executor = Arc::new(TaskExecutor::new(Arc::clone(&store), Arc::clone(&drivers), Arc::clone(&lifecycle)));
    let (node_controller, maintenance_rx) = NodeController::new();
    let node = Node::new(NodeId::generate(&id_gen), "node-a", "us-east");
    let cancel = CancellationToken::new();

    let mut handles = Vec::new();
    handles.push(accountant.spawn_listener(Arc::clone(&bus)));
    handles.push(Arc::clone(&scheduler).spawn_loop(TICK, Arc::clone(&bus), maintenance_rx, cancel.clone()));
    handles.push(Arc::clone(&task_executor).spawn_loop(Arc::clone(&bus), cancel.clone()));
    handles.push(Arc::clone(&lifecycle).spawn_loop(TICK, Arc::clone(&drivers), Arc::clone(&accountant), Arc::clone(&bus), cancel.clone()));

    let ctx = Arc::new(ListenCtx {
        store,
        drivers,
        accountant,
        lifecycle,
        bus,
        node,
        node_controller,
        id_gen,
        shutdown: cancel.clone(),
    });

    let tcp_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = tcp_listener.local_addr().unwrap().to_string();
    handles.push(tokio::spawn(async move {
        let _ = listener::serve_on(ctx, tcp_listener).await;
    }));

    Harness { address, clock, cancel, handles }
}

struct Client {
    socket: TcpStream,
}

impl Client {
    async fn connect(address: &str, token: Option<&str>) -> Self {
        let mut socket = TcpStream::connect(address).await.expect("connect");
        fish_wire::write_message(&mut socket, &Request::Hello { version: "1".into(), token: token.map(str::to_string) })
            .await
            .unwrap();
        let _: Response = fish_wire::read_message(&mut socket).await.unwrap();
        Client { socket }
    }

    async fn send(&mut self, request: Request) -> Response {
        fish_wire::write_message(&mut self.socket, &request).await.unwrap();
        fish_wire::read_message(&mut self.socket).await.unwrap()
    }
}

async fn wait_for_status(client: &mut Client, application_id: &str, target: ApplicationStatus, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let response = client.send(Request::Query { query: Query::GetApplicationState { application_id: application_id.into() } }).await;
        if let Response::ApplicationState { state: Some(state) } = response {
            if state.status == target {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn create_label(client: &mut Client, driver: &str, resources: Resources) -> String {
    let response = client
        .send(Request::LabelCreate {
            name: "spec-label".into(),
            version: 1,
            definitions: vec![fish_core::LabelDefinition::new(driver, resources)],
        })
        .await;
    let Response::LabelCreated { id } = response else { panic!("expected LabelCreated, got {response:?}") };
    id
}

async fn create_application(client: &mut Client, label_uid: &str) -> String {
    let response = client
        .send(Request::ApplicationCreate { label_uid: label_uid.into(), owner: "tester".into(), metadata: Default::default() })
        .await;
    let Response::ApplicationCreated { id } = response else { panic!("expected ApplicationCreated, got {response:?}") };
    id
}

#[tokio::test]
async fn s1_simple_allocate_deallocate() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let label_uid = create_label(&mut client, "test", Resources::new(1, 2)).await;
    let application_id = create_application(&mut client, &label_uid).await;

    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_secs(1)).await);

    let response = client.send(Request::Query { query: Query::GetApplicationResource { application_id: application_id.clone() } }).await;
    let Response::ApplicationResource { resource: Some(resource) } = response else { panic!("expected resource, got {response:?}") };
    assert!(!resource.identifier.is_empty());

    client.send(Request::ApplicationDeallocate { id: application_id.clone() }).await;
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Deallocated, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn s2_capacity_blocking() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::bounded("test", 4, 8))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let label_uid = create_label(&mut client, "test", Resources::new(4, 8)).await;

    let app1 = create_application(&mut client, &label_uid).await;
    assert!(wait_for_status(&mut client, &app1, ApplicationStatus::Allocated, Duration::from_secs(1)).await);

    let app2 = create_application(&mut client, &label_uid).await;
    assert!(!wait_for_status(&mut client, &app2, ApplicationStatus::Allocated, Duration::from_millis(200)).await);

    client.send(Request::ApplicationDeallocate { id: app1 }).await;
    assert!(wait_for_status(&mut client, &app2, ApplicationStatus::Allocated, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn s3_unknown_task_records_literal_not_available() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let label_uid = create_label(&mut client, "test", Resources::new(1, 1)).await;
    let application_id = create_application(&mut client, &label_uid).await;
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_secs(1)).await);

    let response = client
        .send(Request::ApplicationTaskCreate {
            application_id: application_id.clone(),
            task: "NOTEXISTING_TASK".into(),
            when: ApplicationStatus::Allocated,
            input: Default::default(),
        })
        .await;
    assert!(matches!(response, Response::ApplicationTaskCreated { .. }));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        let response = client.send(Request::Query { query: Query::ListApplicationTasks { application_id: application_id.clone() } }).await;
        let Response::ApplicationTasks { tasks } = response else { panic!("expected ApplicationTasks, got {response:?}") };
        if let Some(task) = tasks.first() {
            if task.is_executed() {
                assert_eq!(serde_json::to_string(&task.result).unwrap(), fish_core::TASK_NOT_AVAILABLE);
                return;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "task never executed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_task_result(client: &mut Client, application_id: &str, task_id: &str, timeout: Duration) -> fish_core::ApplicationTask {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let response = client.send(Request::Query { query: Query::ListApplicationTasks { application_id: application_id.into() } }).await;
        let Response::ApplicationTasks { tasks } = response else { panic!("expected ApplicationTasks, got {response:?}") };
        if let Some(task) = tasks.iter().find(|t| t.uid.to_string() == task_id) {
            if task.is_executed() {
                return task.clone();
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "task {task_id} never executed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn s4_snapshot_on_deallocate() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test").with_task("snapshot"))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let label_uid = create_label(&mut client, "test", Resources::new(1, 1)).await;
    let application_id = create_application(&mut client, &label_uid).await;
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_secs(1)).await);

    // T1 is created after ALLOCATED was already entered; it must still run.
    let response = client
        .send(Request::ApplicationTaskCreate {
            application_id: application_id.clone(),
            task: "snapshot".into(),
            when: ApplicationStatus::Allocated,
            input: Default::default(),
        })
        .await;
    let Response::ApplicationTaskCreated { id: t1 } = response else { panic!("expected ApplicationTaskCreated, got {response:?}") };

    let t1_task = wait_for_task_result(&mut client, &application_id, &t1, Duration::from_secs(1)).await;
    assert_eq!(t1_task.result.get("snapshots"), Some(&serde_json::json!(["test-snapshot"])));
    assert_eq!(t1_task.result.get("when"), Some(&serde_json::json!("ALLOCATED")));

    // T2 targets DEALLOCATE and must not run until the app actually transitions there.
    let response = client
        .send(Request::ApplicationTaskCreate {
            application_id: application_id.clone(),
            task: "snapshot".into(),
            when: ApplicationStatus::Deallocate,
            input: Default::default(),
        })
        .await;
    let Response::ApplicationTaskCreated { id: t2 } = response else { panic!("expected ApplicationTaskCreated, got {response:?}") };

    let response = client.send(Request::Query { query: Query::ListApplicationTasks { application_id: application_id.clone() } }).await;
    let Response::ApplicationTasks { tasks } = response else { panic!("expected ApplicationTasks, got {response:?}") };
    assert!(!tasks.iter().find(|t| t.uid.to_string() == t2).unwrap().is_executed());

    client.send(Request::ApplicationDeallocate { id: application_id.clone() }).await;
    let t2_task = wait_for_task_result(&mut client, &application_id, &t2, Duration::from_secs(1)).await;
    assert_eq!(t2_task.result.get("snapshots"), Some(&serde_json::json!(["test-snapshot"])));
    assert_eq!(t2_task.result.get("when"), Some(&serde_json::json!("DEALLOCATE")));
}

#[tokio::test]
async fn s5_maintenance_gating() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let response = client.send(Request::NodeSetMaintenance { enabled: true }).await;
    assert_eq!(response, Response::MaintenanceSet { enabled: true });

    let label_uid = create_label(&mut client, "test", Resources::new(1, 1)).await;
    let application_id = create_application(&mut client, &label_uid).await;
    assert!(!wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_millis(200)).await);

    let response = client.send(Request::NodeSetMaintenance { enabled: false }).await;
    assert_eq!(response, Response::MaintenanceSet { enabled: false });
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn s7_default_lifetime_expiry_with_no_explicit_deallocate() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
    let lifecycle_config = LifecycleConfig { default_resource_lifetime_ms: 500, ..LifecycleConfig::default() };
    let harness = spawn_node(drivers, lifecycle_config).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;
    let label_uid = create_label(&mut client, "test", Resources::new(1, 1)).await;
    let application_id = create_application(&mut client, &label_uid).await;
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Allocated, Duration::from_secs(1)).await);

    harness.clock.advance(Duration::from_secs(1));
    assert!(wait_for_status(&mut client, &application_id, ApplicationStatus::Deallocated, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn s8_multi_instance_driver_selection() {
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::bounded("test/dev", 4, 8))));
    drivers.register(Arc::new(TestDriver::new(TestDriverConfig::bounded("test/prod", 8, 16))));
    let harness = spawn_node(drivers, LifecycleConfig::default()).await;

    let mut client = Client::connect(&harness.address, Some("admin")).await;

    let dev_label = create_label(&mut client, "test/dev", Resources::new(5, 9)).await;
    let dev_app = create_application(&mut client, &dev_label).await;
    assert!(!wait_for_status(&mut client, &dev_app, ApplicationStatus::Allocated, Duration::from_millis(200)).await);

    let prod_label = create_label(&mut client, "test/prod", Resources::new(5, 9)).await;
    let prod_app = create_application(&mut client, &prod_label).await;
    assert!(wait_for_status(&mut client, &prod_app, ApplicationStatus::Allocated, Duration::from_secs(1)).await);
}
