// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fishd`: the node binary. Loads config, boots (or reopens) the
//! workspace, spawns the background loops, and serves RPC until asked
//! to shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fish_core::event::Bus;
use fish_core::SystemClock;
use fish_daemon::listener::{self, ListenCtx};
use fish_daemon::{bootstrap, Config, DaemonError, NodeController, ShutdownSequence};
use fish_engine::{LifecycleConfig, LifecycleEngine, LifecycleResolutionOracle, Scheduler, TaskExecutor};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// `FISH_WORKSPACE_DIR` > current directory.
fn workspace_dir() -> PathBuf {
    std::env::var("FISH_WORKSPACE_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// `FISH_CONFIG` > `<workspace>/fish.toml`.
fn config_path(workspace: &std::path::Path) -> PathBuf {
    std::env::var("FISH_CONFIG").map(PathBuf::from).unwrap_or_else(|_| workspace.join("fish.toml"))
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let workspace = workspace_dir();
    let config = Config::load(config_path(&workspace))?;
    let node_name = hostname();

    let bus = Arc::new(Bus::new());
    let boot = bootstrap::boot(&workspace, &node_name, &config, Arc::clone(&bus)).await?;

    let accountant = Arc::new(fish_engine::CapacityAccountant::new());
    bootstrap::seed_accountant(&boot.store, &accountant);
    let _accountant_listener = accountant.spawn_listener(Arc::clone(&bus));

    let lifecycle_config = LifecycleConfig {
        default_resource_lifetime_ms: config.default_resource_lifetime().as_millis() as u64,
        ..LifecycleConfig::default()
    };
    let lifecycle = Arc::new(LifecycleEngine::new(
        Arc::clone(&boot.store),
        SystemClock,
        lifecycle_config,
        boot.id_gen.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&boot.store),
        Arc::clone(&boot.drivers),
        Arc::clone(&accountant),
        Arc::clone(&lifecycle),
        boot.id_gen.clone(),
    ));
    let task_executor = Arc::new(TaskExecutor::new(Arc::clone(&boot.store), Arc::clone(&boot.drivers), Arc::clone(&lifecycle)));

    let (node_controller, maintenance_rx) = NodeController::new();
    let cancel = CancellationToken::new();

    let oracle = Arc::new(LifecycleResolutionOracle::new(Arc::clone(&lifecycle)));
    let _cleanup = boot.store.spawn_cleanup_loop(config.db_cleanup_interval(), oracle, cancel.clone());
    let _compact = boot.store.spawn_compact_loop(config.db_compact_interval(), cancel.clone());
    let _scheduler_loop =
        Arc::clone(&scheduler).spawn_loop(Duration::from_secs(1), Arc::clone(&bus), maintenance_rx, cancel.clone());
    let _task_executor_loop = Arc::clone(&task_executor).spawn_loop(Arc::clone(&bus), cancel.clone());
    let _lifecycle_loop = Arc::clone(&lifecycle).spawn_loop(
        Duration::from_secs(1),
        Arc::clone(&boot.drivers),
        Arc::clone(&accountant),
        Arc::clone(&bus),
        cancel.clone(),
    );

    let ctx = Arc::new(ListenCtx {
        store: Arc::clone(&boot.store),
        drivers: Arc::clone(&boot.drivers),
        accountant: Arc::clone(&accountant),
        lifecycle: Arc::clone(&lifecycle),
        bus: Arc::clone(&bus),
        node: boot.node.clone(),
        node_controller,
        id_gen: boot.id_gen.clone(),
        shutdown: cancel.clone(),
    });

    tokio::select! {
        result = listener::serve(Arc::clone(&ctx), &config.api_address) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("fish.main=ctrl_c_received");
        }
    }

    let shutdown = ShutdownSequence::new(Arc::clone(&boot.store), boot.drivers, accountant, lifecycle, cancel);
    shutdown.run(Duration::from_secs(5)).await;
    Ok(())
}

/// `FISH_NODE_NAME` > `HOSTNAME` > a fixed fallback.
fn hostname() -> String {
    std::env::var("FISH_NODE_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "fish-node".to_string())
}
