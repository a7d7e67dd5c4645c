// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! First-boot seeding and the `fish_data/` persisted layout
//! (`spec.md` §6, §9).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fish_core::event::Bus;
use fish_core::{id::Uid, ApplicationResource, IdGenerator, Kind, Node, NodeId};
use fish_drivers::{DriverRegistry, TestDriver, TestDriverConfig};
use fish_store::{Store, TxnOp};
use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;
use crate::identity::Identity;

pub const DATA_DIR_NAME: &str = "fish_data";

/// Everything recovered or created at node boot.
pub struct Boot {
    pub store: Arc<Store>,
    pub identity: Identity,
    pub id_gen: IdGenerator,
    pub node: Node,
    pub drivers: Arc<DriverRegistry>,
}

pub async fn boot(workspace_dir: impl AsRef<Path>, node_name: &str, config: &Config, bus: Arc<Bus>) -> Result<Boot, DaemonError> {
    let data_dir = data_dir(workspace_dir.as_ref());
    std::fs::create_dir_all(&data_dir)?;

    let identity = Identity::load_or_generate(&data_dir, node_name)?;
    let store = Store::open(fish_store::default_log_path(&data_dir), bus)?;

    let node = match find_node(&store) {
        Some(node) => node,
        None => seed_first_boot(&store, node_name, &config.node_location).await?,
    };
    let id_gen = IdGenerator::new(node.uid.as_uid().node_prefix());

    let drivers = Arc::new(build_driver_registry(config));

    Ok(Boot { store, identity, id_gen, node, drivers })
}

pub fn data_dir(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(DATA_DIR_NAME)
}

fn find_node(store: &Store) -> Option<Node> {
    store.list(Kind::Node, |_, _| true).into_iter().find_map(|(_, payload)| serde_json::from_slice(&payload).ok())
}

/// Seed the residual key set (`spec.md` §3, §4.1): one `admin` user,
/// the three roles, and the node record, all in one Txn.
async fn seed_first_boot(store: &Store, node_name: &str, node_location: &str) -> Result<Node, DaemonError> {
    let prefix = Uid::random().node_prefix();
    let gen = IdGenerator::new(prefix);
    let node = Node::new(NodeId::generate(&gen), node_name, node_location);

    let admin = fish_core::seed_admin(Uid::random().to_string());
    let roles = fish_core::seed_roles();

    let mut ops = vec![
        TxnOp::put(Kind::Node, node.uid.to_string(), serde_json::to_vec(&node)?),
        TxnOp::put(Kind::User, admin.name.clone(), serde_json::to_vec(&admin)?),
    ];
    for role in &roles {
        ops.push(TxnOp::put(Kind::Role, role.name.clone(), serde_json::to_vec(role)?));
    }
    store.txn(ops).await?;
    info!(node = %node.uid, "fish.bootstrap=seeded");
    Ok(node)
}

/// Build the Driver Registry from `drivers.providers` config entries.
/// Only the in-tree `test` driver is implemented (`spec.md` §1: concrete
/// driver backends besides the stub are out of scope); any provider key
/// is registered as a `test`-backed instance under its own name so
/// `test/dev`/`test/prod`-style multi-instance configs still work.
fn build_driver_registry(config: &Config) -> DriverRegistry {
    let mut registry = DriverRegistry::new();
    for (name, provider) in &config.drivers.providers {
        let driver_config = match (provider.cpu_limit, provider.ram_limit) {
            (Some(cpu), Some(ram)) => TestDriverConfig::bounded(name.clone(), cpu, ram),
            _ => TestDriverConfig::unlimited(name.clone()),
        };
        registry.register(Arc::new(TestDriver::new(driver_config)));
    }
    if config.drivers.providers.is_empty() {
        registry.register(Arc::new(TestDriver::new(TestDriverConfig::unlimited("test"))));
    }
    registry
}

/// Rebuild the Capacity Accountant from every currently-live
/// ApplicationResource, so it starts in sync with persisted truth
/// (`spec.md` §4.3) before the live Bus listener takes over.
pub fn seed_accountant(store: &Store, accountant: &fish_engine::CapacityAccountant) {
    let live: Vec<ApplicationResource> =
        store.list(Kind::ApplicationResource, |_, _| true).into_iter().filter_map(|(_, p)| serde_json::from_slice(&p).ok()).collect();
    accountant.seed(&live);
}
