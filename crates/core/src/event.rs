// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The entity `Kind` tag, change events, and the Subscription Bus
//! (`spec.md` §4.7, §6, §9).

use crate::macros::simple_display;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Entity kind, doubling as the KV store's namespace prefix
/// (`kind/<uid>` keys, `spec.md` §3) and the Bus's routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Node,
    Label,
    Application,
    ApplicationState,
    ApplicationResource,
    ApplicationTask,
    User,
    Role,
}

simple_display! {
    Kind {
        Node => "node",
        Label => "label",
        Application => "application",
        ApplicationState => "appstate",
        ApplicationResource => "appres",
        ApplicationTask => "apptask",
        User => "user",
        Role => "role",
    }
}

impl Kind {
    pub const ALL: [Kind; 8] = [
        Kind::Node,
        Kind::Label,
        Kind::Application,
        Kind::ApplicationState,
        Kind::ApplicationResource,
        Kind::ApplicationTask,
        Kind::User,
        Kind::Role,
    ];
}

/// CREATED/UPDATED/REMOVED, matching the literal wire vocabulary in
/// `spec.md` §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Created,
    Updated,
    Removed,
}

/// One committed store mutation, as delivered to Bus subscribers.
///
/// `object_data` is the serialized record (empty for `Removed`, since a
/// tombstone carries no payload subscribers need).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: Kind,
    pub change: ChangeType,
    pub id: String,
    pub object_data: Vec<u8>,
    /// Monotonically increasing store-wide commit sequence number. Used
    /// to confirm Bus delivery order matches commit order per kind
    /// (`spec.md` §5).
    pub seq: u64,
}

/// Per-subscriber channel capacity before a slow consumer is
/// disconnected (`spec.md` §4.7, §9: "on overflow, close the
/// subscription with a distinguished resync signal").
const BUS_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast fan-out of CREATED/UPDATED/REMOVED events, one channel per
/// [`Kind`]. A slow subscriber whose buffer overflows gets
/// `RecvError::Lagged` on its next receive, which the RPC layer turns
/// into a disconnect forcing the client to re-`List` (`spec.md` §6, §9).
pub struct Bus {
    channels: RwLock<HashMap<Kind, broadcast::Sender<ChangeEvent>>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self { channels: RwLock::new(HashMap::new()) }
    }

    fn sender_for(&self, kind: Kind) -> broadcast::Sender<ChangeEvent> {
        if let Some(tx) = self.channels.read().get(&kind) {
            return tx.clone();
        }
        let mut guard = self.channels.write();
        guard.entry(kind).or_insert_with(|| broadcast::channel(BUS_CHANNEL_CAPACITY).0).clone()
    }

    /// Publish a committed change. Must be called from within the same
    /// critical section that updates the store's index, so that commit
    /// order and delivery order coincide (`spec.md` §5).
    pub fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error: publishing is fire-and-forget.
        let _ = self.sender_for(event.kind).send(event);
    }

    /// Subscribe to a single kind's change stream, live-from-now
    /// (`spec.md` §6: "re-subscription after disconnect MUST NOT
    /// duplicate history").
    pub fn subscribe(&self, kind: Kind) -> broadcast::Receiver<ChangeEvent> {
        self.sender_for(kind).subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event_for_its_kind() {
        let bus = Bus::new();
        let mut rx = bus.subscribe(Kind::Application);
        bus.publish(ChangeEvent {
            kind: Kind::Application,
            change: ChangeType::Created,
            id: "app-1".into(),
            object_data: vec![],
            seq: 1,
        });
        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.id, "app-1");
        assert_eq!(event.change, ChangeType::Created);
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_events_for_other_kinds() {
        let bus = Bus::new();
        let mut rx = bus.subscribe(Kind::Label);
        bus.publish(ChangeEvent {
            kind: Kind::Application,
            change: ChangeType::Created,
            id: "app-1".into(),
            object_data: vec![],
            seq: 1,
        });
        // No event should ever arrive on the Label channel for this publish.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn kind_display_matches_store_key_prefixes() {
        assert_eq!(Kind::Application.to_string(), "application");
        assert_eq!(Kind::ApplicationState.to_string(), "appstate");
        assert_eq!(Kind::ApplicationResource.to_string(), "appres");
        assert_eq!(Kind::ApplicationTask.to_string(), "apptask");
    }
}
