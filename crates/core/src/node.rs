// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node identity (`spec.md` §3, §4.8, §4.9).

use crate::define_uid;
use serde::{Deserialize, Serialize};

define_uid! {
    /// The node's own UID; its first 6 bytes are the prefix stamped into
    /// every other UID this node mints.
    pub struct NodeId;
}

/// The node record, persisted forever once created at first boot.
///
/// Maintenance is intentionally *not* a field here: `spec.md` §4.8
/// requires it not survive a restart, so it lives only in the
/// in-memory `NodeController` (`fish-daemon::node`), never in this
/// persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uid: NodeId,
    pub name: String,
    pub location: String,
}

impl Node {
    pub fn new(uid: NodeId, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self { uid, name: name.into(), location: location.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdGenerator;

    #[test]
    fn node_uid_is_its_own_prefix_source() {
        let gen = IdGenerator::new([9, 9, 9, 9, 9, 9]);
        let node = Node::new(NodeId::generate(&gen), "node-a", "us-east");
        assert_eq!(node.uid.as_uid().node_prefix(), [9, 9, 9, 9, 9, 9]);
    }
}
