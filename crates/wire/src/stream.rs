// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Subscribe` payload (`spec.md` §6): an infinite, live-from-now
//! stream of change notifications.

use fish_core::{ChangeEvent, ChangeType, Kind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamMessage {
    pub object_type: Kind,
    pub change_type: ChangeType,
    pub object_data: Vec<u8>,
}

impl From<ChangeEvent> for StreamMessage {
    fn from(e: ChangeEvent) -> Self {
        StreamMessage { object_type: e.kind, change_type: e.change, object_data: e.object_data }
    }
}

/// Sent in place of a [`StreamMessage`] when a subscriber's buffer
/// overflowed: it must re-`List` to resync before trusting further
/// stream messages (`spec.md` §4.7, §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResyncRequired {
    pub kind: Kind,
}

/// Envelope written on a `Subscribe` connection: a steady stream of
/// [`StreamMessage`]s, or a [`ResyncRequired`] when the subscriber's
/// buffer overflowed (`spec.md` §4.7, §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum SubscribeMessage {
    Changed { event: StreamMessage },
    ResyncRequired { kind: Kind },
}
