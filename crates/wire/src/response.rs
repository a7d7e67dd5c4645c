// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fish_core::{Application, ApplicationResource, ApplicationState, ApplicationTask, Label, Node};
use serde::{Deserialize, Serialize};

/// Response from the node back to an RPC client (`spec.md` §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },
    Error { message: String },

    Label { label: Option<Box<Label>> },
    Labels { labels: Vec<Label> },
    LabelCreated { id: String },

    Application { application: Option<Box<Application>> },
    Applications { applications: Vec<Application> },
    ApplicationCreated { id: String },

    ApplicationState { state: Option<Box<ApplicationState>> },
    ApplicationResource { resource: Option<Box<ApplicationResource>> },

    ApplicationTasks { tasks: Vec<ApplicationTask> },
    ApplicationTaskCreated { id: String },

    Node { node: Option<Box<Node>> },
    Nodes { nodes: Vec<Node> },
    MaintenanceSet { enabled: bool },

    ShuttingDown,
}
