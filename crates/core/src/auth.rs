// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User/Role records and the seeded permission set (`spec.md` §3).
//!
//! The policy engine that would map arbitrary roles to arbitrary verbs
//! is out of scope (`spec.md` §1 Non-goals: "user-facing authorization
//! policy beyond the role-check hook"). What's specified here is just
//! enough for the seeded roles to gate the operations this core exposes.

use serde::{Deserialize, Serialize};

/// A permission a Role can grant. Kept as an open string set (rather
/// than an exhaustive enum) since the RPC surface that defines the full
/// verb list is external (`spec.md` §6).
pub type Permission = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
}

/// The three seeded roles and the `admin` user, created at first boot
/// (`spec.md` §3, §9 open question on residual key count).
pub fn seed_roles() -> Vec<Role> {
    vec![
        Role { name: "Administrator".into(), permissions: vec!["*".into()] },
        Role {
            name: "User".into(),
            permissions: vec![
                "application.create".into(),
                "application.read".into(),
                "application.deallocate".into(),
                "label.read".into(),
            ],
        },
        Role {
            name: "Power".into(),
            permissions: vec![
                "application.create".into(),
                "application.read".into(),
                "application.deallocate".into(),
                "label.read".into(),
                "label.create".into(),
            ],
        },
    ]
}

pub fn seed_admin(password_hash: impl Into<String>) -> User {
    User { name: "admin".into(), password_hash: password_hash.into(), roles: vec!["Administrator".into()] }
}

/// Check whether any of `roles` grants `permission`, given the full role
/// table. `"*"` grants everything (Administrator).
pub fn has_permission(roles: &[Role], user_roles: &[String], permission: &str) -> bool {
    user_roles.iter().any(|rn| {
        roles.iter().any(|r| {
            &r.name == rn && r.permissions.iter().any(|p| p == "*" || p == permission)
        })
    })
}
