// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation: 16-byte UIDs whose first 6 bytes identify the node.
//!
//! Every UID generated by a node carries that node's prefix in its first
//! 6 bytes (invariant I-1, `spec.md` §3/§8). The remaining 10 bytes are
//! random. The 16-byte value is presented as a canonical 36-char
//! hex-with-dashes string, the same layout `uuid` already produces, so we
//! build `Uid` directly on top of `uuid::Uuid` rather than hand-rolling
//! hex formatting.

use std::fmt;
use std::str::FromStr;

/// Number of bytes in the node prefix carried by every generated UID.
pub const NODE_PREFIX_LEN: usize = 6;

/// A 16-byte identifier, displayed as a canonical hex-with-dashes string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(uuid::Uuid);

impl Uid {
    /// Wrap a raw 16-byte value.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Generate a random UID whose first [`NODE_PREFIX_LEN`] bytes equal
    /// the given node prefix.
    pub fn with_node_prefix(prefix: &[u8; NODE_PREFIX_LEN]) -> Self {
        let mut bytes = *uuid::Uuid::new_v4().as_bytes();
        bytes[..NODE_PREFIX_LEN].copy_from_slice(prefix);
        Self::from_bytes(bytes)
    }

    /// Generate a UID with no particular node prefix (used for the node's
    /// own UID at first boot, before it has a prefix of its own).
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// The first [`NODE_PREFIX_LEN`] bytes, i.e. the owning node's prefix.
    pub fn node_prefix(&self) -> [u8; NODE_PREFIX_LEN] {
        let mut out = [0u8; NODE_PREFIX_LEN];
        out.copy_from_slice(&self.as_bytes()[..NODE_PREFIX_LEN]);
        out
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a [`Uid`] from its canonical string form.
#[derive(Debug, thiserror::Error)]
#[error("invalid uid: {0}")]
pub struct ParseUidError(String);

impl FromStr for Uid {
    type Err = ParseUidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Uid).map_err(|e| ParseUidError(e.to_string()))
    }
}

impl serde::Serialize for Uid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Uid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <&str>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Generates UIDs carrying a fixed node prefix.
///
/// One instance is created at node boot from the `Node`'s own UID and
/// handed to every component that mints new entity IDs, so the prefix
/// invariant holds without each call site needing to know the node.
#[derive(Clone)]
pub struct IdGenerator {
    node_prefix: [u8; NODE_PREFIX_LEN],
}

impl IdGenerator {
    pub fn new(node_prefix: [u8; NODE_PREFIX_LEN]) -> Self {
        Self { node_prefix }
    }

    pub fn generate(&self) -> Uid {
        Uid::with_node_prefix(&self.node_prefix)
    }

    pub fn node_prefix(&self) -> [u8; NODE_PREFIX_LEN] {
        self.node_prefix
    }
}

/// Define a typed ID newtype wrapping [`Uid`].
///
/// ```ignore
/// define_uid! {
///     /// Doc comment for the ID type.
///     pub struct LabelId;
/// }
/// ```
#[macro_export]
macro_rules! define_uid {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $crate::id::Uid);

        impl $name {
            /// Mint a new random ID carrying the generator's node prefix.
            pub fn generate(gen: &$crate::id::IdGenerator) -> Self {
                Self(gen.generate())
            }

            pub fn from_uid(uid: $crate::id::Uid) -> Self {
                Self(uid)
            }

            pub fn as_uid(&self) -> $crate::id::Uid {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::id::ParseUidError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}
