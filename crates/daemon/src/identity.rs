// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node and CA key/cert pairs, persisted under the data directory at
//! first boot (`spec.md` §6 persisted layout).
//!
//! The cluster-join/CA handshake that would validate a *joining peer's*
//! CA pair against this node's is out of scope (`spec.md` §1); what's
//! in scope is that the node always has a self-signed identity on disk
//! and refuses to start with a corrupt one.

use std::path::{Path, PathBuf};

use crate::error::DaemonError;

/// A PEM-encoded private key and its self-signed certificate.
#[derive(Debug, Clone)]
pub struct KeyCertPair {
    pub key_pem: String,
    pub cert_pem: String,
}

impl KeyCertPair {
    fn generate(common_name: &str) -> Result<Self, DaemonError> {
        let params = rcgen::CertificateParams::new(vec![common_name.to_string()])
            .map_err(|e| DaemonError::Identity(e.to_string()))?;
        let key_pair = rcgen::KeyPair::generate().map_err(|e| DaemonError::Identity(e.to_string()))?;
        let cert = params.self_signed(&key_pair).map_err(|e| DaemonError::Identity(e.to_string()))?;
        Ok(KeyCertPair { key_pem: key_pair.serialize_pem(), cert_pem: cert.pem() })
    }

    fn load_or_generate(key_path: &Path, cert_path: &Path, common_name: &str) -> Result<Self, DaemonError> {
        if key_path.exists() != cert_path.exists() {
            return Err(DaemonError::Identity(format!(
                "{} and {} must both exist or both be absent",
                key_path.display(),
                cert_path.display()
            )));
        }
        if !key_path.exists() {
            let pair = Self::generate(common_name)?;
            std::fs::write(key_path, &pair.key_pem)?;
            std::fs::write(cert_path, &pair.cert_pem)?;
            return Ok(pair);
        }

        let key_pem = std::fs::read_to_string(key_path)?;
        let cert_pem = std::fs::read_to_string(cert_path)?;
        validate_pem(&key_pem, "PRIVATE KEY").map_err(|_| {
            DaemonError::Identity(format!("{} is corrupt or unreadable", key_path.display()))
        })?;
        validate_pem(&cert_pem, "CERTIFICATE")
            .map_err(|_| DaemonError::Identity(format!("{} is corrupt or unreadable", cert_path.display())))?;
        Ok(KeyCertPair { key_pem, cert_pem })
    }
}

fn validate_pem(text: &str, label: &str) -> Result<(), ()> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");
    if text.trim_start().starts_with(&begin) && text.trim_end().ends_with(&end) {
        Ok(())
    } else {
        Err(())
    }
}

/// The node's own identity plus the CA pair it trusts, both loaded from
/// (or generated into) `data_dir`.
pub struct Identity {
    pub node: KeyCertPair,
    pub ca: KeyCertPair,
}

impl Identity {
    pub fn load_or_generate(data_dir: impl AsRef<Path>, node_name: &str) -> Result<Self, DaemonError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let node = KeyCertPair::load_or_generate(&node_key_path(data_dir), &node_cert_path(data_dir), node_name)?;
        let ca = KeyCertPair::load_or_generate(&ca_key_path(data_dir), &ca_cert_path(data_dir), "fish-ca")?;
        Ok(Identity { node, ca })
    }
}

pub fn node_key_path(data_dir: &Path) -> PathBuf {
    data_dir.join("node.key")
}

pub fn node_cert_path(data_dir: &Path) -> PathBuf {
    data_dir.join("node.cert")
}

pub fn ca_key_path(data_dir: &Path) -> PathBuf {
    data_dir.join("ca.key")
}

pub fn ca_cert_path(data_dir: &Path) -> PathBuf {
    data_dir.join("ca.cert")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_boot_generates_and_persists_both_pairs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let identity = Identity::load_or_generate(dir.path(), "node-a").expect("generate");
        assert!(identity.node.key_pem.contains("PRIVATE KEY"));
        assert!(node_key_path(dir.path()).exists());
        assert!(ca_cert_path(dir.path()).exists());
    }

    #[test]
    fn reopening_reuses_the_persisted_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = Identity::load_or_generate(dir.path(), "node-a").expect("generate");
        let second = Identity::load_or_generate(dir.path(), "node-a").expect("reload");
        assert_eq!(first.node.cert_pem, second.node.cert_pem);
        assert_eq!(first.ca.key_pem, second.ca.key_pem);
    }

    #[test]
    fn corrupt_ca_key_fails_to_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        Identity::load_or_generate(dir.path(), "node-a").expect("generate");
        std::fs::write(ca_key_path(dir.path()), "not a key").expect("corrupt");

        let err = Identity::load_or_generate(dir.path(), "node-a").unwrap_err();
        assert!(matches!(err, DaemonError::Identity(_)));
    }
}
