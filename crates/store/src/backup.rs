// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup-file rotation used around the log's atomic compaction swap.

use std::fs;
use std::path::{Path, PathBuf};

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`. The
/// oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_backups_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_path = dir.path().join("log");
        fs::write(&log_path, b"v1").expect("write");

        let bak1 = rotate_bak_path(&log_path);
        fs::rename(&log_path, &bak1).expect("rename");
        fs::write(&log_path, b"v2").expect("write");

        let bak2 = rotate_bak_path(&log_path);
        assert_eq!(bak2, log_path.with_extension("bak.2"));
    }
}
