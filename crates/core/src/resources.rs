// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed resource quantities for Labels, driver capacity, and accounting.

use serde::{Deserialize, Serialize};

/// CPU/RAM/disk/GPU quantities. `disk`/`gpu` are optional dimensions —
/// a driver that doesn't track them simply never contributes to their
/// totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: u32,
    pub ram: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
}

impl Resources {
    pub fn new(cpu: u32, ram: u32) -> Self {
        Self { cpu, ram, disk: None, gpu: None }
    }

    pub fn with_disk(mut self, disk: u32) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_gpu(mut self, gpu: u32) -> Self {
        self.gpu = Some(gpu);
        self
    }

    /// Component-wise sum.
    pub fn checked_add(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu + other.cpu,
            ram: self.ram + other.ram,
            disk: add_optional(self.disk, other.disk),
            gpu: add_optional(self.gpu, other.gpu),
        }
    }

    /// Component-wise subtraction, saturating at zero. Used to back out a
    /// freed ApplicationResource from a running total.
    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu: self.cpu.saturating_sub(other.cpu),
            ram: self.ram.saturating_sub(other.ram),
            disk: sub_optional(self.disk, other.disk),
            gpu: sub_optional(self.gpu, other.gpu),
        }
    }

    /// True iff `used + self <= capacity` component-wise. A dimension
    /// absent from `capacity` is treated as unlimited for that dimension.
    pub fn fits(&self, used: &Resources, capacity: &Resources) -> bool {
        let would_use = used.checked_add(self);
        would_use.cpu <= capacity.cpu
            && would_use.ram <= capacity.ram
            && fits_optional(would_use.disk, capacity.disk)
            && fits_optional(would_use.gpu, capacity.gpu)
    }
}

fn add_optional(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
    }
}

fn sub_optional(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_sub(b.unwrap_or(0))),
    }
}

fn fits_optional(would_use: Option<u32>, capacity: Option<u32>) -> bool {
    match (would_use, capacity) {
        (Some(use_), Some(cap)) => use_ <= cap,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_plain_cpu_ram_capacity() {
        let cap = Resources::new(4, 8);
        let used = Resources::new(0, 0);
        assert!(Resources::new(4, 8).fits(&used, &cap));
        assert!(!Resources::new(5, 8).fits(&used, &cap));
    }

    #[test]
    fn fits_accounts_for_already_used() {
        let cap = Resources::new(4, 8);
        let used = Resources::new(4, 8);
        assert!(!Resources::new(1, 0).fits(&used, &cap));
    }

    #[test]
    fn disk_absent_from_capacity_is_unbounded() {
        let cap = Resources::new(4, 8);
        let def = Resources::new(1, 1).with_disk(1000);
        assert!(def.fits(&Resources::default(), &cap));
    }

    #[test]
    fn saturating_sub_never_underflows() {
        let a = Resources::new(1, 1);
        let b = Resources::new(5, 5);
        let r = a.saturating_sub(&b);
        assert_eq!(r.cpu, 0);
        assert_eq!(r.ram, 0);
    }
}
